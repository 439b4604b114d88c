//! On-disk cache of fetched artifact bytes, keyed by resolved dependency.
//!
//! Separate from the POM cache: this one stores file payloads. The layout
//! mirrors the repository tree (`group/artifact/version/…`), and writes go
//! through a temp file renamed into place.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::resolver::Dependency;

/// Cache of artifact files on disk.
pub trait ArtifactCache: Send + Sync {
    /// Path of the cached artifact, if present.
    fn get(&self, dependency: &Dependency) -> Option<PathBuf>;

    /// Store the artifact bytes from a stream.
    ///
    /// Returns `None` for an empty stream or when the write fails; write
    /// failures are reported through `on_error` instead of aborting the
    /// caller.
    fn put(
        &self,
        dependency: &Dependency,
        stream: &mut dyn Read,
        on_error: &dyn Fn(&io::Error),
    ) -> Option<PathBuf>;

    /// Cached path, or produce the byte stream and store it. The producer
    /// only runs on a miss; a producer returning `None` means the upstream
    /// does not have the artifact.
    fn compute(
        &self,
        dependency: &Dependency,
        or_else: &dyn Fn() -> miette::Result<Option<Box<dyn Read>>>,
        on_error: &dyn Fn(&io::Error),
    ) -> miette::Result<Option<PathBuf>> {
        if let Some(path) = self.get(dependency) {
            return Ok(Some(path));
        }
        match or_else()? {
            Some(mut stream) => Ok(self.put(dependency, &mut stream, on_error)),
            None => Ok(None),
        }
    }
}

/// Layering combinator, same shape as the POM cache's.
pub trait ArtifactCacheExt: ArtifactCache + Sized {
    fn or_else<B: ArtifactCache>(self, fallback: B) -> CompositeArtifactCache<Self, B> {
        CompositeArtifactCache {
            primary: self,
            fallback,
        }
    }
}

impl<T: ArtifactCache + Sized> ArtifactCacheExt for T {}

/// Two artifact caches layered: reads check both, writes land in the
/// primary.
pub struct CompositeArtifactCache<A, B> {
    primary: A,
    fallback: B,
}

impl<A: ArtifactCache, B: ArtifactCache> ArtifactCache for CompositeArtifactCache<A, B> {
    fn get(&self, dependency: &Dependency) -> Option<PathBuf> {
        self.primary
            .get(dependency)
            .or_else(|| self.fallback.get(dependency))
    }

    fn put(
        &self,
        dependency: &Dependency,
        stream: &mut dyn Read,
        on_error: &dyn Fn(&io::Error),
    ) -> Option<PathBuf> {
        self.primary.put(dependency, stream, on_error)
    }
}

/// Pass-through artifact cache: stores nothing, never hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArtifactCache;

impl ArtifactCache for NoopArtifactCache {
    fn get(&self, _dependency: &Dependency) -> Option<PathBuf> {
        None
    }

    fn put(
        &self,
        _dependency: &Dependency,
        _stream: &mut dyn Read,
        _on_error: &dyn Fn(&io::Error),
    ) -> Option<PathBuf> {
        None
    }
}

/// Artifact cache rooted at a directory, mirroring repository layout.
#[derive(Debug, Clone)]
pub struct LocalArtifactCache {
    root: PathBuf,
}

impl LocalArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, dependency: &Dependency) -> PathBuf {
        let coordinate = &dependency.coordinate;
        let extension = dependency.type_.as_deref().unwrap_or("jar");
        let filename = match dependency.classifier.as_deref() {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                coordinate.artifact_id, coordinate.version, classifier, extension
            ),
            None => format!(
                "{}-{}.{}",
                coordinate.artifact_id, coordinate.version, extension
            ),
        };
        self.root
            .join(coordinate.group_id.replace('.', "/"))
            .join(&coordinate.artifact_id)
            .join(&coordinate.version)
            .join(filename)
    }
}

impl ArtifactCache for LocalArtifactCache {
    fn get(&self, dependency: &Dependency) -> Option<PathBuf> {
        let path = self.artifact_path(dependency);
        path.is_file().then_some(path)
    }

    fn put(
        &self,
        dependency: &Dependency,
        stream: &mut dyn Read,
        on_error: &dyn Fn(&io::Error),
    ) -> Option<PathBuf> {
        let path = self.artifact_path(dependency);
        let dir = path.parent()?;
        if let Err(e) = refract_util::fs::ensure_dir(dir) {
            on_error(&e);
            return None;
        }

        let mut tmp = match tempfile::NamedTempFile::new_in(dir) {
            Ok(tmp) => tmp,
            Err(e) => {
                on_error(&e);
                return None;
            }
        };
        let copied = match io::copy(stream, &mut tmp) {
            Ok(copied) => copied,
            Err(e) => {
                on_error(&e);
                return None;
            }
        };
        if copied == 0 {
            return None;
        }
        match tmp.persist(&path) {
            Ok(_) => {
                tracing::debug!("cached artifact at {}", path.display());
                Some(path)
            }
            Err(e) => {
                on_error(&e.error);
                None
            }
        }
    }
}
