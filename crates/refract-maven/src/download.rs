//! The POM downloader: walks candidate repositories in order, consulting
//! the cache before touching the transport.

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use refract_core::execution::ExecutionContext;
use refract_util::errors::RefractError;

use crate::cache::{ArtifactCache, CacheResult, PomCache};
use crate::checksum;
use crate::coordinate::{Coordinate, GroupArtifact};
use crate::metadata::MavenMetadata;
use crate::pom::RawPom;
use crate::repository::Repository;
use crate::resolver::Dependency;
use crate::version::MavenVersion;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// The supplied HTTP transport.
///
/// `Ok(None)` is a definitive "not here" (HTTP 404) and may be cached as
/// `Unavailable`; `Err` is a failed lookup and is never cached.
pub trait MavenTransport: Send + Sync {
    fn get(&self, url: &str) -> miette::Result<Option<Vec<u8>>>;
}

/// Blocking HTTP transport with retries on server errors and timeouts.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> miette::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("refract/0.1")
            .build()
            .map_err(|e| RefractError::Transport {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl MavenTransport for HttpTransport {
    fn get(&self, url: &str) -> miette::Result<Option<Vec<u8>>> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                std::thread::sleep(RETRY_DELAY * attempt);
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status.is_server_error() {
                        last_err = format!("HTTP {status} from {url}");
                        continue;
                    }
                    if !status.is_success() {
                        return Err(RefractError::Transport {
                            message: format!("HTTP {status} fetching {url}"),
                        }
                        .into());
                    }
                    let bytes = resp.bytes().map_err(|e| RefractError::Transport {
                        message: format!("failed to read response from {url}: {e}"),
                    })?;
                    return Ok(Some(bytes.to_vec()));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = format!("{e}");
                    continue;
                }
                Err(e) => {
                    return Err(RefractError::Transport {
                        message: format!("request to {url} failed: {e}"),
                    }
                    .into());
                }
            }
        }

        Err(RefractError::Transport {
            message: format!("failed after {MAX_RETRIES} retries for {url}: {last_err}"),
        }
        .into())
    }
}

/// Downloads POMs, metadata, and artifacts through the layered cache.
pub struct MavenDownloader {
    cache: Arc<dyn PomCache>,
    transport: Arc<dyn MavenTransport>,
}

impl MavenDownloader {
    pub fn new(cache: Arc<dyn PomCache>, transport: Arc<dyn MavenTransport>) -> Self {
        Self { cache, transport }
    }

    /// Normalize a repository descriptor, memoized by configured URI.
    pub fn normalize_repository(
        &self,
        repo: &Repository,
        ctx: &ExecutionContext,
    ) -> miette::Result<Option<Repository>> {
        ctx.check_cancelled()?;
        self.cache
            .compute_repository(repo, &|| Ok(Some(repo.normalize())))
            .map(CacheResult::into_option)
    }

    /// Fetch the raw POM for a coordinate from the first repository that
    /// has it. Repositories answering `Unavailable` are not asked again for
    /// this coordinate; if every repository is `Unavailable` the coordinate
    /// is unresolved.
    pub fn download_pom(
        &self,
        coordinate: &Coordinate,
        repos: &[Repository],
        ctx: &ExecutionContext,
    ) -> miette::Result<RawPom> {
        let snapshot = MavenVersion::parse(&coordinate.version).is_snapshot();

        for repo in repos {
            let Some(repo) = self.normalize_repository(repo, ctx)? else {
                continue;
            };
            if (snapshot && !repo.snapshots) || (!snapshot && !repo.releases) {
                continue;
            }

            let url = repo.pom_url(coordinate);
            let producer = || {
                ctx.check_cancelled()?;
                tracing::debug!("fetching POM {url}");
                match self.transport.get(&url)? {
                    Some(bytes) => RawPom::parse(&String::from_utf8_lossy(&bytes)).map(Some),
                    None => Ok(None),
                }
            };
            match self.cache.compute_pom(&repo, coordinate, &producer)? {
                CacheResult::Cached(pom) | CacheResult::Updated(pom) => return Ok(pom),
                CacheResult::Unavailable => continue,
            }
        }

        Err(RefractError::PomNotFound {
            coordinate: coordinate.to_string(),
        }
        .into())
    }

    /// Fetch and merge `maven-metadata.xml` across every repository that
    /// has it: union of version lists, newest release markers.
    pub fn download_metadata(
        &self,
        ga: &GroupArtifact,
        repos: &[Repository],
        ctx: &ExecutionContext,
    ) -> miette::Result<MavenMetadata> {
        let mut merged: Option<MavenMetadata> = None;

        for repo in repos {
            let Some(repo) = self.normalize_repository(repo, ctx)? else {
                continue;
            };

            let url = repo.metadata_url(ga);
            let producer = || {
                ctx.check_cancelled()?;
                tracing::debug!("fetching metadata {url}");
                match self.transport.get(&url)? {
                    Some(bytes) => {
                        MavenMetadata::parse(&String::from_utf8_lossy(&bytes)).map(Some)
                    }
                    None => Ok(None),
                }
            };
            if let Some(found) = self
                .cache
                .compute_metadata(&repo, ga, &producer)?
                .into_option()
            {
                merged = Some(match merged.take() {
                    Some(previous) => previous.merge(found),
                    None => found,
                });
            }
        }

        merged.ok_or_else(|| {
            RefractError::PomNotFound {
                coordinate: ga.to_string(),
            }
            .into()
        })
    }

    /// Fetch the artifact bytes for a resolved dependency through the
    /// artifact cache, verifying checksum sidecars on a fresh download.
    pub fn download_artifact(
        &self,
        dependency: &Dependency,
        repos: &[Repository],
        artifact_cache: &dyn ArtifactCache,
        ctx: &ExecutionContext,
    ) -> miette::Result<PathBuf> {
        let producer = || -> miette::Result<Option<Box<dyn Read>>> {
            let coordinate = &dependency.coordinate;
            let extension = dependency.type_.as_deref().unwrap_or("jar");
            for repo in repos {
                let Some(repo) = self.normalize_repository(repo, ctx)? else {
                    continue;
                };
                ctx.check_cancelled()?;
                let url =
                    repo.artifact_url(coordinate, dependency.classifier.as_deref(), extension);
                if let Some(bytes) = self.transport.get(&url)? {
                    checksum::verify(self.transport.as_ref(), &url, &bytes)?;
                    return Ok(Some(Box::new(Cursor::new(bytes))));
                }
            }
            Ok(None)
        };
        let on_error = |e: &std::io::Error| {
            tracing::warn!(
                "failed to cache artifact for {}: {e}",
                dependency.coordinate
            );
        };

        artifact_cache
            .compute(dependency, &producer, &on_error)?
            .ok_or_else(|| {
                RefractError::PomNotFound {
                    coordinate: dependency.coordinate.to_string(),
                }
                .into()
            })
    }
}
