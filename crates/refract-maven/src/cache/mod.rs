//! The layered POM cache.
//!
//! Three kinds of remote lookups are memoized: raw POMs, group-metadata
//! listings, and normalized repository descriptors. Every lookup takes a
//! deferred producer that only runs on a miss, and reports one of three
//! outcomes: `Cached` (hit), `Updated` (miss, producer ran), `Unavailable`
//! (the upstream definitively does not have it; a positive statement,
//! cached like any other answer). Producer errors are never cached.

mod artifact;
mod memory;
mod persistent;

pub use artifact::{ArtifactCache, ArtifactCacheExt, CompositeArtifactCache, LocalArtifactCache, NoopArtifactCache};
pub use memory::InMemoryPomCache;
pub use persistent::{PersistentPomCache, PersistentPomCacheBuilder};

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::coordinate::{Coordinate, GroupArtifact};
use crate::metadata::MavenMetadata;
use crate::pom::RawPom;
use crate::repository::Repository;

/// Outcome of a cache lookup. The payload is absent exactly when the
/// variant is `Unavailable`.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Hit; the producer was not invoked.
    Cached(T),
    /// Miss; the producer ran and its answer was stored.
    Updated(T),
    /// The upstream definitively does not have it.
    Unavailable,
}

impl<T> CacheResult<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheResult::Cached(value) | CacheResult::Updated(value) => Some(value),
            CacheResult::Unavailable => None,
        }
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            CacheResult::Cached(value) | CacheResult::Updated(value) => Some(value),
            CacheResult::Unavailable => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, CacheResult::Cached(_))
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, CacheResult::Updated(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheResult::Unavailable)
    }
}

/// Deferred producer invoked only on a cache miss.
///
/// `Ok(Some(v))` is a positive answer, `Ok(None)` means the upstream
/// definitively does not have the value (cached as `Unavailable`), and
/// `Err` is a failed lookup that must not be cached.
pub type Producer<'a, T> = &'a dyn Fn() -> miette::Result<Option<T>>;

/// Cache of raw POMs, metadata listings, and normalized repositories.
///
/// Implementations must be safe for concurrent callers and must invoke the
/// producer at most once per key, blocking concurrent callers for the same
/// key on that one invocation.
pub trait PomCache: Send + Sync {
    fn compute_metadata(
        &self,
        repo: &Repository,
        ga: &GroupArtifact,
        or_else: Producer<'_, MavenMetadata>,
    ) -> miette::Result<CacheResult<MavenMetadata>>;

    fn compute_pom(
        &self,
        repo: &Repository,
        coordinate: &Coordinate,
        or_else: Producer<'_, RawPom>,
    ) -> miette::Result<CacheResult<RawPom>>;

    fn compute_repository(
        &self,
        repo: &Repository,
        or_else: Producer<'_, Repository>,
    ) -> miette::Result<CacheResult<Repository>>;
}

/// Layering combinator: `a.or_else(b)` checks `a` first and falls through
/// to `b` on a miss.
pub trait PomCacheExt: PomCache + Sized {
    fn or_else<B: PomCache>(self, fallback: B) -> CompositePomCache<Self, B> {
        CompositePomCache {
            primary: self,
            fallback,
        }
    }
}

impl<T: PomCache + Sized> PomCacheExt for T {}

/// Two caches layered: the fallback acts as the primary's producer, so a
/// value found (or produced) in the fallback is written through to the
/// primary, and a fallback `Unavailable` is cached as such in the primary.
pub struct CompositePomCache<A, B> {
    primary: A,
    fallback: B,
}

impl<A: PomCache, B: PomCache> PomCache for CompositePomCache<A, B> {
    fn compute_metadata(
        &self,
        repo: &Repository,
        ga: &GroupArtifact,
        or_else: Producer<'_, MavenMetadata>,
    ) -> miette::Result<CacheResult<MavenMetadata>> {
        let fall_through = || {
            self.fallback
                .compute_metadata(repo, ga, or_else)
                .map(CacheResult::into_option)
        };
        self.primary.compute_metadata(repo, ga, &fall_through)
    }

    fn compute_pom(
        &self,
        repo: &Repository,
        coordinate: &Coordinate,
        or_else: Producer<'_, RawPom>,
    ) -> miette::Result<CacheResult<RawPom>> {
        let fall_through = || {
            self.fallback
                .compute_pom(repo, coordinate, or_else)
                .map(CacheResult::into_option)
        };
        self.primary.compute_pom(repo, coordinate, &fall_through)
    }

    fn compute_repository(
        &self,
        repo: &Repository,
        or_else: Producer<'_, Repository>,
    ) -> miette::Result<CacheResult<Repository>> {
        let fall_through = || {
            self.fallback
                .compute_repository(repo, or_else)
                .map(CacheResult::into_option)
        };
        self.primary.compute_repository(repo, &fall_through)
    }
}

/// Pass-through cache: stores nothing, always runs the producer. The
/// unresolvable list still applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPomCache;

impl PomCache for NoopPomCache {
    fn compute_metadata(
        &self,
        _repo: &Repository,
        _ga: &GroupArtifact,
        or_else: Producer<'_, MavenMetadata>,
    ) -> miette::Result<CacheResult<MavenMetadata>> {
        Ok(match or_else()? {
            Some(value) => CacheResult::Updated(value),
            None => CacheResult::Unavailable,
        })
    }

    fn compute_pom(
        &self,
        _repo: &Repository,
        coordinate: &Coordinate,
        or_else: Producer<'_, RawPom>,
    ) -> miette::Result<CacheResult<RawPom>> {
        if unresolvable_coordinates().contains(coordinate) {
            return Ok(CacheResult::Unavailable);
        }
        Ok(match or_else()? {
            Some(value) => CacheResult::Updated(value),
            None => CacheResult::Unavailable,
        })
    }

    fn compute_repository(
        &self,
        _repo: &Repository,
        or_else: Producer<'_, Repository>,
    ) -> miette::Result<CacheResult<Repository>> {
        Ok(match or_else()? {
            Some(value) => CacheResult::Updated(value),
            None => CacheResult::Unavailable,
        })
    }
}

/// Explicit tri-state for one cache slot: never looked up, definitively
/// absent upstream, or present.
#[derive(Debug, Clone, Default)]
pub(crate) enum Entry<T> {
    #[default]
    Missing,
    Unavailable,
    Present(T),
}

/// Coordinates known to be permanently unresolvable, loaded once from the
/// bundled `unresolvable.txt`.
pub(crate) fn unresolvable_coordinates() -> &'static HashSet<Coordinate> {
    static UNRESOLVABLE: OnceLock<HashSet<Coordinate>> = OnceLock::new();
    UNRESOLVABLE.get_or_init(|| {
        include_str!("unresolvable.txt")
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| Coordinate::parse(line).ok())
            .collect()
    })
}

/// Cache key for a POM: repository (by normalized URI) plus coordinate.
pub(crate) fn pom_key(repo: &Repository, coordinate: &Coordinate) -> String {
    format!("{}|{}", repo.normalize().uri, coordinate)
}

/// Cache key for group metadata: repository (by normalized URI) plus
/// `group:artifact`.
pub(crate) fn metadata_key(repo: &Repository, ga: &GroupArtifact) -> String {
    format!("{}|{}", repo.normalize().uri, ga)
}

/// Cache key for a normalized repository: the URI as configured.
pub(crate) fn repository_key(repo: &Repository) -> String {
    repo.uri.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_list_loads() {
        let list = unresolvable_coordinates();
        assert!(list.contains(&Coordinate::new("jline", "jline", "0.9.94")));
        assert!(!list.contains(&Coordinate::new("junit", "junit", "4.13.2")));
    }

    #[test]
    fn cache_result_payload_absent_iff_unavailable() {
        assert_eq!(CacheResult::Cached(1).into_option(), Some(1));
        assert_eq!(CacheResult::Updated(2).into_option(), Some(2));
        assert_eq!(CacheResult::<i32>::Unavailable.into_option(), None);
    }

    #[test]
    fn keys_use_normalized_repository_uri() {
        let coordinate = Coordinate::new("g", "a", "1");
        let with_slash = Repository::new("r", "http://repo.example.com/maven2/");
        let without = Repository::new("r", "https://repo.example.com/maven2");
        assert_eq!(
            pom_key(&with_slash, &coordinate),
            pom_key(&without, &coordinate)
        );
    }
}
