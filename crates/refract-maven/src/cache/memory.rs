//! In-memory cache backend: per-key slots behind a concurrent map.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use crate::coordinate::{Coordinate, GroupArtifact};
use crate::metadata::MavenMetadata;
use crate::pom::RawPom;
use crate::repository::Repository;

use super::{
    metadata_key, pom_key, repository_key, unresolvable_coordinates, CacheResult, Entry, PomCache,
    Producer,
};

type SlotMap<T> = DashMap<String, Arc<Mutex<Entry<T>>>>;

/// The in-memory `PomCache`: three maps of tri-state slots.
///
/// The map-level lock only covers slot insertion; production happens under
/// the per-key mutex, so concurrent callers for the same key block on one
/// producer invocation while other keys proceed.
pub struct InMemoryPomCache {
    poms: SlotMap<RawPom>,
    metadata: SlotMap<MavenMetadata>,
    repositories: SlotMap<Repository>,
    unresolvable: HashSet<Coordinate>,
}

impl InMemoryPomCache {
    pub fn new() -> Self {
        Self {
            poms: DashMap::new(),
            metadata: DashMap::new(),
            repositories: DashMap::new(),
            unresolvable: unresolvable_coordinates().clone(),
        }
    }

    /// Extend the built-in unresolvable list at construction; the set is
    /// read-only afterward.
    pub fn with_unresolvable(extra: impl IntoIterator<Item = Coordinate>) -> Self {
        let mut cache = Self::new();
        cache.unresolvable.extend(extra);
        cache
    }
}

impl Default for InMemoryPomCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PomCache for InMemoryPomCache {
    fn compute_metadata(
        &self,
        repo: &Repository,
        ga: &GroupArtifact,
        or_else: Producer<'_, MavenMetadata>,
    ) -> miette::Result<CacheResult<MavenMetadata>> {
        compute_slot(&self.metadata, metadata_key(repo, ga), false, or_else)
    }

    fn compute_pom(
        &self,
        repo: &Repository,
        coordinate: &Coordinate,
        or_else: Producer<'_, RawPom>,
    ) -> miette::Result<CacheResult<RawPom>> {
        let unresolvable = self.unresolvable.contains(coordinate);
        compute_slot(&self.poms, pom_key(repo, coordinate), unresolvable, or_else)
    }

    fn compute_repository(
        &self,
        repo: &Repository,
        or_else: Producer<'_, Repository>,
    ) -> miette::Result<CacheResult<Repository>> {
        compute_slot(&self.repositories, repository_key(repo), false, or_else)
    }
}

fn compute_slot<T: Clone>(
    map: &SlotMap<T>,
    key: String,
    unresolvable: bool,
    producer: Producer<'_, T>,
) -> miette::Result<CacheResult<T>> {
    let slot = map
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(Entry::Missing)))
        .clone();
    let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
    match &*entry {
        Entry::Present(value) => Ok(CacheResult::Cached(value.clone())),
        Entry::Unavailable => Ok(CacheResult::Unavailable),
        Entry::Missing => {
            if unresolvable {
                *entry = Entry::Unavailable;
                return Ok(CacheResult::Unavailable);
            }
            // A producer error leaves the slot Missing: errors are not
            // cached, only answers are.
            match producer()? {
                Some(value) => {
                    *entry = Entry::Present(value.clone());
                    Ok(CacheResult::Updated(value))
                }
                None => {
                    *entry = Entry::Unavailable;
                    Ok(CacheResult::Unavailable)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PomCacheExt;
    use refract_util::errors::RefractError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn repo() -> Repository {
        Repository::maven_central()
    }

    fn coordinate() -> Coordinate {
        Coordinate::new("org.example", "lib", "1.0")
    }

    fn sample_pom() -> RawPom {
        RawPom {
            group_id: Some("org.example".into()),
            artifact_id: Some("lib".into()),
            version: Some("1.0".into()),
            ..Default::default()
        }
    }

    #[test]
    fn producer_runs_at_most_once() {
        let cache = InMemoryPomCache::new();
        let calls = AtomicUsize::new(0);
        let producer = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(sample_pom()))
        };

        let first = cache.compute_pom(&repo(), &coordinate(), &producer).unwrap();
        assert!(first.is_updated());
        let second = cache.compute_pom(&repo(), &coordinate(), &producer).unwrap();
        assert!(second.is_cached());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unavailable_is_sticky() {
        let cache = InMemoryPomCache::new();
        let calls = AtomicUsize::new(0);
        let producer = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        };

        assert!(cache
            .compute_pom(&repo(), &coordinate(), &producer)
            .unwrap()
            .is_unavailable());
        assert!(cache
            .compute_pom(&repo(), &coordinate(), &producer)
            .unwrap()
            .is_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_are_not_sticky() {
        let cache = InMemoryPomCache::new();
        let failing = || {
            Err(RefractError::Transport {
                message: "connection reset".into(),
            }
            .into())
        };
        assert!(cache.compute_pom(&repo(), &coordinate(), &failing).is_err());

        let succeeding = || Ok(Some(sample_pom()));
        let result = cache
            .compute_pom(&repo(), &coordinate(), &succeeding)
            .unwrap();
        assert!(result.is_updated());
    }

    #[test]
    fn unresolvable_short_circuits_producer() {
        let cache = InMemoryPomCache::new();
        let listed = Coordinate::new("jline", "jline", "0.9.94");
        let calls = AtomicUsize::new(0);
        let producer = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(sample_pom()))
        };

        let result = cache.compute_pom(&repo(), &listed, &producer).unwrap();
        assert!(result.is_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn extra_unresolvable_at_construction() {
        let extra = Coordinate::new("org.example", "broken", "1.0");
        let cache = InMemoryPomCache::with_unresolvable([extra.clone()]);
        let producer = || Ok(Some(sample_pom()));
        assert!(cache
            .compute_pom(&repo(), &extra, &producer)
            .unwrap()
            .is_unavailable());
    }

    #[test]
    fn metadata_and_repository_lookups_memoize() {
        let cache = InMemoryPomCache::new();
        let ga = GroupArtifact::new("org.example", "lib");
        let metadata = MavenMetadata {
            versions: vec!["1.0".into()],
            ..Default::default()
        };

        let meta_producer = || Ok(Some(metadata.clone()));
        assert!(cache
            .compute_metadata(&repo(), &ga, &meta_producer)
            .unwrap()
            .is_updated());
        assert!(cache
            .compute_metadata(&repo(), &ga, &meta_producer)
            .unwrap()
            .is_cached());

        let normalized = repo().normalize();
        let repo_producer = || Ok(Some(normalized.clone()));
        assert!(cache
            .compute_repository(&repo(), &repo_producer)
            .unwrap()
            .is_updated());
        assert!(cache
            .compute_repository(&repo(), &repo_producer)
            .unwrap()
            .is_cached());
    }

    #[test]
    fn composition_checks_primary_first() {
        let layered = InMemoryPomCache::new().or_else(InMemoryPomCache::new());
        let calls = AtomicUsize::new(0);
        let producer = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(sample_pom()))
        };

        // First request produces once and writes through both layers.
        let first = layered.compute_pom(&repo(), &coordinate(), &producer).unwrap();
        assert!(first.is_updated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second request is served by the primary without reaching the
        // fallback or the producer.
        let second = layered.compute_pom(&repo(), &coordinate(), &producer).unwrap();
        assert!(second.is_cached());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composition_falls_through_to_warm_fallback() {
        let fallback = InMemoryPomCache::new();
        let warm = || Ok(Some(sample_pom()));
        fallback.compute_pom(&repo(), &coordinate(), &warm).unwrap();

        let layered = InMemoryPomCache::new().or_else(fallback);
        let never = || -> miette::Result<Option<RawPom>> {
            panic!("producer must not run when the fallback has the value")
        };
        let result = layered.compute_pom(&repo(), &coordinate(), &never).unwrap();
        assert_eq!(result.into_option(), Some(sample_pom()));
    }

    #[test]
    fn composition_propagates_unavailable() {
        let fallback = InMemoryPomCache::new();
        let gone = || Ok(None);
        fallback.compute_pom(&repo(), &coordinate(), &gone).unwrap();

        let layered = InMemoryPomCache::new().or_else(fallback);
        let never = || -> miette::Result<Option<RawPom>> {
            panic!("producer must not run for a cached negative answer")
        };
        assert!(layered
            .compute_pom(&repo(), &coordinate(), &never)
            .unwrap()
            .is_unavailable());
    }

    #[test]
    fn concurrent_callers_share_one_production() {
        let cache = Arc::new(InMemoryPomCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    let producer = || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        Ok(Some(sample_pom()))
                    };
                    cache
                        .compute_pom(&repo(), &coordinate(), &producer)
                        .unwrap()
                        .into_option()
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), sample_pom());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
