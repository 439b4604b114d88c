//! Cache layering: an in-memory layer over the persistent store.

use std::sync::atomic::{AtomicUsize, Ordering};

use refract_maven::cache::{
    CacheResult, InMemoryPomCache, PersistentPomCache, PomCache, PomCacheExt,
};
use refract_maven::coordinate::Coordinate;
use refract_maven::pom::RawPom;
use refract_maven::repository::Repository;

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
fn memory_over_persistent_writes_through_and_reads_back() {
    let workspace = tempfile::tempdir().unwrap();
    let repo = Repository::maven_central();
    let calls = AtomicUsize::new(0);
    let producer = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(sample_pom()))
    };

    {
        let persistent = PersistentPomCache::builder()
            .workspace(workspace.path())
            .build()
            .unwrap();
        let layered = InMemoryPomCache::new().or_else(persistent);

        // First request: one producer run, both layers updated.
        let first = layered.compute_pom(&repo, &coordinate(), &producer).unwrap();
        assert!(first.is_updated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second request: served from the in-memory layer.
        let second = layered.compute_pom(&repo, &coordinate(), &producer).unwrap();
        assert!(second.is_cached());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // A cold in-memory layer over the reopened store: the persistent layer
    // answers, the producer still never runs again.
    let persistent = PersistentPomCache::builder()
        .workspace(workspace.path())
        .build()
        .unwrap();
    let layered = InMemoryPomCache::new().or_else(persistent);
    let result = layered.compute_pom(&repo, &coordinate(), &producer).unwrap();
    assert_eq!(result.into_option(), Some(sample_pom()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_propagates_through_the_layers() {
    let repo = Repository::maven_central();
    let layered = InMemoryPomCache::new().or_else(
        PersistentPomCache::builder().build().unwrap(),
    );
    let calls = AtomicUsize::new(0);
    let producer = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    };

    assert!(layered
        .compute_pom(&repo, &coordinate(), &producer)
        .unwrap()
        .is_unavailable());
    assert!(layered
        .compute_pom(&repo, &coordinate(), &producer)
        .unwrap()
        .is_unavailable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn composition_matches_single_layer_lookup() {
    // (a.or_else(b)).get(k) agrees with a.get(k) ?? b.get(k).
    let repo = Repository::maven_central();
    let warm = || Ok(Some(sample_pom()));

    let a = InMemoryPomCache::new();
    a.compute_pom(&repo, &coordinate(), &warm).unwrap();
    let direct = a
        .compute_pom(&repo, &coordinate(), &warm)
        .unwrap()
        .into_option();

    let layered = a.or_else(InMemoryPomCache::new());
    let composed = layered
        .compute_pom(&repo, &coordinate(), &warm)
        .unwrap()
        .into_option();
    assert_eq!(direct, composed);

    // And for a key neither layer has seen, the composed result equals
    // what the fallback alone would produce.
    let other = Coordinate::new("org.example", "other", "2.0");
    let composed = layered.compute_pom(&repo, &other, &warm).unwrap();
    assert!(matches!(composed, CacheResult::Updated(_)));
}

#[test]
fn unresolvable_short_circuit_holds_across_layers() {
    let repo = Repository::maven_central();
    let listed = Coordinate::new("jline", "jline", "0.9.94");
    let layered = InMemoryPomCache::new().or_else(
        PersistentPomCache::builder().build().unwrap(),
    );
    let calls = AtomicUsize::new(0);
    let producer = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(sample_pom()))
    };

    assert!(layered
        .compute_pom(&repo, &listed, &producer)
        .unwrap()
        .is_unavailable());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
