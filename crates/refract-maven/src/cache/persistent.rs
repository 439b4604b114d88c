//! Persistent cache backend over a memory-mapped key/value store.
//!
//! One store per workspace directory, holding three named maps
//! (`pom.disk`, `metadata.disk`, `repository.urls`). Values are
//! length-prefixed bincode records of `Option<T>`: `Some` is a positive
//! answer, `None` a cached negative answer, and an absent key means the
//! lookup never happened. Without a workspace the backend degrades to a
//! bounded in-memory map with LRU-by-serialized-size eviction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

use refract_util::errors::RefractError;

use crate::coordinate::{Coordinate, GroupArtifact};
use crate::metadata::MavenMetadata;
use crate::pom::RawPom;
use crate::repository::Repository;

use super::{
    metadata_key, pom_key, repository_key, unresolvable_coordinates, CacheResult, Entry, PomCache,
    Producer,
};

const POM_DB: &str = "pom.disk";
const METADATA_DB: &str = "metadata.disk";
const REPOSITORY_DB: &str = "repository.urls";

const DEFAULT_MAP_SIZE: u64 = 256 * 1024 * 1024;
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);
const LOCK_FILE: &str = ".refract-cache.lock";

/// Builder for [`PersistentPomCache`]; chainable by value.
pub struct PersistentPomCacheBuilder {
    workspace: Option<PathBuf>,
    max_store_size: Option<u64>,
    lock_wait: Duration,
}

impl PersistentPomCacheBuilder {
    pub fn new() -> Self {
        Self {
            workspace: None,
            max_store_size: None,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Directory holding the store. Without one, the cache runs in bounded
    /// in-memory mode.
    pub fn workspace(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace = Some(dir.into());
        self
    }

    /// Upper bound on the store size in bytes. Zero or unset means no
    /// limit in memory mode, and the default map size on disk.
    pub fn max_store_size(mut self, bytes: u64) -> Self {
        self.max_store_size = Some(bytes);
        self
    }

    /// How long to wait for the store lock before failing with
    /// `CacheLocked`.
    pub fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn build(self) -> miette::Result<PersistentPomCache> {
        let store = match &self.workspace {
            Some(dir) => {
                let lock = StoreLock::acquire(dir, self.lock_wait)?;
                Store::Disk {
                    store: DiskStore::open(dir, self.max_store_size)?,
                    _lock: lock,
                }
            }
            None => Store::Memory(Mutex::new(MemoryStore::new(self.max_store_size))),
        };
        Ok(PersistentPomCache {
            store,
            in_flight: DashMap::new(),
            unresolvable: unresolvable_coordinates().clone(),
        })
    }
}

impl Default for PersistentPomCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The persistent `PomCache` backend.
pub struct PersistentPomCache {
    store: Store,
    /// Per-key production locks; the store itself only sees completed
    /// answers.
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    unresolvable: HashSet<Coordinate>,
}

impl std::fmt::Debug for PersistentPomCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentPomCache").finish_non_exhaustive()
    }
}

impl PersistentPomCache {
    pub fn builder() -> PersistentPomCacheBuilder {
        PersistentPomCacheBuilder::new()
    }

    fn compute<T>(
        &self,
        db: StoreMap,
        key: String,
        unresolvable: bool,
        producer: Producer<'_, T>,
    ) -> miette::Result<CacheResult<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let lock = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self.store.read::<T>(db, &key)? {
            Entry::Present(value) => Ok(CacheResult::Cached(value)),
            Entry::Unavailable => Ok(CacheResult::Unavailable),
            Entry::Missing => {
                if unresolvable {
                    self.store.write::<T>(db, &key, &None)?;
                    return Ok(CacheResult::Unavailable);
                }
                match producer()? {
                    Some(value) => {
                        self.store.write(db, &key, &Some(value.clone()))?;
                        Ok(CacheResult::Updated(value))
                    }
                    None => {
                        self.store.write::<T>(db, &key, &None)?;
                        Ok(CacheResult::Unavailable)
                    }
                }
            }
        }
    }
}

impl PomCache for PersistentPomCache {
    fn compute_metadata(
        &self,
        repo: &Repository,
        ga: &GroupArtifact,
        or_else: Producer<'_, MavenMetadata>,
    ) -> miette::Result<CacheResult<MavenMetadata>> {
        self.compute(StoreMap::Metadata, metadata_key(repo, ga), false, or_else)
    }

    fn compute_pom(
        &self,
        repo: &Repository,
        coordinate: &Coordinate,
        or_else: Producer<'_, RawPom>,
    ) -> miette::Result<CacheResult<RawPom>> {
        let unresolvable = self.unresolvable.contains(coordinate);
        self.compute(StoreMap::Pom, pom_key(repo, coordinate), unresolvable, or_else)
    }

    fn compute_repository(
        &self,
        repo: &Repository,
        or_else: Producer<'_, Repository>,
    ) -> miette::Result<CacheResult<Repository>> {
        self.compute(StoreMap::Repository, repository_key(repo), false, or_else)
    }
}

#[derive(Debug, Clone, Copy)]
enum StoreMap {
    Pom,
    Metadata,
    Repository,
}

enum Store {
    Disk { store: DiskStore, _lock: StoreLock },
    Memory(Mutex<MemoryStore>),
}

impl Store {
    fn read<T: DeserializeOwned>(&self, map: StoreMap, key: &str) -> miette::Result<Entry<T>> {
        let bytes = match self {
            Store::Disk { store, .. } => store.read(map, key)?,
            Store::Memory(memory) => memory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read(map, key),
        };
        match bytes {
            Some(bytes) => Ok(match decode::<Option<T>>(&bytes)? {
                Some(value) => Entry::Present(value),
                None => Entry::Unavailable,
            }),
            None => Ok(Entry::Missing),
        }
    }

    fn write<T: Serialize>(
        &self,
        map: StoreMap,
        key: &str,
        value: &Option<T>,
    ) -> miette::Result<()> {
        let bytes = encode(value)?;
        match self {
            Store::Disk { store, .. } => store.write(map, key, &bytes),
            Store::Memory(memory) => {
                memory
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .write(map, key, bytes);
                Ok(())
            }
        }
    }
}

/// The heed (LMDB) store: one environment per workspace, three named
/// databases.
struct DiskStore {
    env: Env,
    poms: Database<Str, Bytes>,
    metadata: Database<Str, Bytes>,
    repositories: Database<Str, Bytes>,
}

impl DiskStore {
    fn open(dir: &Path, max_store_size: Option<u64>) -> miette::Result<Self> {
        refract_util::fs::ensure_dir(dir).map_err(RefractError::Io)?;
        let map_size = match max_store_size {
            Some(bytes) if bytes > 0 => bytes,
            _ => DEFAULT_MAP_SIZE,
        };
        // Safety: the workspace is exclusively locked by `StoreLock`, so
        // this process opens the environment at most once.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size as usize)
                .max_dbs(3)
                .open(dir)
                .map_err(store_error)?
        };
        let mut wtxn = env.write_txn().map_err(store_error)?;
        let poms = env
            .create_database(&mut wtxn, Some(POM_DB))
            .map_err(store_error)?;
        let metadata = env
            .create_database(&mut wtxn, Some(METADATA_DB))
            .map_err(store_error)?;
        let repositories = env
            .create_database(&mut wtxn, Some(REPOSITORY_DB))
            .map_err(store_error)?;
        wtxn.commit().map_err(store_error)?;
        Ok(Self {
            env,
            poms,
            metadata,
            repositories,
        })
    }

    fn database(&self, map: StoreMap) -> Database<Str, Bytes> {
        match map {
            StoreMap::Pom => self.poms,
            StoreMap::Metadata => self.metadata,
            StoreMap::Repository => self.repositories,
        }
    }

    fn read(&self, map: StoreMap, key: &str) -> miette::Result<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(store_error)?;
        let value = self
            .database(map)
            .get(&rtxn, key)
            .map_err(store_error)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    fn write(&self, map: StoreMap, key: &str, bytes: &[u8]) -> miette::Result<()> {
        let mut wtxn = self.env.write_txn().map_err(store_error)?;
        self.database(map)
            .put(&mut wtxn, key, bytes)
            .map_err(store_error)?;
        wtxn.commit().map_err(store_error)?;
        tracing::debug!("cache store wrote {key}");
        Ok(())
    }
}

/// Bounded in-memory fallback with LRU-by-serialized-size eviction.
///
/// A zero or absent maximum means no limit.
struct MemoryStore {
    maps: [HashMap<String, Vec<u8>>; 3],
    order: VecDeque<(usize, String)>,
    total: u64,
    max: u64,
}

impl MemoryStore {
    fn new(max: Option<u64>) -> Self {
        Self {
            maps: [HashMap::new(), HashMap::new(), HashMap::new()],
            order: VecDeque::new(),
            total: 0,
            max: max.unwrap_or(0),
        }
    }

    fn index(map: StoreMap) -> usize {
        match map {
            StoreMap::Pom => 0,
            StoreMap::Metadata => 1,
            StoreMap::Repository => 2,
        }
    }

    fn read(&mut self, map: StoreMap, key: &str) -> Option<Vec<u8>> {
        let index = Self::index(map);
        let value = self.maps[index].get(key).cloned()?;
        self.touch(index, key);
        Some(value)
    }

    fn write(&mut self, map: StoreMap, key: &str, bytes: Vec<u8>) {
        let index = Self::index(map);
        if let Some(old) = self.maps[index].insert(key.to_string(), bytes) {
            self.total = self.total.saturating_sub(old.len() as u64);
        }
        self.total += self.maps[index][key].len() as u64;
        self.touch(index, key);
        self.evict();
    }

    fn touch(&mut self, index: usize, key: &str) {
        self.order
            .retain(|(i, k)| !(*i == index && k.as_str() == key));
        self.order.push_back((index, key.to_string()));
    }

    fn evict(&mut self) {
        if self.max == 0 {
            return;
        }
        while self.total > self.max {
            let Some((index, key)) = self.order.pop_front() else {
                break;
            };
            if let Some(old) = self.maps[index].remove(&key) {
                self.total = self.total.saturating_sub(old.len() as u64);
            }
        }
    }
}

/// Exclusive lock on a workspace, held for the lifetime of the store.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(dir: &Path, wait: Duration) -> miette::Result<Self> {
        refract_util::fs::ensure_dir(dir).map_err(RefractError::Io)?;
        let path = dir.join(LOCK_FILE);
        let deadline = Instant::now() + wait;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(RefractError::CacheLocked {
                            path: dir.display().to_string(),
                        }
                        .into());
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(RefractError::Io(e).into()),
            }
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn encode<T: Serialize>(value: &T) -> miette::Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| {
        RefractError::Generic {
            message: format!("failed to serialize cache record: {e}"),
        }
        .into()
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> miette::Result<T> {
    bincode::deserialize(bytes).map_err(|e| {
        RefractError::Generic {
            message: format!("failed to deserialize cache record: {e}"),
        }
        .into()
    })
}

fn store_error(e: heed::Error) -> RefractError {
    RefractError::Generic {
        message: format!("cache store error: {e}"),
    }
}
