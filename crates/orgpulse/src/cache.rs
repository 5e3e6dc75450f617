//! Local TTL- and size-bounded cache of upstream listings.
//!
//! One [`CacheStore`] owns every persisted entry. Entries live in memory and
//! are written out as a single JSON document (see [`snapshot`]) on explicit
//! [`CacheStore::flush`] or from the background task started by
//! [`CacheStore::spawn_flush_task`].
//!
//! Reads never see an expired entry: an expired hit is deleted and reported as
//! a miss. After every write the store evicts the globally oldest entries
//! until the serialized size is back under the ceiling.
//!
//! # Example
//!
//! ```ignore
//! use orgpulse::cache::{CacheCategory, CacheConfig, CacheStore, keys};
//!
//! let cache = CacheStore::open(CacheConfig::at("cache.json")).await;
//! let repos = cache
//!     .get_or_fetch(CacheCategory::Repositories, &keys::repositories("acme", None), || {
//!         client.list_org_repos("acme", None)
//!     })
//!     .await?;
//! cache.flush().await?;
//! ```

mod entry;
pub mod keys;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::task::JoinHandle;

pub use entry::{CacheCategory, CacheEntry, CacheRecord};
use snapshot::{CacheSnapshot, entry_size, envelope_size};

/// Default size ceiling for the serialized document.
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Default interval of the background flush task.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Errors from cache persistence.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The snapshot on disk could not be parsed. Recovered at load time by
    /// starting empty.
    #[error("cache snapshot is corrupt: {0}")]
    Corrupt(String),
}

/// Source of wall-clock time for expiry decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Per-category time-to-live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub repositories: Duration,
    pub branches: Duration,
    pub commits: Duration,
    pub employees: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            repositories: Duration::from_secs(60 * 60),
            branches: Duration::from_secs(60 * 60),
            commits: Duration::from_secs(24 * 60 * 60),
            employees: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CacheTtls {
    pub fn for_category(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Repositories => self.repositories,
            CacheCategory::Branches => self.branches,
            CacheCategory::Commits => self.commits,
            CacheCategory::Employees => self.employees,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Snapshot file; `None` keeps the cache in memory only.
    pub path: Option<PathBuf>,
    pub max_bytes: usize,
    pub ttls: CacheTtls,
    pub flush_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: DEFAULT_MAX_BYTES,
            ttls: CacheTtls::default(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Default settings persisted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Where a value handed out by [`CacheStore::get_or_fetch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Cache,
    Upstream,
}

/// A value plus its provenance.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub source: DataSource,
}

/// Result of a [`CacheStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored; `evicted` older entries were dropped to make room.
    Stored { evicted: usize },
    /// The entry alone exceeds the size ceiling and was not stored.
    TooLarge { size: usize },
}

/// Item count and size of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStatus {
    pub category: CacheCategory,
    pub items: usize,
    pub bytes: usize,
}

/// Snapshot of the store's occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStoreStatus {
    pub categories: Vec<CategoryStatus>,
    pub total_bytes: usize,
    pub max_bytes: usize,
    pub path: Option<PathBuf>,
    pub dirty: bool,
}

type EntryKey = (CacheCategory, String);

#[derive(Debug)]
struct StoredEntry {
    record: CacheRecord,
    size: usize,
}

struct CacheState {
    entries: BTreeMap<EntryKey, StoredEntry>,
    /// Envelope plus the size of every entry.
    total_bytes: usize,
    dirty: bool,
    /// Records in the snapshot file that were dropped while loading and not
    /// yet reported by an eviction.
    dropped_at_load: usize,
}

impl CacheState {
    fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            total_bytes: envelope_size(),
            dirty: false,
            dropped_at_load: 0,
        }
    }

    fn insert(&mut self, key: EntryKey, entry: StoredEntry) {
        self.total_bytes += entry.size;
        if let Some(old) = self.entries.insert(key, entry) {
            self.total_bytes -= old.size;
        }
        self.dirty = true;
    }

    fn remove(&mut self, key: &EntryKey) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.total_bytes -= old.size;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<EntryKey> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.record.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Drop the oldest entries (by write time, ties in key order) until the
    /// total fits, never touching `keep`.
    fn enforce_ceiling(&mut self, max_bytes: usize, keep: Option<&EntryKey>) -> usize {
        let mut evicted = 0;
        while self.total_bytes > max_bytes {
            let oldest = self
                .entries
                .iter()
                .filter(|(k, _)| Some(*k) != keep)
                .min_by(|(_, a), (_, b)| a.record.timestamp.cmp(&b.record.timestamp))
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    fn snapshot(&self) -> CacheSnapshot {
        let mut snapshot = CacheSnapshot::default();
        for ((category, key), entry) in &self.entries {
            snapshot
                .map_mut(*category)
                .insert(key.clone(), entry.record.clone());
        }
        snapshot
    }
}

struct CacheInner {
    config: CacheConfig,
    clock: Clock,
    state: Mutex<CacheState>,
    key_locks: Mutex<HashMap<EntryKey, Arc<tokio::sync::Mutex<()>>>>,
    /// Held across snapshot and write so flushes land in order.
    flush_lock: tokio::sync::Mutex<()>,
}

/// Shared handle to the cache. Clones refer to the same store.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<CacheInner>,
}

impl CacheStore {
    /// Create an empty store without reading the snapshot file.
    pub fn new(config: CacheConfig) -> Self {
        Self::new_with_clock(config, system_clock())
    }

    pub fn new_with_clock(config: CacheConfig, clock: Clock) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                clock,
                state: Mutex::new(CacheState::empty()),
                key_locks: Mutex::new(HashMap::new()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Create a store and load the snapshot at `config.path`.
    ///
    /// Never fails: a missing file yields an empty store, an unreadable or
    /// corrupt one is logged and also yields an empty store.
    pub async fn open(config: CacheConfig) -> Self {
        Self::open_with_clock(config, system_clock()).await
    }

    pub async fn open_with_clock(config: CacheConfig, clock: Clock) -> Self {
        let store = Self::new_with_clock(config, clock);
        if let Some(path) = store.inner.config.path.clone() {
            match store.load(&path).await {
                Ok(0) => tracing::debug!(path = %path.display(), "Cache starts empty"),
                Ok(count) => {
                    tracing::debug!(path = %path.display(), entries = count, "Cache loaded")
                }
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Discarding unreadable cache snapshot"
                ),
            }
        }
        store
    }

    async fn load(&self, path: &Path) -> Result<usize, CacheError> {
        let Some(bytes) = snapshot::read_optional(path).await? else {
            return Ok(0);
        };
        let snapshot = CacheSnapshot::decode(&bytes)?;

        let now = self.now();
        let mut state = CacheState::empty();
        let mut expired = 0;
        for (category, key, record) in snapshot.into_records() {
            if !record.is_live(now) {
                expired += 1;
                continue;
            }
            let size = entry_size(&key, &record)?;
            state.insert((category, key), StoredEntry { record, size });
        }
        let trimmed = state.enforce_ceiling(self.inner.config.max_bytes, None);

        // Dropped records are still in the file until the next write.
        state.dropped_at_load = expired + trimmed;
        state.dirty = state.dropped_at_load > 0;
        if state.dirty {
            tracing::debug!(expired, trimmed, "Dropped stale records from cache snapshot");
        }

        let count = state.entries.len();
        *self.lock_state() = state;
        Ok(count)
    }

    fn now(&self) -> DateTime<Utc> {
        (self.inner.clock)()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Typed read with metadata.
    ///
    /// Expired entries are deleted. An entry whose data no longer decodes as
    /// `T` is deleted as well and reported as a miss.
    pub fn get_entry<T: DeserializeOwned>(
        &self,
        category: CacheCategory,
        key: &str,
    ) -> Option<CacheEntry<T>> {
        let now = self.now();
        let entry_key = (category, key.to_string());
        let mut state = self.lock_state();

        let record = state.entries.get(&entry_key)?.record.clone();
        if !record.is_live(now) {
            state.remove(&entry_key);
            tracing::trace!(%category, key, "Cache entry expired");
            return None;
        }

        match serde_json::from_value::<T>(record.data) {
            Ok(data) => Some(CacheEntry {
                category,
                data,
                timestamp: record.timestamp,
                expires_at: record.expires_at,
            }),
            Err(e) => {
                state.remove(&entry_key);
                tracing::warn!(%category, key, error = %e, "Dropping undecodable cache entry");
                None
            }
        }
    }

    /// Read a live entry.
    pub fn get<T: DeserializeOwned>(&self, category: CacheCategory, key: &str) -> Option<T> {
        self.get_entry(category, key).map(|e| e.data)
    }

    /// Store `data`, replacing any previous entry under the same key.
    pub fn put<T: Serialize + ?Sized>(
        &self,
        category: CacheCategory,
        key: &str,
        data: &T,
    ) -> Result<PutOutcome, CacheError> {
        let now = self.now();
        let ttl = chrono::Duration::from_std(self.inner.config.ttls.for_category(category))
            .unwrap_or(chrono::Duration::MAX);
        let record = CacheRecord {
            data: serde_json::to_value(data)?,
            timestamp: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let size = entry_size(key, &record)?;
        let max_bytes = self.inner.config.max_bytes;

        if envelope_size() + size > max_bytes {
            tracing::warn!(%category, key, size, max_bytes, "Entry exceeds cache ceiling, not stored");
            return Ok(PutOutcome::TooLarge { size });
        }

        let entry_key = (category, key.to_string());
        let mut state = self.lock_state();
        state.insert(entry_key.clone(), StoredEntry { record, size });
        let evicted = state.enforce_ceiling(max_bytes, Some(&entry_key));
        if evicted > 0 {
            tracing::debug!(evicted, total_bytes = state.total_bytes, "Evicted oldest cache entries");
        }
        Ok(PutOutcome::Stored { evicted })
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, category: CacheCategory, key: &str) -> bool {
        self.lock_state().remove(&(category, key.to_string()))
    }

    /// Delete every expired entry, returning how many were removed.
    ///
    /// Records dropped while loading the snapshot are counted by the first
    /// call.
    pub fn evict_expired(&self) -> usize {
        let now = self.now();
        let mut state = self.lock_state();
        let dropped = std::mem::take(&mut state.dropped_at_load);
        state.remove_expired(now) + dropped
    }

    /// Delete every entry.
    pub fn clear(&self) -> usize {
        let mut state = self.lock_state();
        let count = state.entries.len();
        let dirty = state.dirty || count > 0;
        *state = CacheState::empty();
        state.dirty = dirty;
        count
    }

    /// Delete every entry of one category.
    pub fn clear_category(&self, category: CacheCategory) -> usize {
        let mut state = self.lock_state();
        let keys: Vec<EntryKey> = state
            .entries
            .keys()
            .filter(|(c, _)| *c == category)
            .cloned()
            .collect();
        for key in &keys {
            state.remove(key);
        }
        keys.len()
    }

    pub fn status(&self) -> CacheStoreStatus {
        let state = self.lock_state();
        let categories = CacheCategory::ALL
            .iter()
            .map(|&category| {
                let (items, bytes) = state
                    .entries
                    .iter()
                    .filter(|((c, _), _)| *c == category)
                    .fold((0, 0), |(n, b), (_, e)| (n + 1, b + e.size));
                CategoryStatus {
                    category,
                    items,
                    bytes,
                }
            })
            .collect();

        CacheStoreStatus {
            categories,
            total_bytes: state.total_bytes,
            max_bytes: self.inner.config.max_bytes,
            path: self.inner.config.path.clone(),
            dirty: state.dirty,
        }
    }

    /// Look-aside read: return the cached value, or run `fetch` and cache
    /// its result.
    ///
    /// Concurrent callers for the same key are serialized: the second waits
    /// for the first and then reads what it stored. A failed fetch caches
    /// nothing. A failed write is logged and the fetched value still
    /// returned.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        category: CacheCategory,
        key: &str,
        fetch: F,
    ) -> Result<Fetched<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let entry_key = (category, key.to_string());
        let lock = {
            let mut locks = self
                .inner
                .key_locks
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(entry_key.clone()).or_default())
        };

        let result = {
            let _guard = lock.lock().await;
            if let Some(data) = self.get::<T>(category, key) {
                tracing::debug!(%category, key, "Cache hit");
                Ok(Fetched {
                    data,
                    source: DataSource::Cache,
                })
            } else {
                tracing::debug!(%category, key, "Cache miss, fetching upstream");
                match fetch().await {
                    Ok(data) => {
                        if let Err(e) = self.put(category, key, &data) {
                            tracing::warn!(%category, key, error = %e, "Failed to cache fetched data");
                        }
                        Ok(Fetched {
                            data,
                            source: DataSource::Upstream,
                        })
                    }
                    Err(e) => Err(e),
                }
            }
        };

        drop(lock);
        let mut locks = self
            .inner
            .key_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&entry_key)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&entry_key);
        }

        result
    }

    /// Write the snapshot if anything changed since the last flush.
    ///
    /// Returns whether a file was written. In-memory stores never write.
    pub async fn flush(&self) -> Result<bool, CacheError> {
        let Some(path) = self.inner.config.path.clone() else {
            return Ok(false);
        };

        let _guard = self.inner.flush_lock.lock().await;
        let (bytes, entries) = {
            let mut state = self.lock_state();
            if !state.dirty {
                return Ok(false);
            }
            let bytes = serde_json::to_vec(&state.snapshot())?;
            state.dirty = false;
            (bytes, state.entries.len())
        };

        if let Err(e) = snapshot::write_atomic(&path, &bytes).await {
            self.lock_state().dirty = true;
            return Err(e);
        }

        tracing::debug!(path = %path.display(), entries, bytes = bytes.len(), "Cache flushed");
        Ok(true)
    }

    /// Flush on a fixed interval until the returned handle is aborted.
    pub fn spawn_flush_task(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = self.inner.config.flush_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.flush().await {
                    tracing::warn!(error = %e, "Periodic cache flush failed");
                }
            }
        })
    }
}
