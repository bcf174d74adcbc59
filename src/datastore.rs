//! Datastore Module
//!
//! The cache itself: composes the blob store and the index and decides
//! when a value is served from disk and when it is recomputed.
//!
//! ## Responsibilities
//! - Open/create the cache directory and its index
//! - Get-or-compute with strict expiry (`now > expires_at` recomputes)
//! - Heal entries whose blob is missing or corrupt by recomputing
//! - Hand out memoization wrappers

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::clock::{add_ttl, Clock, SystemClock};
use crate::config::Config;
use crate::error::{CallbackError, Result, ZealotError};
use crate::index::{Index, IndexEntry, INDEX_FILENAME};
use crate::memoize::{Expiry, Memoizer};

/// How a get-or-compute call was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the cache, compute function not called
    Hit,
    /// No entry for the key
    Miss,
    /// Entry existed but `now > expires_at`
    Expired,
    /// Entry was valid but its blob was missing or corrupt
    Healed,
}

/// Counters since the datastore was opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub healed: u64,
}

impl CacheStats {
    /// Total get-or-compute calls that reached a decision
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.expired + self.healed
    }
}

/// Result of checking every index entry against the blob store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Entries examined
    pub entries: usize,
    /// Entries whose blob reads back intact
    pub healthy: usize,
    /// Keys past their expiry (blob not checked)
    pub expired: Vec<String>,
    /// Keys whose blob file is gone
    pub missing: Vec<String>,
    /// Keys whose blob fails to decompress or verify
    pub corrupt: Vec<String>,
}

impl VerifyReport {
    /// No missing or corrupt blobs
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    healed: AtomicU64,
}

impl Counters {
    fn record(&self, status: CacheStatus) {
        let counter = match status {
            CacheStatus::Hit => &self.hits,
            CacheStatus::Miss => &self.misses,
            CacheStatus::Expired => &self.expired,
            CacheStatus::Healed => &self.healed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            healed: self.healed.load(Ordering::Relaxed),
        }
    }
}

/// A persistent, content-addressed, expiring cache rooted at one directory
///
/// ## Concurrency Model
///
/// - **Lookups**: concurrent; the index table sits behind an RwLock
/// - **Stores** (blob write + index upsert): serialized by `write_lock`, and
///   always in that order, so the index never names a blob that is not
///   on disk
/// - **Compute functions** run without any lock held. Two threads missing
///   the same key may both compute; the last store wins.
///
/// Two processes must not open the same directory at once.
pub struct Datastore {
    /// Datastore configuration
    config: Config,

    /// Content-addressed payloads
    blobs: BlobStore,

    /// Key → (digest, expiry)
    index: Index,

    /// Source of "now" for expiry checks
    clock: Arc<dyn Clock>,

    /// Serializes blob write + index upsert pairs
    write_lock: Mutex<()>,

    counters: Counters,
}

impl Datastore {
    /// Open or create a datastore with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Open the blob store in the same directory
    /// 3. Open/replay `index.db`
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Open with a custom clock (used by tests to pin "now")
    pub fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Blobs live directly in the data directory
        let blobs = BlobStore::open(&config.data_dir, config.compression_level, config.verify_blobs)?;

        // Step 3: Open the index (replays and repairs the log)
        let index = Index::open(
            &config.data_dir.join(INDEX_FILENAME),
            config.index_sync,
            config.compact_min_records,
        )?;

        let replay = index.replay_result();
        if replay.was_truncated {
            warn!(
                bytes = replay.bytes_truncated,
                last_lsn = replay.last_lsn,
                "index recovered from damaged tail"
            );
        }
        info!(
            dir = %config.data_dir.display(),
            entries = index.len(),
            "datastore opened"
        );

        Ok(Self {
            config,
            blobs,
            index,
            clock,
            write_lock: Mutex::new(()),
            counters: Counters::default(),
        })
    }

    /// Return the cached value for `key`, or compute, store and return it
    ///
    /// The entry is valid while `now <= expires_at` of the stored entry. On
    /// a miss, an expired entry, or an unreadable blob, `compute` is called
    /// and its result stored with the given absolute `expires_at`.
    ///
    /// Errors from `compute` come back as `ZealotError::Callback` and leave
    /// the cache untouched.
    pub fn get_or_compute<F, E>(&self, key: &str, expires_at: DateTime<Utc>, compute: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> std::result::Result<Vec<u8>, E>,
        E: Into<CallbackError>,
    {
        self.get_or_compute_with_status(key, expires_at, compute)
            .map(|(value, _)| value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), also reporting how the
    /// call was answered
    pub fn get_or_compute_with_status<F, E>(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
        compute: F,
    ) -> Result<(Vec<u8>, CacheStatus)>
    where
        F: FnOnce() -> std::result::Result<Vec<u8>, E>,
        E: Into<CallbackError>,
    {
        let now = self.clock.now();

        let status = match self.index.lookup(key) {
            None => CacheStatus::Miss,
            Some(entry) if entry.is_expired(now) => CacheStatus::Expired,
            Some(entry) => match self.blobs.get(&entry.digest) {
                Ok(value) => {
                    debug!(key = %key, "cache hit");
                    self.counters.record(CacheStatus::Hit);
                    return Ok((value, CacheStatus::Hit));
                }
                Err(e) if e.is_recoverable_blob_error() => {
                    warn!(key = %key, error = %e, "cached blob unreadable, recomputing");
                    CacheStatus::Healed
                }
                Err(e) => return Err(e),
            },
        };

        debug!(key = %key, status = ?status, "computing value");
        let value = compute().map_err(|e| ZealotError::Callback(e.into()))?;

        self.store(key, &value, expires_at)?;
        self.counters.record(status);
        Ok((value, status))
    }

    /// The unexpired cached value for `key`, without computing anything
    ///
    /// A missing or corrupt blob reads as `None`.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.lookup(key) {
            Some(entry) if !entry.is_expired(self.clock.now()) => entry,
            _ => return Ok(None),
        };

        match self.blobs.get(&entry.digest) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_recoverable_blob_error() => {
                warn!(key = %key, error = %e, "cached blob unreadable");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Store `value` under `key` until `expires_at`, returning the blob digest
    pub fn put(&self, key: &str, value: &[u8], expires_at: DateTime<Utc>) -> Result<String> {
        self.store(key, value, expires_at).map(|entry| entry.digest)
    }

    /// Drop the entry for `key`. The blob stays on disk.
    pub fn invalidate(&self, key: &str) -> Result<bool> {
        let _write_guard = self.write_lock.lock();
        self.index.remove(key)
    }

    /// Index entry for `key`, expired or not
    pub fn lookup(&self, key: &str) -> Option<IndexEntry> {
        self.index.lookup(key)
    }

    /// A memoization wrapper whose every call expires at `expires_at`
    ///
    /// The timestamp is fixed here, once, for all calls made through the
    /// wrapper: a call made after `expires_at` always recomputes, no matter
    /// how recently the previous call stored its value. For a rolling TTL
    /// use [`cache_with`](Self::cache_with) and `Expiry::AfterEachCall`.
    pub fn cache(&self, expires_at: DateTime<Utc>) -> Memoizer<'_> {
        self.cache_with(Expiry::At(expires_at))
    }

    /// A memoization wrapper expiring `ttl` from now
    ///
    /// Same static semantics as [`cache`](Self::cache): the expiry is
    /// computed once, when this is called. Fails with `Config` if `now + ttl`
    /// is not a storable timestamp.
    pub fn cache_for(&self, ttl: Duration) -> Result<Memoizer<'_>> {
        Ok(self.cache(add_ttl(self.now(), ttl)?))
    }

    /// A memoization wrapper with an explicit expiry policy
    pub fn cache_with(&self, expiry: Expiry) -> Memoizer<'_> {
        Memoizer::new(self, expiry)
    }

    /// Check every index entry against the blob store
    pub fn verify(&self) -> Result<VerifyReport> {
        let now = self.clock.now();
        let mut report = VerifyReport::default();

        for entry in self.index.entries() {
            report.entries += 1;
            if entry.is_expired(now) {
                report.expired.push(entry.key);
                continue;
            }
            match self.blobs.get(&entry.digest) {
                Ok(_) => report.healthy += 1,
                Err(ZealotError::BlobNotFound { .. }) => report.missing.push(entry.key),
                Err(ZealotError::CorruptBlob { .. }) => report.corrupt.push(entry.key),
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Rewrite the index log without superseded records
    pub fn compact(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.index.compact()
    }

    /// Close the datastore, syncing the index to disk
    pub fn close(self) -> Result<()> {
        self.index.sync()?;
        info!(dir = %self.config.data_dir.display(), "datastore closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Current time according to the datastore's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// All index entries, sorted by key
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.index.entries()
    }

    /// Number of index entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Hit/miss counters since open
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the blob store
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Get the index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Blob first, then index: a crash in between leaves an unreferenced
    /// blob, never an index entry without its blob.
    fn store(&self, key: &str, value: &[u8], expires_at: DateTime<Utc>) -> Result<IndexEntry> {
        let _write_guard = self.write_lock.lock();
        let digest = self.blobs.put(value)?;
        self.index.upsert(key, &digest, expires_at)
    }
}
