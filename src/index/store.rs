//! Index implementation
//!
//! In-memory hash table over the durable index log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::blob::check_digest;
use crate::clock::check_storable;
use crate::config::IndexSyncStrategy;
use crate::error::Result;

use super::log::{IndexLog, ReplayResult};
use super::{IndexEntry, IndexRecord};

/// Durable key → (digest, expiry) mapping
///
/// ## Concurrency:
/// - `entries`: RwLock (many concurrent lookups, exclusive writer)
/// - `log`: Mutex, held across append + map update so the map never gets
///   ahead of the file
pub struct Index {
    /// Append-only record file
    log: Mutex<IndexLog>,

    /// Live entries by key
    entries: RwLock<HashMap<String, IndexEntry>>,

    /// What replay found on open
    replay: ReplayResult,
}

impl Index {
    /// Open or create the index file at `path`
    ///
    /// On startup:
    /// 1. Replay the log into memory (cutting off a damaged tail)
    /// 2. Compact if superseded records outnumber live ones
    pub fn open(
        path: &Path,
        sync_strategy: IndexSyncStrategy,
        compact_min_records: usize,
    ) -> Result<Self> {
        let (log, records, replay) = IndexLog::open(path, sync_strategy)?;

        let mut entries = HashMap::new();
        for record in records {
            match record {
                IndexRecord::Upsert { key, value } => match IndexEntry::decode_value(&key, &value) {
                    Ok(entry) => {
                        entries.insert(key, entry);
                    }
                    Err(e) => {
                        // An unreadable value must not shadow the key as valid
                        warn!(key = %key, error = %e, "skipping undecodable index record");
                        entries.remove(&key);
                    }
                },
                IndexRecord::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }

        let index = Self {
            log: Mutex::new(log),
            entries: RwLock::new(entries),
            replay,
        };

        let (records, live) = (index.record_count(), index.len());
        if records >= compact_min_records && records - live > live {
            info!(records, live, "compacting index on open");
            index.compact()?;
        }

        Ok(index)
    }

    /// Point lookup by exact key
    pub fn lookup(&self, key: &str) -> Option<IndexEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Write or overwrite the entry for `key`
    ///
    /// The blob named by `digest` must already be stored. The record is
    /// appended to the log before the in-memory table changes.
    pub fn upsert(&self, key: &str, digest: &str, expires_at: DateTime<Utc>) -> Result<IndexEntry> {
        check_digest(digest)?;
        check_storable(expires_at)?;
        let entry = IndexEntry::new(key, digest, expires_at);

        let mut log = self.log.lock();
        log.append(&IndexRecord::Upsert {
            key: key.to_string(),
            value: entry.encode_value(),
        })?;
        self.entries.write().insert(key.to_string(), entry.clone());

        debug!(key = %key, expires_at = %entry.expires_at, "index upsert");
        Ok(entry)
    }

    /// Forget `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut log = self.log.lock();
        if !self.entries.read().contains_key(key) {
            return Ok(false);
        }

        log.append(&IndexRecord::Remove {
            key: key.to_string(),
        })?;
        self.entries.write().remove(key);

        debug!(key = %key, "index remove");
        Ok(true)
    }

    /// All live entries, sorted by key
    pub fn entries(&self) -> Vec<IndexEntry> {
        let mut all: Vec<IndexEntry> = self.entries.read().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrite the log so it holds exactly one record per live entry
    pub fn compact(&self) -> Result<()> {
        let mut log = self.log.lock();
        let records: Vec<IndexRecord> = {
            let entries = self.entries.read();
            let mut live: Vec<&IndexEntry> = entries.values().collect();
            live.sort_by(|a, b| a.key.cmp(&b.key));
            live.into_iter()
                .map(|entry| IndexRecord::Upsert {
                    key: entry.key.clone(),
                    value: entry.encode_value(),
                })
                .collect()
        };
        log.rewrite(&records)
    }

    /// Force the log to disk
    pub fn sync(&self) -> Result<()> {
        self.log.lock().sync()
    }

    /// Records in the log file, including superseded ones
    pub fn record_count(&self) -> usize {
        self.log.lock().record_count()
    }

    /// What replay found when the index was opened
    pub fn replay_result(&self) -> &ReplayResult {
        &self.replay
    }

    /// Path of the index file
    pub fn path(&self) -> PathBuf {
        self.log.lock().path().to_path_buf()
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.log.get_mut().sync() {
            warn!(error = %e, "index sync on drop failed");
        }
    }
}
