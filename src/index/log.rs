//! Index Log
//!
//! Append-only file of index records with replay and tail repair.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header: Magic "ZIDX" (4) | Version (2)  │
//! ├─────────────────────────────────────────┤
//! │ Record 1  [LSN][CRC][Len][Data]         │
//! │ Record 2  [LSN][CRC][Len][Data]         │
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::blob::fsync_dir;
use crate::config::IndexSyncStrategy;
use crate::error::{Result, ZealotError};

use super::record::{decode_frame, FrameRead, IndexRecord};

/// Magic bytes identifying a zealot index file
pub(crate) const MAGIC: &[u8; 4] = b"ZIDX";

/// Current index format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2)
pub(crate) const HEADER_SIZE: u64 = 6;

/// Outcome of replaying an index log on open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayResult {
    /// Number of records successfully replayed
    pub records_replayed: u64,

    /// Number of bytes cut from the tail (torn or corrupt records)
    pub bytes_truncated: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the file was truncated to drop a damaged tail
    pub was_truncated: bool,
}

/// Appends records to the index file
pub struct IndexLog {
    /// Path of the log file
    path: PathBuf,
    /// Open handle
    file: File,
    /// Length of the valid prefix; appends always start here
    end: u64,
    /// LSN for the next appended record
    next_lsn: u64,
    /// Whether appends fsync
    sync_strategy: IndexSyncStrategy,
    /// Records currently in the file
    record_count: usize,
}

impl IndexLog {
    /// Open or create the log at `path` and replay it
    ///
    /// Replay stops at the first incomplete or corrupt record; everything
    /// after it is cut off so later appends land on a clean boundary.
    pub fn open(
        path: &Path,
        sync_strategy: IndexSyncStrategy,
    ) -> Result<(Self, Vec<IndexRecord>, ReplayResult)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut result = ReplayResult::default();
        let mut records = Vec::new();

        if (buf.len() as u64) < HEADER_SIZE {
            // New file, or a crash before the header hit the disk
            if !buf.is_empty() {
                warn!(path = %path.display(), "index header incomplete, reinitializing");
                result.was_truncated = true;
                result.bytes_truncated = buf.len() as u64;
            }
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header_bytes())?;
            file.sync_all()?;
        } else {
            check_header(&buf)?;

            let mut pos = HEADER_SIZE as usize;
            while pos < buf.len() {
                match decode_frame(&buf[pos..]) {
                    FrameRead::Record { lsn, record, len } => {
                        result.records_replayed += 1;
                        result.last_lsn = lsn;
                        records.push(record);
                        pos += len;
                    }
                    FrameRead::Incomplete | FrameRead::Corrupt => break,
                }
            }

            if pos < buf.len() {
                result.was_truncated = true;
                result.bytes_truncated = (buf.len() - pos) as u64;
                warn!(
                    path = %path.display(),
                    bytes = result.bytes_truncated,
                    "dropping damaged index tail"
                );
                file.set_len(pos as u64)?;
                file.sync_all()?;
            }
        }

        let end = file.seek(SeekFrom::End(0))?;

        debug!(
            path = %path.display(),
            records = result.records_replayed,
            last_lsn = result.last_lsn,
            "index log opened"
        );

        let log = Self {
            path: path.to_path_buf(),
            file,
            end,
            next_lsn: result.last_lsn + 1,
            sync_strategy,
            record_count: records.len(),
        };

        Ok((log, records, result))
    }

    /// Append a record, returning its LSN
    ///
    /// With `IndexSyncStrategy::EveryWrite` the record is on disk when this
    /// returns. A failed append leaves nothing behind: the file is cut back to
    /// the last good record, and the next append overwrites whatever a
    /// partial write left there.
    pub fn append(&mut self, record: &IndexRecord) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = record.encode(lsn)?;

        if let Err(e) = self.write_frame(&frame) {
            if let Err(trunc) = self.file.set_len(self.end) {
                warn!(path = %self.path.display(), error = %trunc, "could not drop partial index record");
            }
            return Err(e);
        }

        self.end += frame.len() as u64;
        self.next_lsn += 1;
        self.record_count += 1;
        Ok(lsn)
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(frame)?;
        if self.sync_strategy == IndexSyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Replace the log with `records`, numbered from LSN 1
    ///
    /// The new log is written beside the old one and renamed over it, so a
    /// crash leaves either the old or the new file intact.
    pub fn rewrite(&mut self, records: &[IndexRecord]) -> Result<()> {
        let tmp_path = self.path.with_extension("db.compact");

        {
            let mut tmp = File::create(&tmp_path)?;
            let mut buf = header_bytes().to_vec();
            for (i, record) in records.iter().enumerate() {
                buf.extend_from_slice(&record.encode(i as u64 + 1)?);
            }
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            fsync_dir(dir);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        self.end = file.seek(SeekFrom::End(0))?;
        self.file = file;
        self.next_lsn = records.len() as u64 + 1;
        self.record_count = records.len();

        debug!(path = %self.path.display(), records = records.len(), "index log rewritten");
        Ok(())
    }

    /// Number of records in the file
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// LSN the next append will get
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn header_bytes() -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..4].copy_from_slice(MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_le_bytes());
    header
}

fn check_header(buf: &[u8]) -> Result<()> {
    if &buf[0..4] != MAGIC {
        return Err(ZealotError::IndexCorruption(format!(
            "invalid index magic: expected ZIDX, got {:?}",
            &buf[0..4]
        )));
    }

    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != VERSION {
        return Err(ZealotError::IndexCorruption(format!(
            "unsupported index version: {}",
            version
        )));
    }

    Ok(())
}
