//! Blob Store
//!
//! Reads and writes gzip blobs named by content digest.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, trace, warn};

use crate::error::{Result, ZealotError};

use super::{check_digest, digest, is_valid_digest};

/// Content-addressable blob storage rooted at a directory
///
/// Blobs are immutable. Writing a value that is already stored is a no-op,
/// so two keys with equal values share one file.
#[derive(Debug, Clone)]
pub struct BlobStore {
    /// Directory holding the blob files
    dir: PathBuf,
    /// Gzip level for new blobs
    compression: Compression,
    /// Recompute and compare digests on read
    verify: bool,
}

impl BlobStore {
    /// Open a blob store in `dir`, creating the directory if needed
    pub fn open(dir: &Path, compression_level: u32, verify: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            compression: Compression::new(compression_level),
            verify,
        })
    }

    /// Store `bytes` and return their digest
    ///
    /// The payload goes to a temp file which is fsynced and then renamed over
    /// the final name, so readers never observe a partial blob.
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let digest = digest(bytes);
        let path = self.path_unchecked(&digest);

        if path.exists() {
            match self.read_verified(&digest, &path) {
                Ok(_) => {
                    trace!(digest = %short(&digest), "blob already stored");
                    return Ok(digest);
                }
                Err(e) if e.is_recoverable_blob_error() => {
                    warn!(digest = %short(&digest), error = %e, "rewriting damaged blob");
                }
                Err(e) => return Err(e),
            }
        }

        let tmp = self.tmp_path(&digest);
        {
            let file = File::create(&tmp)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), self.compression);
            encoder.write_all(bytes)?;
            let writer = encoder.finish()?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &path)?;
        fsync_dir(&self.dir);

        debug!(digest = %short(&digest), len = bytes.len(), "blob stored");
        Ok(digest)
    }

    /// Read the blob named `digest`
    ///
    /// Returns `BlobNotFound` if no such file exists and `CorruptBlob` if it
    /// does not decompress or (with verification on) hashes to something else.
    pub fn get(&self, digest: &str) -> Result<Vec<u8>> {
        check_digest(digest)?;
        let path = self.path_unchecked(digest);
        self.read_verified(digest, &path)
    }

    /// Whether a blob file exists for `digest`
    pub fn contains(&self, digest: &str) -> bool {
        is_valid_digest(digest) && self.path_unchecked(digest).is_file()
    }

    /// Path of the blob file for `digest`
    pub fn path(&self, digest: &str) -> Result<PathBuf> {
        check_digest(digest)?;
        Ok(self.path_unchecked(digest))
    }

    /// Digests of all stored blobs, sorted
    pub fn digests(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_digest(name) {
                    found.push(name.to_string());
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Directory holding the blobs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn read_verified(&self, digest: &str, path: &Path) -> Result<Vec<u8>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ZealotError::BlobNotFound {
                    digest: digest.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut value = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut value)
            .map_err(|e| ZealotError::CorruptBlob {
                digest: digest.to_string(),
                reason: format!("decompression failed: {}", e),
            })?;

        if self.verify {
            let actual = super::digest(&value);
            if actual != digest {
                return Err(ZealotError::CorruptBlob {
                    digest: digest.to_string(),
                    reason: format!("content hashes to {}", short(&actual)),
                });
            }
        }

        Ok(value)
    }

    fn path_unchecked(&self, digest: &str) -> PathBuf {
        self.dir.join(digest)
    }

    fn tmp_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!(".{}.tmp", digest))
    }
}

/// First 12 hex chars, enough to tell blobs apart in logs
fn short(digest: &str) -> &str {
    &digest[..digest.len().min(12)]
}

/// Persist the rename itself. Best effort: not every platform can open a
/// directory for syncing.
#[cfg(unix)]
pub(crate) fn fsync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
pub(crate) fn fsync_dir(_dir: &Path) {}
