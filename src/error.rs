//! Error types for zealot
//!
//! Provides a unified error type for all cache operations.

use thiserror::Error;

/// Result type alias using ZealotError
pub type Result<T> = std::result::Result<T, ZealotError>;

/// Boxed error produced by a caller-supplied compute function
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for zealot operations
#[derive(Debug, Error)]
pub enum ZealotError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Blob Errors
    // -------------------------------------------------------------------------
    #[error("Blob not found: {digest}")]
    BlobNotFound { digest: String },

    #[error("Corrupt blob {digest}: {reason}")]
    CorruptBlob { digest: String, reason: String },

    #[error("Invalid digest: {0:?}")]
    InvalidDigest(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index corruption detected: {0}")]
    IndexCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Compute Errors
    // -------------------------------------------------------------------------
    /// The compute function failed. The original error is kept as the source.
    #[error("Compute callback failed: {0}")]
    Callback(#[source] CallbackError),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ZealotError {
    /// True for blob read failures that get-or-compute heals by recomputing
    pub fn is_recoverable_blob_error(&self) -> bool {
        matches!(
            self,
            ZealotError::BlobNotFound { .. } | ZealotError::CorruptBlob { .. }
        )
    }
}

impl From<bincode::Error> for ZealotError {
    fn from(err: bincode::Error) -> Self {
        ZealotError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ZealotError {
    fn from(err: serde_json::Error) -> Self {
        ZealotError::Serialization(err.to_string())
    }
}
