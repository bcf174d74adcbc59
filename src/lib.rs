//! # zealot
//!
//! A persistent, content-addressable, time-expiring key-value cache:
//! - Values stored once per distinct content, named by SHA-512 digest
//! - A durable, crash-safe index from cache key to digest + expiry
//! - Get-or-compute with strict expiry and self-healing reads
//! - Function memoization keyed on name + canonical arguments
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Memoized function / caller                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ get_or_compute(key, expires_at, f)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Datastore                               │
//! │          (expiry policy, write ordering, healing)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Index    │          │  BlobStore  │
//!   │ (index.db)  │─digest──▶│ (gzip, CAS) │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use chrono::Duration;
//! use zealot::Datastore;
//!
//! # fn main() -> zealot::Result<()> {
//! let store = Datastore::open_path(std::path::Path::new("/tmp/zealot"))?;
//! let fetch = store
//!     .cache_for(Duration::minutes(10))?
//!     .wrap("fetch", |url: &str| Ok::<_, std::io::Error>(url.as_bytes().to_vec()));
//!
//! let body = fetch.call("https://example.com")?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;

pub mod blob;
pub mod index;
pub mod datastore;
pub mod memoize;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CallbackError, Result, ZealotError};
pub use config::{Config, IndexSyncStrategy};
pub use clock::{add_ttl, Clock, ManualClock, SystemClock};
pub use datastore::{CacheStats, CacheStatus, Datastore, VerifyReport};
pub use memoize::{derive_key, CallArgs, Expiry, Memoized, Memoizer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of zealot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
