//! Index Module
//!
//! Durable mapping from cache key to blob digest and expiry.
//!
//! ## Responsibilities
//! - Point lookups by key
//! - Upserts that are on disk before they return
//! - Crash recovery: a torn trailing record is dropped on open and the
//!   affected key reads as a miss
//! - Compaction of superseded records
//!
//! ## Data Structure Choice
//! An append-only record log (`index.db`) replayed into a HashMap on open:
//! - Keys are opaque strings, only point access is needed
//! - Appends are a single write + fsync
//! - The log is compacted on open once dead records dominate

mod entry;
mod log;
mod record;
mod store;

pub use entry::{IndexEntry, VALUE_SEPARATOR};
pub use log::{IndexLog, ReplayResult};
pub use record::{decode_frame, FrameRead, IndexRecord, FRAME_HEADER_SIZE};
pub use store::Index;

/// File name of the index inside a datastore directory
pub const INDEX_FILENAME: &str = "index.db";
