//! Clock Module
//!
//! Source of "now" for expiry decisions, plus the textual timestamp format
//! used in index values.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, SubsecRound, Utc};
use parking_lot::Mutex;

use crate::error::{Result, ZealotError};

/// Timestamp format stored in index values (UTC, second precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Provides the current time
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Render a timestamp for storage. Sub-second precision is dropped.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// `at + ttl`, or a `Config` error if the result cannot be stored
pub fn add_ttl(at: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    let expires_at = at
        .checked_add_signed(ttl)
        .ok_or_else(|| ZealotError::Config(format!("expiry overflows: {} + {}", at, ttl)))?;
    check_storable(expires_at)?;
    Ok(expires_at)
}

/// Reject timestamps outside the four-digit years `TIMESTAMP_FORMAT` holds
pub fn check_storable(at: DateTime<Utc>) -> Result<()> {
    if (1..=9999).contains(&at.year()) {
        Ok(())
    } else {
        Err(ZealotError::Config(format!("expiry out of range: {}", at)))
    }
}

/// Drop sub-second precision, matching what survives a storage round trip
pub fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}
