//! Durable per-day eligibility records and the sleep rating log
//!
//! Implementations:
//! - `SqliteSleepStore`: production SQLite backend
//! - `MemorySleepStore`: in-memory backend for testing

mod memory;
mod sqlite;

pub use memory::MemorySleepStore;
pub use sqlite::SqliteSleepStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Day key format used by every backend
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Render a calendar day as its storage key ("YYYY-MM-DD")
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Current local calendar day
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// One authoritative record per calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRecord {
    pub date: NaiveDate,
    pub alarm_fired: bool,
    pub rated: bool,
}

/// Keyed persistent store backing the eligibility gate
///
/// Both `mark_*` operations are field-level upserts: each sets only its own
/// flag and never clears the other one, so a trigger arriving after a rating
/// cannot erase `rated`.
#[async_trait]
pub trait SleepStore: Send + Sync + 'static {
    /// Record for `date`, if any
    async fn get_record(&self, date: NaiveDate) -> Result<Option<EligibilityRecord>>;

    /// Set `alarm_fired`; creates the day with `rated = false` when absent
    async fn mark_alarm_fired(&self, date: NaiveDate) -> Result<()>;

    /// Set `rated`; creates the day with `alarm_fired = true` when absent
    async fn mark_rated(&self, date: NaiveDate) -> Result<()>;

    /// Append a rating and mark its day rated, atomically
    ///
    /// Either both writes land or neither does, so a failed submission can be
    /// retried without logging the rating twice.
    async fn record_rating(&self, recorded_at: DateTime<Local>, rating: u8) -> Result<()>;

    /// Ratings logged on `date`, oldest first
    async fn ratings_on(&self, date: NaiveDate) -> Result<Vec<u8>>;
}
