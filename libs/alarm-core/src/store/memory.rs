//! In-memory [`SleepStore`]
//!
//! Perfect for testing; can be switched to "unavailable" to exercise
//! persistence failure paths.

use super::{day_key, EligibilityRecord, SleepStore};
use crate::error::{AlarmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemorySleepStore {
    records: Mutex<HashMap<NaiveDate, EligibilityRecord>>,
    ratings: Mutex<Vec<(NaiveDate, u8)>>,
    unavailable: AtomicBool,
}

impl MemorySleepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored day records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AlarmError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn upsert(&self, date: NaiveDate, apply: impl FnOnce(&mut EligibilityRecord), fresh: EligibilityRecord) {
        let mut records = self.records.lock();
        match records.get_mut(&date) {
            Some(record) => apply(record),
            None => {
                records.insert(date, fresh);
            },
        }
    }
}

#[async_trait]
impl SleepStore for MemorySleepStore {
    async fn get_record(&self, date: NaiveDate) -> Result<Option<EligibilityRecord>> {
        self.check()?;
        Ok(self.records.lock().get(&date).copied())
    }

    async fn mark_alarm_fired(&self, date: NaiveDate) -> Result<()> {
        self.check()?;
        self.upsert(
            date,
            |record| record.alarm_fired = true,
            EligibilityRecord {
                date,
                alarm_fired: true,
                rated: false,
            },
        );
        tracing::debug!("Eligibility {}: alarm fired", day_key(date));
        Ok(())
    }

    async fn mark_rated(&self, date: NaiveDate) -> Result<()> {
        self.check()?;
        self.upsert(
            date,
            |record| record.rated = true,
            EligibilityRecord {
                date,
                alarm_fired: true,
                rated: true,
            },
        );
        Ok(())
    }

    async fn record_rating(&self, recorded_at: DateTime<Local>, rating: u8) -> Result<()> {
        self.check()?;
        let date = recorded_at.date_naive();
        let mut ratings = self.ratings.lock();
        ratings.push((date, rating));
        self.upsert(
            date,
            |record| record.rated = true,
            EligibilityRecord {
                date,
                alarm_fired: true,
                rated: true,
            },
        );
        Ok(())
    }

    async fn ratings_on(&self, date: NaiveDate) -> Result<Vec<u8>> {
        self.check()?;
        Ok(self
            .ratings
            .lock()
            .iter()
            .filter(|(day, _)| *day == date)
            .map(|(_, rating)| *rating)
            .collect())
    }
}
