//! Once-per-day sleep rating eligibility

use crate::error::Result;
use crate::store::{self, SleepStore};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Yes/no "can rate sleep today" backed by a [`SleepStore`]
#[derive(Clone)]
pub struct EligibilityGate {
    store: Arc<dyn SleepStore>,
}

impl EligibilityGate {
    pub fn new(store: Arc<dyn SleepStore>) -> Self {
        Self { store }
    }

    /// Eligible unless today's record exists with `rated = true`
    pub async fn can_rate_today(&self) -> Result<bool> {
        self.can_rate_on(store::today()).await
    }

    pub async fn can_rate_on(&self, date: NaiveDate) -> Result<bool> {
        let can_rate = match self.store.get_record(date).await? {
            Some(record) => !record.rated,
            None => true,
        };
        debug!("Can rate {}: {}", store::day_key(date), can_rate);
        Ok(can_rate)
    }

    /// Idempotent: any number of calls on one day has the effect of one
    pub async fn record_rating_submitted(&self) -> Result<()> {
        self.record_rating_submitted_on(store::today()).await
    }

    pub async fn record_rating_submitted_on(&self, date: NaiveDate) -> Result<()> {
        self.store.mark_rated(date).await
    }
}
