//! Sleep quality submissions

use crate::error::{AlarmError, Result};
use crate::gate::EligibilityGate;
use crate::store::SleepStore;
use chrono::Local;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::info;

/// Accepted rating scale
pub const RATING_RANGE: RangeInclusive<u8> = 1..=10;

#[derive(Clone)]
pub struct SleepRatingService {
    store: Arc<dyn SleepStore>,
    gate: EligibilityGate,
}

impl SleepRatingService {
    pub fn new(store: Arc<dyn SleepStore>) -> Self {
        let gate = EligibilityGate::new(store.clone());
        Self { store, gate }
    }

    pub fn gate(&self) -> &EligibilityGate {
        &self.gate
    }

    /// Log the rating and close today's gate in one write
    ///
    /// Submission itself is not gated; callers check
    /// [`EligibilityGate::can_rate_today`] first.
    pub async fn submit(&self, rating: i64) -> Result<u8> {
        let rating = u8::try_from(rating)
            .ok()
            .filter(|r| RATING_RANGE.contains(r))
            .ok_or_else(|| AlarmError::InvalidParameter {
                param: "rating".to_string(),
                reason: format!(
                    "must be between {} and {}, got {}",
                    RATING_RANGE.start(),
                    RATING_RANGE.end(),
                    rating
                ),
            })?;

        self.store.record_rating(Local::now(), rating).await?;
        info!("Sleep rating recorded: {}", rating);
        Ok(rating)
    }
}
