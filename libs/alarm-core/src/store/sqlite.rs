//! SQLite persistence for eligibility records and ratings

use super::{day_key, EligibilityRecord, SleepStore, DAY_KEY_FORMAT};
use crate::error::{AlarmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const MARK_RATED_SQL: &str = r#"
    INSERT INTO sleep_eligibility (date, alarm_fired, rated)
    VALUES (?, 1, 1)
    ON CONFLICT(date) DO UPDATE SET
        rated = 1,
        updated_at = CURRENT_TIMESTAMP
"#;

const APPEND_RATING_SQL: &str = r#"
    INSERT INTO sleep_ratings (date, rating, recorded_at)
    VALUES (?, ?, ?)
"#;

/// SQLite-backed [`SleepStore`]
///
/// `date` is the primary key, so concurrent upserts for the same day collapse
/// into one row instead of racing an "insert if absent".
#[derive(Clone)]
pub struct SqliteSleepStore {
    pool: SqlitePool,
}

impl SqliteSleepStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AlarmError::Database(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path))?
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!("SQLite: {}", path);

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sleep_eligibility (
                date TEXT PRIMARY KEY,
                alarm_fired INTEGER NOT NULL DEFAULT 0,
                rated INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sleep_ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                rating INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("SQLite schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SleepStore for SqliteSleepStore {
    async fn get_record(&self, date: NaiveDate) -> Result<Option<EligibilityRecord>> {
        let row = sqlx::query(
            r#"
            SELECT date, alarm_fired, rated
            FROM sleep_eligibility
            WHERE date = ?
            "#,
        )
        .bind(day_key(date))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_date: String = row.try_get("date")?;
        let date = NaiveDate::parse_from_str(&raw_date, DAY_KEY_FORMAT)
            .map_err(|e| AlarmError::Database(format!("Bad date key '{}': {}", raw_date, e)))?;

        Ok(Some(EligibilityRecord {
            date,
            alarm_fired: row.try_get("alarm_fired")?,
            rated: row.try_get("rated")?,
        }))
    }

    async fn mark_alarm_fired(&self, date: NaiveDate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sleep_eligibility (date, alarm_fired, rated)
            VALUES (?, 1, 0)
            ON CONFLICT(date) DO UPDATE SET
                alarm_fired = 1,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(day_key(date))
        .execute(&self.pool)
        .await?;

        debug!("Eligibility {}: alarm fired", day_key(date));
        Ok(())
    }

    async fn mark_rated(&self, date: NaiveDate) -> Result<()> {
        sqlx::query(MARK_RATED_SQL)
            .bind(day_key(date))
            .execute(&self.pool)
            .await?;

        debug!("Eligibility {}: rated", day_key(date));
        Ok(())
    }

    async fn record_rating(&self, recorded_at: DateTime<Local>, rating: u8) -> Result<()> {
        let date = day_key(recorded_at.date_naive());
        let mut tx = self.pool.begin().await?;

        sqlx::query(APPEND_RATING_SQL)
            .bind(&date)
            .bind(i64::from(rating))
            .bind(recorded_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        sqlx::query(MARK_RATED_SQL)
            .bind(&date)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Eligibility {}: rated {}", date, rating);
        Ok(())
    }

    async fn ratings_on(&self, date: NaiveDate) -> Result<Vec<u8>> {
        let rows = sqlx::query(
            r#"
            SELECT rating
            FROM sleep_ratings
            WHERE date = ?
            ORDER BY id ASC
            "#,
        )
        .bind(day_key(date))
        .fetch_all(&self.pool)
        .await?;

        let mut ratings = Vec::with_capacity(rows.len());
        for row in rows {
            let rating: i64 = row.try_get("rating")?;
            let rating = u8::try_from(rating).map_err(|_| {
                AlarmError::Database(format!("Stored rating out of range: {}", rating))
            })?;
            ratings.push(rating);
        }
        Ok(ratings)
    }
}
