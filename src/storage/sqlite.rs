//! SQLite-backed `PriceStore` using `sqlx`.
//!
//! Prices are stored as decimal TEXT so no precision is lost, and
//! timestamps as fixed-width RFC 3339 UTC strings (microseconds), which
//! sort lexically in chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::PriceStore;
use crate::types::{PriceError, PriceObservation};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and make sure the schema exists.
    ///
    /// `db_url` is an sqlx SQLite URL, e.g. `"sqlite:pricewatch.db?mode=rwc"`.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, PriceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(db_url)
            .await
            .map_err(|e| PriceError::Storage(format!("SQLite connection error: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url = db_url, "SQLite store ready");
        Ok(store)
    }

    /// A private in-memory database. Pinned to one connection, since every
    /// `:memory:` connection is a separate database.
    pub async fn in_memory() -> Result<Self, PriceError> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub async fn migrate(&self) -> Result<(), PriceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_submissions (
                id TEXT PRIMARY KEY NOT NULL,
                barcode TEXT NOT NULL,
                product_name TEXT NOT NULL,
                price TEXT NOT NULL,
                currency TEXT NOT NULL,
                store_name TEXT,
                location TEXT,
                submitted_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_price_submissions_submitted_at \
             ON price_submissions (submitted_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, PriceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| PriceError::Storage(format!("bad submitted_at '{raw}': {e}")))
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<PriceObservation, PriceError> {
    let price: String = row.try_get("price")?;
    let submitted_at: String = row.try_get("submitted_at")?;

    Ok(PriceObservation {
        barcode: row.try_get("barcode")?,
        product_name: row.try_get("product_name")?,
        price: Decimal::from_str(&price)
            .map_err(|e| PriceError::Storage(format!("bad price '{price}': {e}")))?,
        currency: row.try_get("currency")?,
        store_name: row.try_get("store_name")?,
        location: row.try_get("location")?,
        submitted_at: decode_ts(&submitted_at)?,
    })
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[async_trait]
impl PriceStore for SqliteStore {
    async fn insert(&self, observation: &PriceObservation) -> Result<String, PriceError> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO price_submissions
                (id, barcode, product_name, price, currency, store_name, location, submitted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&observation.barcode)
        .bind(&observation.product_name)
        .bind(observation.price.to_string())
        .bind(&observation.currency)
        .bind(&observation.store_name)
        .bind(&observation.location)
        .bind(encode_ts(observation.submitted_at))
        .execute(&self.pool)
        .await?;

        debug!(id = %id, barcode = %observation.barcode, price = %observation.price, "Submission stored");
        Ok(id)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PriceObservation>, PriceError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r#"
            SELECT barcode, product_name, price, currency, store_name, location, submitted_at
            FROM price_submissions
            ORDER BY submitted_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // Undecodable rows are logged and skipped.
        Ok(rows
            .iter()
            .filter_map(|row| match decode_row(row) {
                Ok(obs) => Some(obs),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable price row");
                    None
                }
            })
            .collect())
    }

    async fn count_all(&self) -> Result<u64, PriceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_submissions")
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(n))
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, PriceError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM price_submissions WHERE submitted_at >= ?",
        )
        .bind(encode_ts(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(to_count(n))
    }

    async fn count_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PriceError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM price_submissions WHERE submitted_at < ?",
        )
        .bind(encode_ts(cutoff))
        .fetch_one(&self.pool)
        .await?;
        Ok(to_count(n))
    }

    async fn oldest_submission(&self) -> Result<Option<DateTime<Utc>>, PriceError> {
        let oldest: Option<String> =
            sqlx::query_scalar("SELECT MIN(submitted_at) FROM price_submissions")
                .fetch_one(&self.pool)
                .await?;
        oldest.as_deref().map(decode_ts).transpose()
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PriceError> {
        let result = sqlx::query("DELETE FROM price_submissions WHERE submitted_at < ?")
            .bind(encode_ts(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn name(&self) -> &str {
        "SQLite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
