//! Persistence layer.
//!
//! `PriceStore` abstracts the remote queryable store of price submissions
//! (filtered, recency-sorted reads plus count/delete-by-age). The SQLite
//! implementation lives in `sqlite`. The cleanup history is small and is
//! kept as a JSON file next to the database.

pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::retention::CleanupHistory;
use crate::types::{PriceError, PriceObservation};

/// Default cleanup history file path.
const DEFAULT_HISTORY_FILE: &str = "pricewatch_cleanup_history.json";

/// Abstraction over the store of price submissions.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Persist one observation and return its generated id.
    async fn insert(&self, observation: &PriceObservation) -> Result<String, PriceError>;

    /// The `limit` most recent observations, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<PriceObservation>, PriceError>;

    /// Total number of stored observations.
    async fn count_all(&self) -> Result<u64, PriceError>;

    /// Observations submitted at or after `since`.
    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, PriceError>;

    /// Observations submitted strictly before `cutoff`.
    async fn count_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PriceError>;

    /// Timestamp of the oldest stored observation, if any.
    async fn oldest_submission(&self) -> Result<Option<DateTime<Utc>>, PriceError>;

    /// Delete every observation submitted strictly before `cutoff`.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PriceError>;

    /// Backend name for logging and the admin dashboard.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cleanup history persistence
// ---------------------------------------------------------------------------

/// Save the cleanup history to a JSON file.
pub fn save_history(history: &CleanupHistory, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_HISTORY_FILE);
    let json = serde_json::to_string_pretty(history)
        .context("Failed to serialise cleanup history")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write cleanup history to {path}"))?;

    debug!(path, entries = history.len(), "Cleanup history saved");
    Ok(())
}

/// Load the cleanup history from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_history(path: Option<&str>) -> Result<Option<CleanupHistory>> {
    let path = path.unwrap_or(DEFAULT_HISTORY_FILE);

    if !Path::new(path).exists() {
        info!(path, "No cleanup history found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read cleanup history from {path}"))?;

    let history: CleanupHistory = serde_json::from_str(&json)
        .context(format!("Failed to parse cleanup history from {path}"))?;

    info!(
        path,
        entries = history.len(),
        capacity = history.capacity(),
        "Cleanup history loaded from disk"
    );

    Ok(Some(history))
}

/// Delete the history file (for testing or reset).
pub fn delete_history(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_HISTORY_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete cleanup history file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
