//! Retention — age-based cleanup of submissions, storage statistics, and
//! the bounded history of cleanup runs.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::storage::PriceStore;
use crate::types::{CleanupKind, CleanupRecord, CleanupStats, PriceError, StorageStats};

pub const DEFAULT_RETENTION_DAYS: u32 = 180;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Rough per-row footprint used for the size estimate.
const ESTIMATED_BYTES_PER_ROW: f64 = 200.0;

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// `now - days`, or a validation error when that falls outside the
/// representable date range.
pub fn cutoff(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, PriceError> {
    Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            PriceError::Validation(format!("retention of {days} days is out of range"))
        })
}

/// Delete every submission older than `retention_days` relative to `now`.
pub async fn cleanup_old_submissions(
    store: &dyn PriceStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<CleanupStats, PriceError> {
    if retention_days == 0 {
        return Err(PriceError::Validation(
            "retention_days must be at least 1".into(),
        ));
    }

    let cutoff = cutoff(now, retention_days)?;
    let deleted_count = store.delete_before(cutoff).await.map_err(|e| {
        warn!(error = %e, retention_days, "Cleanup failed");
        e
    })?;

    info!(
        deleted = deleted_count,
        retention_days,
        cutoff = %cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
        "Retention cleanup complete"
    );

    Ok(CleanupStats {
        deleted_count,
        cleanup_date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        retention_days,
    })
}

/// Size and age breakdown of the store.
///
/// `next_cleanup_eligible` follows the configured retention window; the
/// fixed 30/90/180-day buckets are always reported.
pub async fn storage_stats(
    store: &dyn PriceStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<StorageStats, PriceError> {
    let (d30, d90, d180) = (cutoff(now, 30)?, cutoff(now, 90)?, cutoff(now, 180)?);
    let retention_cutoff = cutoff(now, retention_days)?;

    let (total, last_30, last_90, last_180, older_180, eligible, oldest) = futures::try_join!(
        store.count_all(),
        store.count_since(d30),
        store.count_since(d90),
        store.count_since(d180),
        store.count_before(d180),
        store.count_before(retention_cutoff),
        store.oldest_submission(),
    )?;

    let estimated_mb = (total as f64 * ESTIMATED_BYTES_PER_ROW) / (1024.0 * 1024.0);

    Ok(StorageStats {
        total_submissions: total,
        last_30_days: last_30,
        last_90_days: last_90,
        last_180_days: last_180,
        older_than_180_days: older_180,
        oldest_submission: oldest.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        estimated_size_mb: (estimated_mb * 100.0).round() / 100.0,
        next_cleanup_eligible: eligible,
    })
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Fixed-capacity ring buffer of cleanup runs; the oldest entry is evicted
/// first once full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupHistory {
    capacity: usize,
    entries: VecDeque<CleanupRecord>,
}

impl Default for CleanupHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CleanupHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Shrink (or grow) to a new capacity, evicting oldest entries.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self
    }

    pub fn push(&mut self, record: CleanupRecord) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn record(&mut self, stats: CleanupStats, kind: CleanupKind) {
        self.push(CleanupRecord { stats, kind });
    }

    /// The last `n` records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<CleanupRecord> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
