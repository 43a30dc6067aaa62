//! Retention: cleanup against a store, stats, and history persistence.

use chrono::Duration;
use rust_decimal_macros::dec;
use tokio_test::assert_ok;

use pricewatch::engine::retention::{cleanup_old_submissions, storage_stats};
use pricewatch::engine::CleanupHistory;
use pricewatch::storage::{self, PriceStore};
use pricewatch::types::{CleanupKind, PriceError};

use crate::mock_store::{epoch, observation, MockStore};

fn store_with_ages(days: &[i64]) -> MockStore {
    let rows = days
        .iter()
        .map(|d| {
            let mut obs = observation("A", dec!(10), 0);
            obs.submitted_at = epoch() - Duration::days(*d);
            obs
        })
        .collect();
    MockStore::with_rows(rows)
}

#[tokio::test]
async fn test_stats_then_cleanup() {
    let store = store_with_ages(&[0, 29, 31, 100, 181, 500]);

    let before = assert_ok!(storage_stats(&store, 180, epoch()).await);
    assert_eq!(before.total_submissions, 6);
    assert_eq!(before.last_30_days, 2);
    assert_eq!(before.last_90_days, 3);
    assert_eq!(before.last_180_days, 4);
    assert_eq!(before.older_than_180_days, 2);
    assert_eq!(before.next_cleanup_eligible, 2);

    let stats = assert_ok!(cleanup_old_submissions(&store, 180, epoch()).await);
    assert_eq!(stats.deleted_count, 2);
    assert_eq!(store.len(), 4);

    let after = assert_ok!(storage_stats(&store, 180, epoch()).await);
    assert_eq!(after.older_than_180_days, 0);
    assert_eq!(after.next_cleanup_eligible, 0);
    assert_eq!(after.total_submissions, before.total_submissions - stats.deleted_count);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let store = store_with_ages(&[1, 365]);
    let first = assert_ok!(cleanup_old_submissions(&store, 180, epoch()).await);
    let second = assert_ok!(cleanup_old_submissions(&store, 180, epoch()).await);
    assert_eq!(first.deleted_count, 1);
    assert_eq!(second.deleted_count, 0);
}

#[tokio::test]
async fn test_cleanup_store_error() {
    let store = store_with_ages(&[365]);
    store.set_error("disk full");
    let result = cleanup_old_submissions(&store, 180, epoch()).await;
    assert!(matches!(result, Err(PriceError::Storage(_))));

    store.clear_error();
    assert_eq!(assert_ok!(store.count_all().await), 1);
}

#[tokio::test]
async fn test_history_survives_restart() {
    let mut path = std::env::temp_dir();
    path.push(format!("pricewatch_it_history_{}.json", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    let store = store_with_ages(&[1, 200, 300]);
    let mut history = CleanupHistory::new(3);
    for kind in [CleanupKind::Scheduled, CleanupKind::Manual] {
        let stats = assert_ok!(cleanup_old_submissions(&store, 180, epoch()).await);
        history.record(stats, kind);
    }
    assert_ok!(storage::save_history(&history, Some(&path)));

    let restored = assert_ok!(storage::load_history(Some(&path)))
        .expect("history file should exist");
    let entries = restored.recent(10);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, CleanupKind::Scheduled);
    assert_eq!(entries[0].stats.deleted_count, 2);
    assert_eq!(entries[1].kind, CleanupKind::Manual);
    assert_eq!(entries[1].stats.deleted_count, 0);

    assert_ok!(storage::delete_history(Some(&path)));
}
