//! Grouped-prices read path: store → fold → wire shape.

use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use pricewatch::engine::{cluster, grouped_prices, ClusterConfig};
use pricewatch::types::PriceError;

use crate::mock_store::{observation, MockStore};

#[tokio::test]
async fn test_grouped_prices_through_store() {
    // Stored oldest first; the store hands them back newest first.
    let store = MockStore::with_rows(vec![
        observation("7038010009457", dec!(22.20), 60),
        observation("7038010009457", dec!(21.90), 50),
        observation("7038010009457", dec!(24.90), 40),
        observation("7311070347272", dec!(39.90), 30),
        observation("7038010009457", dec!(21.50), 20),
    ]);

    let grouped = assert_ok!(grouped_prices(&store, &ClusterConfig::default()).await);

    // 21.50 seeds the natural band, 24.90 splits off, 21.90 then 22.20 chain in.
    assert_eq!(grouped.count, 3);
    let milk = &grouped.prices[0];
    assert_eq!(milk.barcode, "7038010009457");
    assert_eq!(milk.min_price, dec!(21.50));
    assert_eq!(milk.max_price, dec!(22.20));
    assert_eq!(milk.count, 3);
    assert_eq!(grouped.prices[1].barcode, "7311070347272");
    assert_eq!(grouped.prices[2].min_price, dec!(24.90));

    let total: u64 = grouped.prices.iter().map(|g| g.count).sum();
    assert_eq!(total, 5);
}

#[tokio::test]
async fn test_same_price_outliers_share_a_band() {
    let store = MockStore::with_rows(vec![
        observation("A", dec!(30.0), 3),
        observation("A", dec!(30.00), 2),
        observation("A", dec!(10.00), 1),
    ]);

    let grouped = assert_ok!(grouped_prices(&store, &ClusterConfig::default()).await);
    assert_eq!(grouped.count, 2);
    assert_eq!(grouped.prices[1].min_price, dec!(30));
    assert_eq!(grouped.prices[1].count, 2);
}

#[tokio::test]
async fn test_limit_truncates_most_recent_first() {
    let rows = (0..20)
        .map(|i| observation(&format!("P{i:02}"), dec!(9.90), 100 - i))
        .collect();
    let store = MockStore::with_rows(rows);

    let cfg = ClusterConfig::default().with_limit(5);
    let grouped = assert_ok!(grouped_prices(&store, &cfg).await);
    let barcodes: Vec<_> = grouped.prices.iter().map(|g| g.barcode.as_str()).collect();
    assert_eq!(barcodes, vec!["P19", "P18", "P17", "P16", "P15"]);
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let store = MockStore::with_rows(vec![observation("A", dec!(1), 1)]);
    store.set_error("connection reset");

    let result = grouped_prices(&store, &ClusterConfig::default()).await;
    assert!(matches!(result, Err(PriceError::Storage(_))));

    store.clear_error();
    assert_ok!(grouped_prices(&store, &ClusterConfig::default()).await);
}

#[tokio::test]
async fn test_corrupt_rows_do_not_fail_read() {
    let mut bad = observation("", dec!(5), 1);
    bad.product_name = "Nameless".into();
    let store = MockStore::with_rows(vec![observation("A", dec!(5), 2), bad]);

    let grouped = assert_ok!(grouped_prices(&store, &ClusterConfig::default()).await);
    assert_eq!(grouped.count, 1);
    assert_eq!(grouped.prices[0].barcode, "A");
}

#[test]
fn test_direct_cluster_rejects_bad_input() {
    let rows = vec![observation("A", dec!(5), 2), observation("A", dec!(-1), 1)];
    assert_err!(cluster(&rows, dec!(0.5), 10));
    assert_err!(cluster(&rows[..1], dec!(-0.1), 10));
    assert_err!(cluster(&rows[..1], dec!(0.5), 0));
    assert_ok!(cluster(&[], dec!(0.5), 1));
}

#[test]
fn test_zero_tolerance_only_groups_exact_prices() {
    let rows = vec![
        observation("A", dec!(10.00), 3),
        observation("A", dec!(10.01), 2),
        observation("A", dec!(10.0), 1),
    ];
    let groups = assert_ok!(cluster(&rows, dec!(0), 10));
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].count, 2);
    assert_eq!(groups[0].min_price, dec!(10));
    assert_eq!(groups[1].min_price, dec!(10.01));
}
