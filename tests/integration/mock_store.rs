//! In-memory doubles for integration testing.
//!
//! `MockStore` is a deterministic `PriceStore` with no external
//! dependencies. `StubAnalyzer` and `StubLookup` return canned answers.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use pricewatch::llm::ReceiptAnalyzer;
use pricewatch::lookup::ProductLookup;
use pricewatch::storage::PriceStore;
use pricewatch::types::*;

/// Fixed "now" for deterministic tests.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// An observation submitted `minutes_ago` before `epoch()`.
pub fn observation(barcode: &str, price: Decimal, minutes_ago: i64) -> PriceObservation {
    PriceObservation {
        barcode: barcode.to_string(),
        product_name: format!("Product {barcode}"),
        price,
        currency: "NOK".to_string(),
        store_name: None,
        location: None,
        submitted_at: epoch() - Duration::minutes(minutes_ago),
    }
}

/// A mock price store. All rows live in a `Vec`; insertion order breaks
/// timestamp ties the same way the SQLite store does.
#[derive(Default)]
pub struct MockStore {
    rows: Arc<Mutex<Vec<(String, PriceObservation)>>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<PriceObservation>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.rows.lock().unwrap();
            for obs in rows {
                guard.push((Uuid::new_v4().to_string(), obs));
            }
        }
        store
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), PriceError> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(PriceError::Storage(err.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PriceStore for MockStore {
    async fn insert(&self, observation: &PriceObservation) -> Result<String, PriceError> {
        self.check()?;
        let id = Uuid::new_v4().to_string();
        self.rows
            .lock()
            .unwrap()
            .push((id.clone(), observation.clone()));
        Ok(id)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PriceObservation>, PriceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        let mut indexed: Vec<(usize, &PriceObservation)> =
            rows.iter().map(|(_, o)| o).enumerate().collect();
        indexed.sort_by(|a, b| {
            b.1.submitted_at
                .cmp(&a.1.submitted_at)
                .then(b.0.cmp(&a.0))
        });
        Ok(indexed
            .into_iter()
            .take(limit)
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn count_all(&self) -> Result<u64, PriceError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<u64, PriceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|(_, o)| o.submitted_at >= since).count() as u64)
    }

    async fn count_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PriceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|(_, o)| o.submitted_at < cutoff).count() as u64)
    }

    async fn oldest_submission(&self) -> Result<Option<DateTime<Utc>>, PriceError> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().map(|(_, o)| o.submitted_at).min())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PriceError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(_, o)| o.submitted_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Returns the same items for every receipt.
pub struct StubAnalyzer {
    pub items: Vec<ReceiptItem>,
}

#[async_trait]
impl ReceiptAnalyzer for StubAnalyzer {
    async fn analyze_image(&self, _image: &[u8], _mime_type: &str) -> Result<Vec<ReceiptItem>, PriceError> {
        Ok(self.items.clone())
    }

    async fn analyze_text(&self, _text: &str) -> Result<Vec<ReceiptItem>, PriceError> {
        Ok(self.items.clone())
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// Knows one product; everything else is unknown.
pub struct StubLookup {
    pub barcode: String,
    pub product: ProductInfo,
}

#[async_trait]
impl ProductLookup for StubLookup {
    async fn lookup(&self, barcode: &str) -> Result<ProductInfo, PriceError> {
        if barcode == self.barcode {
            Ok(self.product.clone())
        } else {
            Ok(ProductInfo::unknown())
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}
