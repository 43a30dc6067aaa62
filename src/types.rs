//! Shared types for PRICEWATCH.
//!
//! These types form the data model used across all modules: raw price
//! observations coming out of storage, the price groups produced by the
//! clustering engine, receipt and product payloads from the external
//! services, and retention bookkeeping.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name used when the product API has no match for a barcode.
pub const UNKNOWN_PRODUCT_NAME: &str = "Ukjent produkt";

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// One user-submitted price record for a product at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub barcode: String,
    pub product_name: String,
    pub price: Decimal,
    pub currency: String,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for PriceObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} @ {} ({})",
            self.barcode,
            self.product_name,
            self.price,
            self.currency,
            self.store_name.as_deref().unwrap_or("-"),
            self.submitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}

impl PriceObservation {
    /// Reject records the clustering engine must never fold.
    pub fn validate(&self) -> Result<(), PriceError> {
        if self.barcode.trim().is_empty() {
            return Err(PriceError::Validation("observation has an empty barcode".into()));
        }
        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(PriceError::Validation(format!(
                "observation for {} has a negative price: {}",
                self.barcode, self.price
            )));
        }
        Ok(())
    }

    /// Helper to build a test observation with sensible defaults.
    #[cfg(test)]
    pub fn sample(barcode: &str, price: Decimal, minutes_ago: i64) -> Self {
        PriceObservation {
            barcode: barcode.to_string(),
            product_name: format!("Product {barcode}"),
            price,
            currency: "NOK".to_string(),
            store_name: None,
            location: None,
            submitted_at: sample_epoch() - chrono::Duration::minutes(minutes_ago),
        }
    }
}

/// Fixed reference time for deterministic tests.
#[cfg(test)]
pub fn sample_epoch() -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Incoming price submission, before the server stamps time and id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub barcode: String,
    pub product_name: String,
    pub price: Decimal,
    pub currency: String,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewSubmission {
    pub fn validate(&self) -> Result<(), PriceError> {
        if self.barcode.trim().is_empty() {
            return Err(PriceError::Validation("barcode is required".into()));
        }
        if self.product_name.trim().is_empty() {
            return Err(PriceError::Validation("product_name is required".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(PriceError::Validation("currency is required".into()));
        }
        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(PriceError::Validation(format!(
                "price must be non-negative, got {}",
                self.price
            )));
        }
        Ok(())
    }

    /// Stamp the submission into an observation. Blank optional fields
    /// are dropped so they never reach the store.
    pub fn into_observation(self, submitted_at: DateTime<Utc>) -> PriceObservation {
        PriceObservation {
            barcode: self.barcode.trim().to_string(),
            product_name: self.product_name.trim().to_string(),
            price: self.price,
            currency: self.currency.trim().to_uppercase(),
            store_name: non_blank(self.store_name),
            location: non_blank(self.location),
            submitted_at,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Price groups
// ---------------------------------------------------------------------------

/// Identity of a price band within one clustering pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Barcode-only key of the first band seen for a product.
    Natural(String),
    /// Barcode + price key anchoring a band that did not fit the natural one.
    Synthetic { barcode: String, price: Decimal },
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Natural(barcode) => write!(f, "{barcode}"),
            GroupKey::Synthetic { barcode, price } => {
                write!(f, "{barcode}_{}", price.normalize())
            }
        }
    }
}

/// A contiguous price band for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceGroup {
    #[serde(skip)]
    pub key: GroupKey,
    pub barcode: String,
    pub product_name: String,
    pub min_price: Decimal,
    pub max_price: Decimal,
    #[serde(rename = "submission_count")]
    pub count: u64,
    pub currency: String,
    pub stores: Vec<String>,
    pub locations: Vec<String>,
    #[serde(rename = "latest_submission", serialize_with = "serialize_rfc3339")]
    pub latest_submitted_at: DateTime<Utc>,
}

impl fmt::Display for PriceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}–{} {} (n={}, stores={})",
            self.key,
            self.product_name,
            self.min_price,
            self.max_price,
            self.currency,
            self.count,
            self.stores.len(),
        )
    }
}

impl PriceGroup {
    /// Seed a new band from a single observation.
    pub fn seed(key: GroupKey, obs: &PriceObservation) -> Self {
        let mut group = Self {
            key,
            barcode: obs.barcode.clone(),
            product_name: obs.product_name.clone(),
            min_price: obs.price,
            max_price: obs.price,
            count: 1,
            currency: obs.currency.clone(),
            stores: Vec::new(),
            locations: Vec::new(),
            latest_submitted_at: obs.submitted_at,
        };
        group.note_provenance(obs);
        group
    }

    /// Whether `price` lies within `tolerance` of the current band.
    ///
    /// An edge that would fall outside the `Decimal` range is unbounded.
    pub fn accepts(&self, price: Decimal, tolerance: Decimal) -> bool {
        let above_floor = self
            .min_price
            .checked_sub(tolerance)
            .map_or(true, |floor| price >= floor);
        let below_ceiling = self
            .max_price
            .checked_add(tolerance)
            .map_or(true, |ceiling| price <= ceiling);
        above_floor && below_ceiling
    }

    /// Fold an observation into the band. Only ever widens.
    pub fn absorb(&mut self, obs: &PriceObservation) {
        self.min_price = self.min_price.min(obs.price);
        self.max_price = self.max_price.max(obs.price);
        self.count += 1;
        self.note_provenance(obs);
        if obs.submitted_at > self.latest_submitted_at {
            self.latest_submitted_at = obs.submitted_at;
        }
    }

    fn note_provenance(&mut self, obs: &PriceObservation) {
        push_distinct(&mut self.stores, obs.store_name.as_deref());
        push_distinct(&mut self.locations, obs.location.as_deref());
    }
}

fn push_distinct(set: &mut Vec<String>, value: Option<&str>) {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    if !set.iter().any(|existing| existing == value) {
        set.push(value.to_string());
    }
}

fn serialize_rfc3339<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Wire shape of the grouped-prices read path.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedPrices {
    pub count: usize,
    pub prices: Vec<PriceGroup>,
}

impl From<Vec<PriceGroup>> for GroupedPrices {
    fn from(prices: Vec<PriceGroup>) -> Self {
        Self {
            count: prices.len(),
            prices,
        }
    }
}

// ---------------------------------------------------------------------------
// External payloads
// ---------------------------------------------------------------------------

/// A validated line item extracted from a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

impl ReceiptItem {
    /// `price × quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Sum of all line totals on a receipt, or `None` on overflow.
pub fn receipt_total(items: &[ReceiptItem]) -> Option<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total()?))
}

/// Product metadata resolved from a barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ProductInfo {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_PRODUCT_NAME.to_string(),
            brand: None,
            category: None,
            image_url: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_PRODUCT_NAME && self.brand.is_none()
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Result of a single retention cleanup run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub deleted_count: u64,
    pub cleanup_date: String,
    pub retention_days: u32,
}

/// What triggered a cleanup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupKind {
    Scheduled,
    Manual,
}

impl fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupKind::Scheduled => write!(f, "scheduled"),
            CleanupKind::Manual => write!(f, "manual"),
        }
    }
}

/// A cleanup run as remembered by the history ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRecord {
    #[serde(flatten)]
    pub stats: CleanupStats,
    #[serde(rename = "type")]
    pub kind: CleanupKind,
}

/// Size and age breakdown of the submissions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_submissions: u64,
    pub last_30_days: u64,
    pub last_90_days: u64,
    pub last_180_days: u64,
    pub older_than_180_days: u64,
    pub oldest_submission: Option<String>,
    pub estimated_size_mb: f64,
    pub next_cleanup_eligible: u64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PRICEWATCH.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Upstream error ({service}): {message}")]
    Upstream { service: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PriceError {
    pub fn upstream(service: &str, message: impl Into<String>) -> Self {
        PriceError::Upstream {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for PriceError {
    fn from(e: sqlx::Error) -> Self {
        PriceError::Storage(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
