//! Price clustering — folds a recency-ordered observation stream into
//! per-product price bands.
//!
//! Single left-to-right pass, chained tolerance, flat key lookup. An
//! observation is only ever tested against its barcode's natural-key
//! band; one that misses lands in a band keyed by barcode + price.
//! Earlier bands are never revisited, so the result depends on input
//! order across bands (but not within one band).

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{GroupKey, PriceError, PriceGroup, PriceObservation};

/// Default band tolerance in the submissions' currency unit.
pub const DEFAULT_TOLERANCE: Decimal = dec!(0.50);
/// Default number of groups returned by the read path.
pub const DEFAULT_LIMIT: usize = 50;
/// Raw rows fetched per requested group.
pub const DEFAULT_FETCH_MULTIPLIER: usize = 3;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub tolerance: Decimal,
    pub limit: usize,
    pub fetch_multiplier: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            limit: DEFAULT_LIMIT,
            fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
        }
    }
}

impl ClusterConfig {
    /// Copy of this config with a different output limit.
    pub fn with_limit(&self, limit: usize) -> Self {
        Self {
            limit,
            ..self.clone()
        }
    }

    /// How many raw observations to fetch so truncation stays meaningful.
    pub fn fetch_size(&self) -> usize {
        self.limit.saturating_mul(self.fetch_multiplier.max(1))
    }

    pub fn cluster(&self, observations: &[PriceObservation]) -> Result<Vec<PriceGroup>, PriceError> {
        cluster(observations, self.tolerance, self.limit)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Cluster `observations` into at most `limit` price bands, most recently
/// seen first.
///
/// Every observation is validated before folding starts; a single bad
/// record fails the whole call.
pub fn cluster(
    observations: &[PriceObservation],
    tolerance: Decimal,
    limit: usize,
) -> Result<Vec<PriceGroup>, PriceError> {
    if tolerance.is_sign_negative() && !tolerance.is_zero() {
        return Err(PriceError::Validation(format!(
            "tolerance must be non-negative, got {tolerance}"
        )));
    }
    if limit == 0 {
        return Err(PriceError::Validation("limit must be at least 1".into()));
    }
    for obs in observations {
        obs.validate()?;
    }

    let mut groups = fold(observations, tolerance);
    let total = groups.len();

    // Stable: equal timestamps keep insertion order.
    groups.sort_by(|a, b| b.latest_submitted_at.cmp(&a.latest_submitted_at));
    groups.truncate(limit);

    debug!(
        observations = observations.len(),
        groups = total,
        returned = groups.len(),
        %tolerance,
        "Clustered observations"
    );

    Ok(groups)
}

/// The fold itself, in insertion order.
fn fold(observations: &[PriceObservation], tolerance: Decimal) -> Vec<PriceGroup> {
    let mut groups: Vec<PriceGroup> = Vec::new();
    let mut index: HashMap<GroupKey, usize> = HashMap::new();

    for obs in observations {
        let natural = GroupKey::Natural(obs.barcode.clone());

        let key = match index.get(&natural) {
            None => natural,
            Some(&slot) if groups[slot].accepts(obs.price, tolerance) => natural,
            Some(_) => GroupKey::Synthetic {
                barcode: obs.barcode.clone(),
                price: obs.price,
            },
        };

        match index.get(&key) {
            Some(&slot) => groups[slot].absorb(obs),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(PriceGroup::seed(key, obs));
            }
        }
    }

    groups
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
