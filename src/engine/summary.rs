//! Grouped-prices read path: fetch recent observations, fold them, and
//! shape the result for the wire.

use tracing::{debug, warn};

use super::clustering::ClusterConfig;
use crate::storage::PriceStore;
use crate::types::{GroupedPrices, PriceError};

/// Build the grouped-prices summary for the `config.limit` most recently
/// seen price bands.
///
/// Fetches `config.fetch_size()` rows newest-first and hands them to the
/// engine in the order received. Rows that fail validation are skipped.
pub async fn grouped_prices(
    store: &dyn PriceStore,
    config: &ClusterConfig,
) -> Result<GroupedPrices, PriceError> {
    let fetch = config.fetch_size();
    let rows = store.recent(fetch).await?;
    let fetched = rows.len();

    let observations: Vec<_> = rows
        .into_iter()
        .filter(|obs| match obs.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, barcode = %obs.barcode, "Skipping invalid stored observation");
                false
            }
        })
        .collect();

    let groups = config.cluster(&observations)?;
    debug!(
        fetch,
        fetched,
        folded = observations.len(),
        groups = groups.len(),
        "Grouped prices built"
    );

    Ok(GroupedPrices::from(groups))
}
