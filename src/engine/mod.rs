//! Engine — the price clustering fold, the grouped-prices read path, and
//! retention bookkeeping.

pub mod clustering;
pub mod retention;
pub mod summary;

pub use clustering::{cluster, ClusterConfig};
pub use retention::CleanupHistory;
pub use summary::grouped_prices;
