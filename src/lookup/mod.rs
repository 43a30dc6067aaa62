//! Product metadata lookup by barcode.
//!
//! Defines the `ProductLookup` trait; the Kassal EAN API is the only
//! implementation.

pub mod kassal;

use async_trait::async_trait;

use crate::types::{PriceError, ProductInfo};

/// Abstraction over product metadata services.
///
/// A barcode the service does not know resolves to `ProductInfo::unknown()`;
/// transport and API failures are errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn lookup(&self, barcode: &str) -> Result<ProductInfo, PriceError>;

    /// Provider name for logging and identification.
    fn name(&self) -> &str;
}
