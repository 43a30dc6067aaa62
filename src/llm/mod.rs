//! Receipt analysis through an external vision/chat model.
//!
//! Defines the `ReceiptAnalyzer` trait, the OpenAI implementation, and the
//! validation boundary every model response must pass before it reaches
//! the rest of the system.

pub mod openai;
pub mod receipt;

use async_trait::async_trait;

use crate::types::{PriceError, ReceiptItem};

/// Abstraction over receipt extraction models.
///
/// Implementors send a receipt (image or plain text) to a model and return
/// only fully validated line items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiptAnalyzer: Send + Sync {
    /// Extract line items from a receipt photo.
    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<Vec<ReceiptItem>, PriceError>;

    /// Extract line items from receipt text (fallback when upload fails).
    async fn analyze_text(&self, text: &str) -> Result<Vec<ReceiptItem>, PriceError>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}
