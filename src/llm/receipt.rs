//! Validation boundary for model-extracted receipt items.
//!
//! The model is asked for a bare JSON array of `{name, price, quantity}`.
//! Its answer is deserialized into a strict shape; any item that is
//! missing a field, has a blank name, a non-positive price or a zero
//! quantity rejects the whole response, as does a total that overflows.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;

use crate::types::{receipt_total, PriceError, ReceiptItem};

/// Shared system prompt for both image and text extraction.
pub const SYSTEM_PROMPT: &str = "Du er en ekspert på å analysere norske kvitteringer.
Ekstraher produktinformasjon fra kvitteringen og returner som JSON.

Returner KUN et JSON-array med følgende format:
[
  {\"name\": \"produktnavn\", \"price\": 99.90, \"quantity\": 1},
  {\"name\": \"annet produkt\", \"price\": 45.50, \"quantity\": 2}
]

Viktige regler:
- Ignorer totalbeløp, MVA, rabatter
- Fokuser kun på faktiske produkter
- Bruk norske produktnavn
- Priser skal være i NOK
- Quantity er valgfritt, standard er 1
- Returner KUN JSON-array, ingen annen tekst";

pub const IMAGE_INSTRUCTION: &str =
    "Analyser denne norske kvitteringen og ekstraher produkter med priser:";

pub fn text_instruction(receipt_text: &str) -> String {
    format!("Analyser denne norske kvitteringsteksten og ekstraher produkter med priser:\n\n{receipt_text}")
}

#[derive(Debug, Deserialize)]
struct RawItem {
    name: String,
    price: Decimal,
    #[serde(default)]
    quantity: Option<u32>,
}

/// Parse and validate a model answer into receipt items.
pub fn parse_items(content: &str) -> Result<Vec<ReceiptItem>, PriceError> {
    let body = strip_code_fence(content);
    let raw: Vec<RawItem> = serde_json::from_str(body)
        .map_err(|e| PriceError::Validation(format!("receipt response is not a valid item array: {e}")))?;

    let items = raw
        .into_iter()
        .enumerate()
        .map(|(i, item)| validate_item(i, item))
        .collect::<Result<Vec<_>, _>>()?;

    if receipt_total(&items).is_none() {
        return Err(PriceError::Validation(
            "receipt total exceeds the representable range".into(),
        ));
    }
    Ok(items)
}

fn validate_item(index: usize, item: RawItem) -> Result<ReceiptItem, PriceError> {
    let name = item.name.trim();
    if name.is_empty() {
        return Err(PriceError::Validation(format!("item {index} has an empty name")));
    }
    if item.price <= Decimal::ZERO {
        return Err(PriceError::Validation(format!(
            "item {index} ('{name}') has a non-positive price: {}",
            item.price
        )));
    }
    let quantity = item.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(PriceError::Validation(format!(
            "item {index} ('{name}') has zero quantity"
        )));
    }

    let item = ReceiptItem {
        name: name.to_string(),
        price: item
            .price
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        quantity,
    };
    if item.line_total().is_none() {
        return Err(PriceError::Validation(format!(
            "item {index} ('{name}') line total overflows: {} x {quantity}",
            item.price
        )));
    }
    Ok(item)
}

/// Models sometimes wrap JSON in a Markdown fence despite instructions.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
