//! Public API route handlers: prices, products, receipts, health.
//!
//! All endpoints return JSON. State is shared via `Arc<AppContext>`.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ApiError, AppState};
use crate::engine::summary;
use crate::types::{
    receipt_total, GroupedPrices, NewSubmission, PriceError, ProductInfo, ReceiptItem,
};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct GroupedQuery {
    /// Kept as text so junk values fall back to the default instead of 400.
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub id: String,
    pub submitted_at: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanTextRequest {
    #[serde(default, rename = "receiptText")]
    pub receipt_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptScanResponse {
    pub success: bool,
    pub items: Vec<ReceiptItem>,
    pub total: Decimal,
    #[serde(rename = "itemCount")]
    pub item_count: usize,
}

impl TryFrom<Vec<ReceiptItem>> for ReceiptScanResponse {
    type Error = PriceError;

    fn try_from(items: Vec<ReceiptItem>) -> Result<Self, Self::Error> {
        let total = receipt_total(&items)
            .ok_or_else(|| PriceError::Validation("receipt total overflows".into()))?;
        Ok(Self {
            success: true,
            total,
            item_count: items.len(),
            items,
        })
    }
}

/// Analyzer errors, including rejected model output, are upstream failures.
fn analyzer_failure(context: &'static str) -> impl Fn(PriceError) -> ApiError {
    move |e| match e {
        PriceError::Validation(msg) => {
            ApiError::new(context, PriceError::upstream("receipt-analyzer", msg))
        }
        other => ApiError::new(context, other),
    }
}

/// Resolve the requested group count: default when missing, junk or zero,
/// capped at the configured maximum.
pub fn resolve_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
        .min(max)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/prices/grouped
pub async fn get_grouped_prices(
    State(state): State<AppState>,
    Query(query): Query<GroupedQuery>,
) -> Result<Json<GroupedPrices>, ApiError> {
    let limit = resolve_limit(
        query.limit.as_deref(),
        state.clustering.default_limit,
        state.clustering.max_limit,
    );
    let config = state.clustering.cluster_config().with_limit(limit);

    let grouped = summary::grouped_prices(state.store.as_ref(), &config)
        .await
        .map_err(ApiError::during("Failed to get grouped prices"))?;

    Ok(Json(grouped))
}

/// POST /api/prices/submit
pub async fn submit_price(
    State(state): State<AppState>,
    Json(submission): Json<NewSubmission>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    submission
        .validate()
        .map_err(ApiError::during("Invalid price submission"))?;

    let observation = submission.into_observation(Utc::now());
    let id = state
        .store
        .insert(&observation)
        .await
        .map_err(ApiError::during("Failed to submit price"))?;

    info!(id = %id, barcode = %observation.barcode, price = %observation.price, "Price submitted");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            id,
            submitted_at: observation
                .submitted_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    ))
}

/// GET /api/products/:barcode
pub async fn get_product(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> Result<Json<ProductInfo>, ApiError> {
    let info = state
        .lookup
        .lookup(&barcode)
        .await
        .map_err(ApiError::during("Failed to look up product"))?;
    debug!(barcode = %barcode, known = !info.is_unknown(), "Product lookup");
    Ok(Json(info))
}

/// POST /api/receipt/scan (multipart, field `receipt`)
pub async fn scan_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ReceiptScanResponse>, ApiError> {
    const CONTEXT: &str = "Failed to scan receipt";
    let invalid = |msg: String| ApiError::new(CONTEXT, PriceError::Validation(msg));

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| invalid(format!("malformed upload: {e}")))?
    {
        if field.name() != Some("receipt") {
            continue;
        }
        let mime_type = field.content_type().unwrap_or_default().to_string();
        if !mime_type.starts_with("image/") {
            return Err(invalid("Only image files are allowed".into()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| invalid(format!("failed to read upload: {e}")))?;
        upload = Some((bytes, mime_type));
        break;
    }

    let (bytes, mime_type) = upload.ok_or_else(|| invalid("No receipt image provided".into()))?;
    if bytes.is_empty() {
        return Err(invalid("No receipt image provided".into()));
    }
    if bytes.len() > state.max_image_bytes {
        return Err(invalid(format!(
            "Receipt image exceeds {} bytes",
            state.max_image_bytes
        )));
    }

    info!(bytes = bytes.len(), mime_type = %mime_type, "Processing receipt scan");
    let items = state
        .analyzer
        .analyze_image(&bytes, &mime_type)
        .await
        .map_err(analyzer_failure(CONTEXT))?;

    info!(items = items.len(), "Receipt scan complete");
    let response = ReceiptScanResponse::try_from(items).map_err(analyzer_failure(CONTEXT))?;
    Ok(Json(response))
}

/// POST /api/receipt/scan-text
pub async fn scan_receipt_text(
    State(state): State<AppState>,
    Json(request): Json<ScanTextRequest>,
) -> Result<Json<ReceiptScanResponse>, ApiError> {
    const CONTEXT: &str = "Failed to analyze receipt text";

    let text = request
        .receipt_text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            ApiError::new(CONTEXT, PriceError::Validation("No receipt text provided".into()))
        })?;

    let items = state
        .analyzer
        .analyze_text(&text)
        .await
        .map_err(analyzer_failure(CONTEXT))?;

    info!(items = items.len(), "Receipt text analysis complete");
    let response = ReceiptScanResponse::try_from(items).map_err(analyzer_failure(CONTEXT))?;
    Ok(Json(response))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
