//! HTTP API — Axum server for price submissions, grouped prices, receipt
//! scanning, product lookup, and retention administration.
//!
//! CORS is open for the mobile client.

pub mod admin;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::SecretString;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::{ClusteringConfig, RetentionConfig};
use crate::engine::CleanupHistory;
use crate::llm::ReceiptAnalyzer;
use crate::lookup::ProductLookup;
use crate::storage::PriceStore;
use crate::types::PriceError;

/// Multipart framing allowance on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct AppContext {
    pub store: Arc<dyn PriceStore>,
    pub analyzer: Arc<dyn ReceiptAnalyzer>,
    pub lookup: Arc<dyn ProductLookup>,
    pub clustering: ClusteringConfig,
    pub retention: RetentionConfig,
    pub admin_secret: SecretString,
    pub storage_limit_mb: f64,
    pub max_image_bytes: usize,
    pub history: RwLock<CleanupHistory>,
}

pub type AppState = Arc<AppContext>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A `PriceError` tagged with what the handler was trying to do.
#[derive(Debug)]
pub struct ApiError {
    pub context: &'static str,
    pub source: PriceError,
}

impl ApiError {
    pub fn new(context: &'static str, source: PriceError) -> Self {
        Self { context, source }
    }

    /// Adapter for `map_err`.
    pub fn during(context: &'static str) -> impl Fn(PriceError) -> ApiError {
        move |source| ApiError::new(context, source)
    }

    pub fn status(&self) -> StatusCode {
        match self.source {
            PriceError::Validation(_) => StatusCode::BAD_REQUEST,
            PriceError::Unauthorized => StatusCode::UNAUTHORIZED,
            PriceError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            PriceError::Storage(_) | PriceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(self.source, PriceError::Unauthorized) {
            return (status, Json(json!({ "error": "Unauthorized" }))).into_response();
        }
        if status.is_server_error() {
            error!(error = %self.source, context = self.context, "Request failed");
        }
        (
            status,
            Json(json!({
                "error": self.context,
                "message": self.source.to_string(),
            })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let upload_limit = state.max_image_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // Prices
        .route("/api/prices/grouped", get(routes::get_grouped_prices))
        .route("/api/prices/submit", post(routes::submit_price))
        // Products
        .route("/api/products/:barcode", get(routes::get_product))
        // Receipts
        .route(
            "/api/receipt/scan",
            post(routes::scan_receipt).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/receipt/scan-text", post(routes::scan_receipt_text))
        // Admin
        .route("/api/admin/dashboard", get(admin::get_dashboard))
        .route("/api/admin/cleanup", post(admin::post_cleanup))
        .route("/api/admin/cleanup/history", get(admin::get_cleanup_history))
        .route("/api/admin/cleanup/scheduled", post(admin::post_scheduled_cleanup))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
