//! Admin routes: storage dashboard, manual and scheduled cleanup, and the
//! cleanup history.
//!
//! Admin routes expect `Authorization: Bearer <secret>`. The scheduled
//! route is meant for an external cron and expects `x-cron-secret`.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ApiError, AppContext, AppState};
use crate::engine::retention;
use crate::storage;
use crate::types::{CleanupKind, CleanupRecord, CleanupStats, PriceError, StorageStats};

/// Number of history entries returned by the history endpoint.
pub const HISTORY_PAGE: usize = 10;

const CRON_HEADER: &str = "x-cron-secret";

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn is_admin(headers: &HeaderMap, secret: &SecretString) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret.expose_secret())
}

fn is_cron(headers: &HeaderMap, secret: &SecretString) -> bool {
    headers
        .get(CRON_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|token| token == secret.expose_secret())
}

fn require(ok: bool) -> Result<(), ApiError> {
    if ok {
        Ok(())
    } else {
        Err(ApiError::new("Unauthorized", PriceError::Unauthorized))
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CleanupInfo {
    pub retention_days: u32,
    pub next_cleanup_eligible: u64,
    pub auto_cleanup_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub database: String,
    pub storage_limit_mb: f64,
    pub usage_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub storage: StorageStats,
    pub cleanup_info: CleanupInfo,
    pub system_info: SystemInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    #[serde(flatten)]
    pub stats: CleanupStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<CleanupRecord>,
}

fn usage_percentage(estimated_mb: f64, limit_mb: f64) -> f64 {
    if limit_mb <= 0.0 {
        return 0.0;
    }
    ((estimated_mb / limit_mb) * 100.0 * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Cleanup runner
// ---------------------------------------------------------------------------

/// Run one cleanup pass and append it to the history.
///
/// Shared by the admin routes and the in-process scheduler. Failing to
/// persist the history is logged, not returned.
pub async fn run_cleanup(
    ctx: &AppContext,
    retention_days: u32,
    kind: CleanupKind,
) -> Result<CleanupStats, PriceError> {
    let stats =
        retention::cleanup_old_submissions(ctx.store.as_ref(), retention_days, Utc::now()).await?;

    let snapshot = {
        let mut history = ctx.history.write().await;
        history.record(stats.clone(), kind);
        history.clone()
    };

    if let Some(path) = ctx.retention.history_file.clone() {
        let written = tokio::task::spawn_blocking(move || {
            storage::save_history(&snapshot, Some(path.as_str()))
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to persist cleanup history"),
            Err(e) => warn!(error = %e, "Cleanup history writer panicked"),
        }
    }

    Ok(stats)
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/admin/dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, ApiError> {
    require(is_admin(&headers, &state.admin_secret))?;

    let retention_days = state.retention.retention_days;
    let storage = retention::storage_stats(state.store.as_ref(), retention_days, Utc::now())
        .await
        .map_err(ApiError::during("Failed to get dashboard data"))?;

    Ok(Json(DashboardResponse {
        cleanup_info: CleanupInfo {
            retention_days,
            next_cleanup_eligible: storage.next_cleanup_eligible,
            auto_cleanup_enabled: state.retention.auto_cleanup_interval_hours.is_some(),
        },
        system_info: SystemInfo {
            database: state.store.name().to_string(),
            storage_limit_mb: state.storage_limit_mb,
            usage_percentage: usage_percentage(storage.estimated_size_mb, state.storage_limit_mb),
        },
        storage,
    }))
}

/// POST /api/admin/cleanup
pub async fn post_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<CleanupRequest>>,
) -> Result<Json<CleanupResponse>, ApiError> {
    require(is_admin(&headers, &state.admin_secret))?;

    let retention_days = body
        .and_then(|Json(req)| req.retention_days)
        .filter(|&d| d > 0)
        .unwrap_or(state.retention.retention_days);

    info!(retention_days, "Manual cleanup requested");
    let stats = run_cleanup(&state, retention_days, CleanupKind::Manual)
        .await
        .map_err(ApiError::during("Failed to perform cleanup"))?;

    Ok(Json(CleanupResponse { success: true, stats }))
}

/// POST /api/admin/cleanup/scheduled
pub async fn post_scheduled_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, ApiError> {
    require(is_cron(&headers, &state.admin_secret))?;

    let stats = run_cleanup(&state, state.retention.retention_days, CleanupKind::Scheduled)
        .await
        .map_err(ApiError::during("Scheduled cleanup failed"))?;

    Ok(Json(CleanupResponse { success: true, stats }))
}

/// GET /api/admin/cleanup/history
pub async fn get_cleanup_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, ApiError> {
    require(is_admin(&headers, &state.admin_secret))?;

    let history = state.history.read().await.recent(HISTORY_PAGE);
    Ok(Json(HistoryResponse { history }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
