//! PRICEWATCH — crowd-sourced grocery price bands
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the store, restores the cleanup history from disk (or starts
//! fresh), and serves the HTTP API with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use pricewatch::api::{self, admin, AppContext, AppState};
use pricewatch::config;
use pricewatch::engine::CleanupHistory;
use pricewatch::llm::{openai::OpenAiClient, ReceiptAnalyzer};
use pricewatch::lookup::{kassal::KassalClient, ProductLookup};
use pricewatch::storage::{self, sqlite::SqliteStore};
use pricewatch::types::CleanupKind;

const BANNER: &str = r#"
 ___      _          __        __    _       _
| _ \_ _ (_)__ ___   \ \      / /_ _| |_ ___| |__
|  _/ '_|| / _/ -_)   \ \ /\ / / _` |  _/ __| '_ \
|_| |_|  |_\__\___|    \_/  \/ \__,_|\__\___|_| |_|

  Crowd-sourced grocery price bands
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        port = cfg.server.port,
        tolerance = %cfg.clustering.tolerance,
        retention_days = cfg.retention.retention_days,
        "PRICEWATCH starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = Arc::new(
        SqliteStore::connect(&cfg.storage.database_url, cfg.storage.max_connections).await?,
    );

    let openai_key = std::env::var(&cfg.receipt.api_key_env).unwrap_or_default();
    if openai_key.is_empty() {
        warn!(env = %cfg.receipt.api_key_env, "No OpenAI API key configured; receipt scanning will fail");
    }
    let analyzer = OpenAiClient::new(
        openai_key,
        Some(cfg.receipt.model.clone()),
        Some(cfg.receipt.max_tokens),
        cfg.receipt.timeout_secs,
    )?;
    info!(model = analyzer.model_name(), "Receipt analyzer ready");

    let kassal_key = std::env::var(&cfg.lookup.api_key_env).unwrap_or_default();
    if kassal_key.is_empty() {
        warn!(env = %cfg.lookup.api_key_env, "No Kassal API key configured; product lookup will fail");
    }
    let lookup = KassalClient::new(
        kassal_key,
        cfg.lookup.base_url.clone(),
        cfg.lookup.timeout_secs,
    )?;
    info!(source = lookup.name(), "Product lookup ready");

    let admin_secret = cfg.admin_secret()?;

    // -- Restore or create cleanup history -------------------------------

    let history = match storage::load_history(cfg.retention.history_file.as_deref())? {
        Some(h) => {
            info!(entries = h.len(), "Resumed cleanup history");
            h.with_capacity(cfg.retention.history_capacity)
        }
        None => CleanupHistory::new(cfg.retention.history_capacity),
    };

    let state: AppState = Arc::new(AppContext {
        store,
        analyzer: Arc::new(analyzer),
        lookup: Arc::new(lookup),
        clustering: cfg.clustering.clone(),
        retention: cfg.retention.clone(),
        admin_secret,
        storage_limit_mb: cfg.storage.storage_limit_mb,
        max_image_bytes: cfg.receipt.max_image_bytes,
        history: RwLock::new(history),
    });

    // -- Scheduled cleanup -----------------------------------------------

    if let Some(hours) = cfg.retention.auto_cleanup_interval_hours {
        let state = state.clone();
        tokio::spawn(async move { run_scheduler(state, hours).await });
    }

    // -- Serve -----------------------------------------------------------

    info!("Serving API. Press Ctrl+C to stop.");
    api::serve(state, &cfg.server.host, cfg.server.port, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received.");
    })
    .await?;

    info!("PRICEWATCH shut down cleanly.");
    Ok(())
}

/// Run a scheduled cleanup every `hours` until Ctrl+C.
async fn run_scheduler(state: AppState, hours: u64) {
    let period = Duration::from_secs(hours.max(1) * 3600);
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; skip it so startup does not delete.
    interval.tick().await;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_hours = hours, "Scheduled cleanup enabled");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let days = state.retention.retention_days;
                match admin::run_cleanup(&state, days, CleanupKind::Scheduled).await {
                    Ok(stats) => info!(deleted = stats.deleted_count, retention_days = days, "Scheduled cleanup done"),
                    Err(e) => error!(error = %e, "Scheduled cleanup failed, retrying next interval"),
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

/// Initialise tracing with env-filter and optional JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pricewatch=info"));

    let json_logging = std::env::var("PRICEWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
