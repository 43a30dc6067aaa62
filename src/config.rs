//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, the admin secret) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::engine::clustering::{ClusterConfig, DEFAULT_FETCH_MULTIPLIER, DEFAULT_LIMIT, DEFAULT_TOLERANCE};
use crate::engine::retention::{self, DEFAULT_HISTORY_CAPACITY, DEFAULT_RETENTION_DAYS};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub storage: StorageConfig,
    pub receipt: ReceiptConfig,
    pub lookup: LookupConfig,
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusteringConfig {
    pub tolerance: Decimal,
    pub default_limit: usize,
    pub max_limit: usize,
    pub fetch_multiplier: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            default_limit: DEFAULT_LIMIT,
            max_limit: 500,
            fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
        }
    }
}

impl ClusteringConfig {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            tolerance: self.tolerance,
            limit: self.default_limit,
            fetch_multiplier: self.fetch_multiplier,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    pub retention_days: u32,
    pub history_capacity: usize,
    /// JSON file the cleanup history is persisted to. In-memory only if unset.
    #[serde(default)]
    pub history_file: Option<String>,
    /// Run a scheduled cleanup in-process on this interval.
    #[serde(default)]
    pub auto_cleanup_interval_hours: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_file: None,
            auto_cleanup_interval_hours: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Advertised storage quota, reported on the admin dashboard.
    #[serde(default = "default_storage_limit_mb")]
    pub storage_limit_mb: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReceiptConfig {
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub max_image_bytes: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub secret_env: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_storage_limit_mb() -> f64 {
    500.0
}

fn default_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.clustering.tolerance.is_sign_negative() && !self.clustering.tolerance.is_zero() {
            anyhow::bail!("clustering.tolerance must be non-negative");
        }
        if self.clustering.default_limit == 0 || self.clustering.max_limit == 0 {
            anyhow::bail!("clustering limits must be at least 1");
        }
        if self.clustering.default_limit > self.clustering.max_limit {
            anyhow::bail!("clustering.default_limit exceeds clustering.max_limit");
        }
        if self.retention.retention_days == 0 {
            anyhow::bail!("retention.retention_days must be at least 1");
        }
        retention::cutoff(Utc::now(), self.retention.retention_days)
            .context("retention.retention_days is too large")?;
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The admin secret guarding `/api/admin/*`.
    pub fn admin_secret(&self) -> Result<SecretString> {
        let value = Self::resolve_env(&self.admin.secret_env)?;
        if value.trim().is_empty() {
            anyhow::bail!("Admin secret in {} is empty", self.admin.secret_env);
        }
        Ok(SecretString::new(value))
    }
}
