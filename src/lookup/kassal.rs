//! Kassal.app product lookup.
//!
//! API: `https://kassal.app/api/v1/products/ean/{ean}`
//! Auth: Bearer token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::ProductLookup;
use crate::types::{PriceError, ProductInfo, UNKNOWN_PRODUCT_NAME};

pub const KASSAL_BASE_URL: &str = "https://kassal.app/api/v1";

const SERVICE: &str = "kassal";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EanResponse {
    #[serde(default)]
    data: Option<EanData>,
}

#[derive(Debug, Deserialize)]
struct EanData {
    #[serde(default)]
    products: Vec<KassalProduct>,
}

#[derive(Debug, Deserialize)]
struct KassalProduct {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    category: Option<Vec<KassalCategory>>,
}

#[derive(Debug, Deserialize)]
struct KassalCategory {
    #[serde(default)]
    name: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<KassalProduct> for ProductInfo {
    fn from(p: KassalProduct) -> Self {
        let category = p
            .category
            .into_iter()
            .flatten()
            .find_map(|c| present(c.name))
            .or_else(|| present(p.vendor));

        ProductInfo {
            name: present(p.name).unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string()),
            brand: present(p.brand),
            category,
            image_url: present(p.image),
        }
    }
}

/// Map a raw EAN response body to product info.
fn parse_response(body: EanResponse) -> ProductInfo {
    body.data
        .and_then(|d| d.products.into_iter().next())
        .map(ProductInfo::from)
        .unwrap_or_else(ProductInfo::unknown)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KassalClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl KassalClient {
    pub fn new(api_key: String, base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build Kassal HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| KASSAL_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    fn ean_url(&self, barcode: &str) -> String {
        format!(
            "{}/products/ean/{}",
            self.base_url,
            urlencoding::encode(barcode)
        )
    }
}

#[async_trait]
impl ProductLookup for KassalClient {
    async fn lookup(&self, barcode: &str) -> Result<ProductInfo, PriceError> {
        if barcode.trim().is_empty() {
            return Err(PriceError::Validation("barcode is required".into()));
        }

        let response = self.http
            .get(self.ean_url(barcode))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, barcode, "Kassal request failed");
                PriceError::upstream(SERVICE, format!("request error: {e}"))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(barcode, "Kassal has no product for barcode");
            return Ok(ProductInfo::unknown());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, barcode, "Kassal API error");
            return Err(PriceError::upstream(SERVICE, format!("HTTP {status}: {text}")));
        }

        let body: EanResponse = response.json().await.map_err(|e| {
            PriceError::upstream(SERVICE, format!("failed to parse response: {e}"))
        })?;

        let info = parse_response(body);
        debug!(barcode, name = %info.name, "Product resolved");
        Ok(info)
    }

    fn name(&self) -> &str {
        "Kassal"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
