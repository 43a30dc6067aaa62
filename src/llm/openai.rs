//! OpenAI Chat Completions receipt analyzer.
//!
//! Sends receipt photos (as base64 data URLs) or receipt text to the
//! Chat Completions API and runs the answer through `receipt::parse_items`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::receipt::{self, IMAGE_INSTRUCTION, SYSTEM_PROMPT};
use super::ReceiptAnalyzer;
use crate::types::{PriceError, ReceiptItem};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.1;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

const SERVICE: &str = "openai";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    /// Plain string, or an array of content parts for vision input.
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        max_tokens: Option<u32>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http,
            api_url: OPENAI_API_URL.to_string(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    fn build_request(&self, user_content: Value) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: Value::String(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
        }
    }

    /// Vision content parts: the instruction plus an inline data URL.
    fn image_content(image: &[u8], mime_type: &str) -> Value {
        let data_url = format!("data:{mime_type};base64,{}", STANDARD.encode(image));
        json!([
            { "type": "text", "text": IMAGE_INSTRUCTION },
            { "type": "image_url", "image_url": { "url": data_url } }
        ])
    }

    /// Call the API with retries on 429/5xx and return the answer text.
    async fn call_api(&self, request: &ChatRequest) -> Result<String, PriceError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self.http
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response.json().await.map_err(|e| {
                            PriceError::upstream(SERVICE, format!("Failed to parse response: {e}"))
                        })?;

                        let tokens = body.usage.map(|u| u.total_tokens).unwrap_or(0);
                        debug!(model = %self.model, tokens, "OpenAI call complete");

                        return body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message)
                            .and_then(|m| m.content)
                            .filter(|text| !text.trim().is_empty())
                            .ok_or_else(|| PriceError::upstream(SERVICE, "No response from model"));
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, "Retryable OpenAI error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    return Err(PriceError::upstream(
                        SERVICE,
                        format!("API error {status}: {error_text}"),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "OpenAI request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(PriceError::upstream(
            SERVICE,
            format!(
                "failed after {MAX_RETRIES} retries: {}",
                last_error.unwrap_or_default()
            ),
        ))
    }

    async fn extract(&self, request: ChatRequest) -> Result<Vec<ReceiptItem>, PriceError> {
        let content = self.call_api(&request).await?;
        let items = receipt::parse_items(&content).map_err(|e| {
            warn!(error = %e, "Model answer failed receipt validation");
            e
        })?;
        info!(items = items.len(), model = %self.model, "Receipt analysis complete");
        Ok(items)
    }
}

#[async_trait]
impl ReceiptAnalyzer for OpenAiClient {
    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> Result<Vec<ReceiptItem>, PriceError> {
        info!(bytes = image.len(), mime_type, "Analyzing receipt image");
        let request = self.build_request(Self::image_content(image, mime_type));
        self.extract(request).await
    }

    async fn analyze_text(&self, text: &str) -> Result<Vec<ReceiptItem>, PriceError> {
        info!(chars = text.len(), "Analyzing receipt text");
        let request = self.build_request(Value::String(receipt::text_instruction(text)));
        self.extract(request).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
