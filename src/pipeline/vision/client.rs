//! HTTP client for the hosted generative-vision endpoint.
//!
//! The wire shape is the `generativelanguage.googleapis.com` contract:
//! a `contents`/`parts` request with inline base64 images, the model
//! name in the URL path, and a `candidates` reply whose inner parts
//! carry the generated text. The [`GenerativeClient`] trait keeps the
//! transport swappable; tests use [`MockGenerativeClient`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;

use super::VisionError;
use crate::config;

const ERROR_BODY_PREVIEW: usize = 300;

// ──────────────────────────────────────────────
// Wire types
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Single-turn user request with the given parts.
    pub fn user_turn(parts: Vec<Part>, json_reply: bool) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: json_reply.then(|| "application/json".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Inline JPEG image payload, base64 encoded.
    pub fn jpeg(image_bytes: &[u8]) -> Self {
        Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/jpeg".to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(image_bytes),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

// ──────────────────────────────────────────────
// GenerativeClient
// ──────────────────────────────────────────────

/// Transport abstraction over the generative endpoint (allows mocking).
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// One generation attempt against a single model. Returns the raw
    /// response body on HTTP success.
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, VisionError>;

    /// Model names usable for generation, in the provider's order.
    async fn list_models(&self) -> Result<Vec<String>, VisionError>;
}

/// Production client for the hosted endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(
            api_key,
            config::DEFAULT_BASE_URL,
            config::DEFAULT_ATTEMPT_TIMEOUT_SECS,
        )
    }

    /// Client with an explicit endpoint and per-attempt timeout. The
    /// timeout bounds each model attempt so one unresponsive model name
    /// cannot stall the whole fallback ladder.
    pub fn with_options(api_key: impl Into<String>, base_url: &str, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout_secs,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> VisionError {
        if err.is_timeout() {
            VisionError::Transport(format!(
                "request timed out after {}s",
                self.timeout_secs
            ))
        } else if err.is_connect() {
            VisionError::Transport(format!("cannot reach {}", self.base_url))
        } else {
            VisionError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, VisionError> {
        let model = normalize_model_name(model);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(VisionError::Api {
                model: model.to_string(),
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_PREVIEW),
            });
        }

        Ok(body)
    }

    async fn list_models(&self) -> Result<Vec<String>, VisionError> {
        let url = format!("{}/v1beta/models?key={}", self.base_url, self.api_key);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(VisionError::Api {
                model: "(listing)".to_string(),
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_PREVIEW),
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| VisionError::Transport(format!("model listing unparsable: {e}")))?;

        let mut discovered = Vec::new();
        for model in parsed
            .get("models")
            .and_then(|m| m.as_array())
            .map(|a| a.as_slice())
            .unwrap_or_default()
        {
            let supports_generate = model
                .get("supportedGenerationMethods")
                .and_then(|m| m.as_array())
                .is_some_and(|methods| {
                    methods
                        .iter()
                        .filter_map(|v| v.as_str())
                        .any(|m| m.eq_ignore_ascii_case("generateContent"))
                });

            let Some(name) = model.get("name").and_then(|n| n.as_str()) else {
                continue;
            };

            let normalized = normalize_model_name(name);
            // Keep only the fast tier; large models are too slow for an
            // interactive scan.
            if supports_generate && normalized.to_ascii_lowercase().contains("flash") {
                discovered.push(normalized.to_string());
            }
        }

        Ok(discovered)
    }
}

/// Strip the provider's `models/` resource prefix.
pub(crate) fn normalize_model_name(model: &str) -> &str {
    model
        .trim()
        .strip_prefix("models/")
        .unwrap_or_else(|| model.trim())
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

// ──────────────────────────────────────────────
// MockGenerativeClient (testing)
// ──────────────────────────────────────────────

/// Scripted client for tests: a fixed reply body, a set of models that
/// fail, and a recorded attempt log.
pub struct MockGenerativeClient {
    response: String,
    failing_models: Vec<String>,
    listed_models: Vec<String>,
    listing_fails: bool,
    attempts: std::sync::Mutex<Vec<String>>,
}

impl MockGenerativeClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            failing_models: Vec::new(),
            listed_models: Vec::new(),
            listing_fails: false,
            attempts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Wrap a raw model reply into the `candidates`/`parts` envelope.
    pub fn enveloped(inner_text: &str) -> Self {
        let body = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": inner_text }] } }]
        });
        Self::new(&body.to_string())
    }

    pub fn failing_for(mut self, model: &str) -> Self {
        self.failing_models.push(model.to_string());
        self
    }

    pub fn with_listed_models(mut self, models: &[&str]) -> Self {
        self.listed_models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_failed_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Models attempted so far, in order.
    pub fn attempted_models(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn generate(
        &self,
        model: &str,
        _request: &GenerateContentRequest,
    ) -> Result<String, VisionError> {
        self.attempts.lock().unwrap().push(model.to_string());
        if self.failing_models.iter().any(|m| m == model) {
            return Err(VisionError::Api {
                model: model.to_string(),
                status: 503,
                body: "model unavailable".to_string(),
            });
        }
        Ok(self.response.clone())
    }

    async fn list_models(&self) -> Result<Vec<String>, VisionError> {
        if self.listing_fails {
            return Err(VisionError::Transport("listing unreachable".to_string()));
        }
        Ok(self.listed_models.clone())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
