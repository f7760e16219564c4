//! Environment-driven configuration for the vision path.
//!
//! The variable names match the deployment this crate slots into:
//! `GEMINI_ENABLED`, `GEMINI_API_KEY`, `GEMINI_MODEL`. Everything has an
//! explicit constructor so tests never touch the process environment.

use std::env;

/// Hosted endpoint for the generative-vision collaborator.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Hardcoded model ladder tried after the preferred override, before any
/// dynamically discovered models.
pub const FALLBACK_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.0-flash", "gemini-1.5-flash"];

/// At most this many images are attached to one generation request.
pub const MAX_IMAGES_PER_REQUEST: usize = 4;

/// Bound on concurrent in-flight calls to the vision collaborator.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;

/// Per-attempt timeout; each model in the ladder gets its own attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`VisionExtractor`](crate::pipeline::vision::VisionExtractor).
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Master switch; when off, every vision operation resolves to "no
    /// answer" instead of erroring.
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Model tried before the hardcoded ladder.
    pub preferred_model: Option<String>,
    pub base_url: String,
    pub attempt_timeout_secs: u64,
    pub max_concurrent_requests: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            preferred_model: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl VisionConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        let enabled = !env::var("GEMINI_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("false"))
            .unwrap_or(false);
        let api_key = env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let preferred_model = env::var("GEMINI_MODEL").ok().filter(|m| !m.trim().is_empty());

        Self {
            enabled,
            api_key,
            preferred_model,
            ..Self::default()
        }
    }

    /// Explicitly disabled configuration (vision path resolves to None).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_standard_limits() {
        let config = VisionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_concurrent_requests, 5);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn disabled_config() {
        assert!(!VisionConfig::disabled().enabled);
    }

    #[test]
    fn builder_sets_key_and_model() {
        let config = VisionConfig::default()
            .with_api_key("k-123")
            .with_preferred_model("gemini-2.5-pro");
        assert_eq!(config.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.preferred_model.as_deref(), Some("gemini-2.5-pro"));
    }

    #[test]
    fn fallback_ladder_order() {
        assert_eq!(FALLBACK_MODELS[0], "gemini-2.5-flash");
        assert_eq!(FALLBACK_MODELS.len(), 3);
    }
}
