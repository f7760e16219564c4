//! Vision extraction orchestration.
//!
//! Owns the model-fallback ladder (preferred override, hardcoded flash
//! ladder, then dynamically discovered models) and the concurrency
//! throttle bounding in-flight calls to the hosted collaborator. Four
//! operations share the plumbing:
//!
//! - [`extract_fields`](VisionExtractor::extract_fields): structured
//!   field extraction, mandatory (missing credentials are a hard error),
//! - [`extract_text`](VisionExtractor::extract_text): plain label-text
//!   reading, mandatory,
//! - [`refine`](VisionExtractor::refine): best-effort gap filling over a
//!   baseline extraction, never fails except for configuration,
//! - [`classify_image`](VisionExtractor::classify_image): degraded
//!   image-only classification, swallows every failure.
//!
//! All futures are cancel-safe: dropping one aborts the in-flight HTTP
//! call and releases the throttle permit.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Semaphore;

use super::client::{GeminiClient, GenerateContentRequest, GenerativeClient, Part};
use super::parser;
use super::prompt;
use super::types::{VisionExtraction, VisionFieldConfidence, VisionFields};
use super::VisionError;
use crate::config::{VisionConfig, FALLBACK_MODELS, MAX_IMAGES_PER_REQUEST};
use crate::models::{
    days_until, today, ConfidenceLevel, DetectedItem, FieldConfidence, ScanExtraction,
    GENERAL_CATEGORY, MAX_PRODUCT_CANDIDATES, UNKNOWN_PRODUCT,
};
use crate::pipeline::extraction::classifier::ProductGuess;
use crate::pipeline::extraction::{dates, duration, shelf_life};

pub struct VisionExtractor {
    client: Arc<dyn GenerativeClient>,
    config: VisionConfig,
    throttle: Arc<Semaphore>,
}

impl VisionExtractor {
    /// Build an extractor around any transport. The throttle is owned by
    /// this instance; share the extractor (not the config) to share the
    /// bound.
    pub fn new(client: Arc<dyn GenerativeClient>, config: VisionConfig) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        Self {
            client,
            config,
            throttle: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Production extractor configured from the environment.
    pub fn from_env() -> Self {
        let config = VisionConfig::from_env();
        let client = GeminiClient::with_options(
            config.api_key.clone().unwrap_or_default(),
            &config.base_url,
            config.attempt_timeout_secs,
        );
        Self::new(Arc::new(client), config)
    }

    // ──────────────────────────────────────────────
    // Operations
    // ──────────────────────────────────────────────

    /// Structured field extraction over label images.
    ///
    /// `Ok(None)` when disabled or called without images; a missing API
    /// key is a configuration error because the caller explicitly asked
    /// for the AI path.
    pub async fn extract_fields(
        &self,
        images: &[Vec<u8>],
    ) -> Result<Option<VisionExtraction>, VisionError> {
        self.extract_fields_as_of(images, today()).await
    }

    pub async fn extract_fields_as_of(
        &self,
        images: &[Vec<u8>],
        today: NaiveDate,
    ) -> Result<Option<VisionExtraction>, VisionError> {
        if !self.config.enabled || images.is_empty() {
            return Ok(None);
        }
        self.require_api_key()?;

        let request = self.build_request(prompt::FIELD_EXTRACTION_PROMPT, images, true);
        let Some(body) = self.generate_with_fallback(&request, true).await? else {
            return Ok(None);
        };
        let Some(reply) = parser::extract_reply_text(&body) else {
            return Ok(None);
        };
        let Some(fields) = parser::parse_vision_fields(parser::strip_code_fence(&reply)) else {
            return Ok(None);
        };

        Ok(Some(self.assemble_extraction(&fields, today)))
    }

    /// Best-effort refinement of a baseline extraction. Transient and
    /// malformed-reply failures fold into `Ok(None)`; configuration
    /// errors still propagate.
    pub async fn refine(
        &self,
        raw_text: &str,
        images: &[Vec<u8>],
        baseline: &ScanExtraction,
    ) -> Result<Option<ScanExtraction>, VisionError> {
        self.refine_as_of(raw_text, images, baseline, today()).await
    }

    pub async fn refine_as_of(
        &self,
        raw_text: &str,
        images: &[Vec<u8>],
        baseline: &ScanExtraction,
        today: NaiveDate,
    ) -> Result<Option<ScanExtraction>, VisionError> {
        if !self.config.enabled || images.is_empty() {
            return Ok(None);
        }
        self.require_api_key()?;

        let request =
            self.build_request(&prompt::build_refine_prompt(raw_text, baseline), images, true);
        let Some(body) = self.generate_with_fallback(&request, false).await? else {
            return Ok(None);
        };
        let Some(reply) = parser::extract_reply_text(&body) else {
            return Ok(None);
        };
        let Some(fields) = parser::parse_vision_fields(parser::strip_code_fence(&reply)) else {
            return Ok(None);
        };

        Ok(Some(self.refine_over_baseline(&fields, baseline, today)))
    }

    /// Read the raw label text out of the images. Mandatory: image-only
    /// scans have no other text source.
    pub async fn extract_text(&self, images: &[Vec<u8>]) -> Result<Option<String>, VisionError> {
        if !self.config.enabled || images.is_empty() {
            return Ok(None);
        }
        self.require_api_key()?;

        let request = self.build_request(prompt::TEXT_ONLY_PROMPT, images, false);
        let Some(body) = self.generate_with_fallback(&request, true).await? else {
            return Ok(None);
        };
        Ok(parser::extract_reply_text(&body))
    }

    /// Image-only classification for the degraded path. Swallows every
    /// failure, including missing credentials.
    pub async fn classify_image(&self, image: &[u8]) -> Option<ProductGuess> {
        if !self.config.enabled || image.is_empty() {
            return None;
        }
        self.config.api_key.as_ref().filter(|k| !k.trim().is_empty())?;

        let request = self.build_request(prompt::CLASSIFY_PROMPT, &[image.to_vec()], true);
        let body = self.generate_with_fallback(&request, false).await.ok()??;
        let reply = parser::extract_reply_text(&body)?;
        let doc: serde_json::Value =
            serde_json::from_str(parser::strip_code_fence(&reply)).ok()?;

        let product_name = doc.get("productName")?.as_str()?.trim().to_string();
        if product_name.is_empty() || product_name == UNKNOWN_PRODUCT {
            return None;
        }
        let category_name = doc
            .get("categoryName")
            .and_then(|c| c.as_str())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(GENERAL_CATEGORY)
            .to_string();

        Some(ProductGuess {
            product_name,
            category_name,
        })
    }

    // ──────────────────────────────────────────────
    // Assembly
    // ──────────────────────────────────────────────

    fn assemble_extraction(&self, fields: &VisionFields, today: NaiveDate) -> VisionExtraction {
        let detected_names =
            parser::normalize_detected_names(&fields.detected_items, fields.product_name.as_deref());

        let mut product_name = fields
            .product_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_PRODUCT)
            .to_string();
        if product_name == UNKNOWN_PRODUCT {
            if let Some(first) = detected_names.first() {
                product_name = first.clone();
            }
        }

        let mut category_name = fields
            .category_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(GENERAL_CATEGORY)
            .to_string();
        if category_name == GENERAL_CATEGORY && !detected_names.is_empty() {
            category_name = parser::infer_category_from_items(&detected_names).to_string();
        }

        let manufacturing = fields.manufacturing_date.as_deref().and_then(dates::parse);

        let mut resolved_expiry = fields.expiry_date.as_deref().and_then(dates::parse);
        if resolved_expiry.is_none() {
            resolved_expiry = derive_from_structured_best_before(
                manufacturing,
                fields.best_before_value,
                fields.best_before_unit.as_deref(),
                fields.expiry_date.as_deref(),
                today,
            );
        }
        if resolved_expiry.is_none() {
            if let Some(text) = &fields.best_before_text {
                resolved_expiry = derive_from_best_before_text(text, manufacturing, today);
            }
        }

        let expiry_date = resolved_expiry.unwrap_or_else(|| {
            shelf_life::fallback_expiry_as_of(&category_name, Some(&product_name), today)
        });

        let is_low_confidence = fields
            .confidence
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("low"))
            || resolved_expiry.is_none();

        let (confidence_score, field_confidence, needs_human_review) = compute_vision_confidence(
            fields.confidence.as_deref(),
            fields.field_confidence.as_ref(),
            resolved_expiry.is_some(),
            product_name != UNKNOWN_PRODUCT,
            detected_names.len(),
        );

        tracing::debug!(
            product = %product_name,
            category = %category_name,
            score = confidence_score,
            items = detected_names.len(),
            "vision extraction assembled"
        );

        let scan = ScanExtraction {
            product_name,
            manufacturing_date: manufacturing,
            expiry_date,
            days_left_to_expire: days_until(expiry_date, today),
            category_name,
            is_low_confidence,
            product_candidates: detected_names,
            confidence_score,
            field_confidence,
            needs_human_review,
        };

        let items = per_item_details(fields, today);
        VisionExtraction { scan, items }
    }

    fn refine_over_baseline(
        &self,
        fields: &VisionFields,
        baseline: &ScanExtraction,
        today: NaiveDate,
    ) -> ScanExtraction {
        let detected_names =
            parser::normalize_detected_names(&fields.detected_items, fields.product_name.as_deref());

        let mut product_name = fields
            .product_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&baseline.product_name)
            .to_string();
        if (product_name.is_empty() || product_name == UNKNOWN_PRODUCT)
            && !detected_names.is_empty()
        {
            product_name = detected_names[0].clone();
        }

        let mut category_name = fields
            .category_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&baseline.category_name)
            .to_string();
        if (category_name.is_empty() || category_name == GENERAL_CATEGORY)
            && !detected_names.is_empty()
        {
            category_name = parser::infer_category_from_items(&detected_names).to_string();
        }

        let manufacturing = fields
            .manufacturing_date
            .as_deref()
            .and_then(dates::parse)
            .or(baseline.manufacturing_date);
        let expiry_date = fields
            .expiry_date
            .as_deref()
            .and_then(dates::parse)
            .unwrap_or(baseline.expiry_date);

        let is_low_confidence = fields
            .confidence
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("low"))
            || (product_name == UNKNOWN_PRODUCT && category_name == GENERAL_CATEGORY);

        // The baseline always supplies an expiry, so the refined result
        // scores with expiry evidence present.
        let (confidence_score, field_confidence, needs_human_review) = compute_vision_confidence(
            fields.confidence.as_deref(),
            fields.field_confidence.as_ref(),
            true,
            product_name != UNKNOWN_PRODUCT,
            detected_names.len(),
        );

        let product_candidates = merge_candidates(&baseline.product_candidates, &detected_names);

        ScanExtraction {
            product_name,
            manufacturing_date: manufacturing,
            expiry_date,
            days_left_to_expire: days_until(expiry_date, today),
            category_name,
            is_low_confidence,
            product_candidates,
            confidence_score,
            field_confidence,
            needs_human_review,
        }
    }

    // ──────────────────────────────────────────────
    // Plumbing
    // ──────────────────────────────────────────────

    fn require_api_key(&self) -> Result<(), VisionError> {
        match &self.config.api_key {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(VisionError::MissingApiKey),
        }
    }

    fn build_request(
        &self,
        prompt_text: &str,
        images: &[Vec<u8>],
        json_reply: bool,
    ) -> GenerateContentRequest {
        let mut parts = vec![Part::text(prompt_text)];
        for image in images.iter().take(MAX_IMAGES_PER_REQUEST) {
            parts.push(Part::jpeg(image));
        }
        GenerateContentRequest::user_turn(parts, json_reply)
    }

    /// The model ladder: preferred override, hardcoded flash models,
    /// then whatever discovery adds. Discovery failure just means no
    /// additional models.
    async fn candidate_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        if let Some(preferred) = &self.config.preferred_model {
            models.push(preferred.clone());
        }
        models.extend(FALLBACK_MODELS.iter().map(|m| m.to_string()));

        match self.client.list_models().await {
            Ok(discovered) => models.extend(discovered),
            Err(error) => {
                tracing::debug!(%error, "model discovery failed; using static ladder only");
            }
        }

        let mut seen: Vec<String> = Vec::new();
        models.retain(|m| {
            let lower = m.to_ascii_lowercase();
            if seen.contains(&lower) {
                false
            } else {
                seen.push(lower);
                true
            }
        });
        models
    }

    /// Try each candidate model until one answers. On exhaustion,
    /// mandatory calls raise [`VisionError::AllModelsFailed`];
    /// best-effort calls resolve to `Ok(None)`.
    async fn generate_with_fallback(
        &self,
        request: &GenerateContentRequest,
        mandatory: bool,
    ) -> Result<Option<String>, VisionError> {
        let _permit = self
            .throttle
            .acquire()
            .await
            .expect("vision throttle semaphore closed");

        let models = self.candidate_models().await;
        let mut attempts: Vec<String> = Vec::new();

        for model in &models {
            let start = std::time::Instant::now();
            match self.client.generate(model, request).await {
                Ok(body) => {
                    tracing::debug!(
                        model = %model,
                        elapsed_ms = %start.elapsed().as_millis(),
                        "generation succeeded"
                    );
                    return Ok(Some(body));
                }
                Err(error) => {
                    tracing::warn!(model = %model, %error, "generation attempt failed");
                    attempts.push(format!("{model}: {error}"));
                }
            }
        }

        if mandatory {
            Err(VisionError::AllModelsFailed {
                attempts: attempts.join(" | "),
            })
        } else {
            Ok(None)
        }
    }
}

// ──────────────────────────────────────────────
// Expiry derivation helpers
// ──────────────────────────────────────────────

/// Structured `bestBeforeValue`/`bestBeforeUnit` fields, with a rescue
/// pass over the expiry text for models that write the phrase into the
/// date field.
fn derive_from_structured_best_before(
    manufacturing: Option<NaiveDate>,
    value: Option<i64>,
    unit: Option<&str>,
    expiry_text: Option<&str>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let anchor = manufacturing.unwrap_or(today);

    let value = value.filter(|v| *v > 0);
    let unit = unit.map(str::trim).filter(|u| !u.is_empty());
    if let (Some(value), Some(unit)) = (value, unit) {
        return duration::add_duration(anchor, value as f64, unit);
    }

    expiry_text.and_then(|text| duration::derive_from_duration(text, anchor))
}

/// Free-text best-before clause: end-of-month first, then a bare
/// duration.
fn derive_from_best_before_text(
    text: &str,
    manufacturing: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    duration::derive_from_end_of_month(text)
        .or_else(|| duration::derive_bare_duration(text, manufacturing.unwrap_or(today)))
}

/// Per-item details for multi-product scans. Items without a parseable
/// expiry get their own category fallback and are flagged for review.
fn per_item_details(fields: &VisionFields, today: NaiveDate) -> Option<Vec<DetectedItem>> {
    let mut results = Vec::new();
    for item in &fields.detected_items {
        let Some(name) = item
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| n.len() >= 2)
        else {
            continue;
        };

        let category = item
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(GENERAL_CATEGORY)
            .to_string();

        let parsed = item.expiry_date.as_deref().and_then(dates::parse);
        let expiry =
            parsed.unwrap_or_else(|| shelf_life::fallback_expiry_as_of(&category, Some(name), today));

        results.push(DetectedItem {
            product_name: name.to_string(),
            category_name: category,
            expiry_date: expiry,
            days_left_to_expire: days_until(expiry, today),
            confidence_score: 50,
            needs_human_review: parsed.is_none(),
        });
    }
    (!results.is_empty()).then_some(results)
}

// ──────────────────────────────────────────────
// Confidence
// ──────────────────────────────────────────────

/// Score a vision extraction. The model's self-reported confidence is
/// the base; expiry resolution, a known name, and detected items add on
/// top. Per-field ranks prefer the model's own `fieldConfidence` block,
/// falling back to presence-based defaults.
fn compute_vision_confidence(
    confidence: Option<&str>,
    field_confidence: Option<&VisionFieldConfidence>,
    has_expiry: bool,
    has_name: bool,
    item_count: usize,
) -> (u8, FieldConfidence, bool) {
    let mut score: i32 = match confidence.map(str::to_ascii_lowercase).as_deref() {
        Some("high") => 40,
        Some("medium") => 25,
        _ => 10,
    };

    if has_expiry {
        score += 30;
    } else {
        score -= 10;
    }
    if has_name {
        score += 20;
    }
    if item_count > 0 {
        score += 10;
    }
    let score = score.clamp(0, 100) as u8;

    let reported = |field: fn(&VisionFieldConfidence) -> Option<&str>| {
        field_confidence
            .and_then(field)
            .and_then(ConfidenceLevel::parse_lenient)
    };

    let name_conf = reported(|f| f.name.as_deref()).unwrap_or(if has_name {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    });
    let expiry_conf = reported(|f| f.expiry.as_deref()).unwrap_or(if has_expiry {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    });
    let category_conf = reported(|f| f.category.as_deref()).unwrap_or(ConfidenceLevel::Medium);

    let field_confidence = FieldConfidence::new(name_conf, expiry_conf, category_conf);
    let needs_review = field_confidence.any_low() || score < 50;

    (score, field_confidence, needs_review)
}

/// Union of baseline and freshly detected candidates, deduped
/// case-insensitively, capped.
fn merge_candidates(baseline: &[String], detected: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for candidate in baseline.iter().chain(detected) {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if merged.iter().any(|m| m.eq_ignore_ascii_case(trimmed)) {
            continue;
        }
        merged.push(trimmed.to_string());
    }
    merged.truncate(MAX_PRODUCT_CANDIDATES);
    merged
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::vision::client::MockGenerativeClient;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config_with_key() -> VisionConfig {
        VisionConfig::default().with_api_key("test-key")
    }

    fn extractor_with_reply(inner_json: &str) -> VisionExtractor {
        VisionExtractor::new(
            Arc::new(MockGenerativeClient::enveloped(inner_json)),
            config_with_key(),
        )
    }

    const FULL_REPLY: &str = r#"{
        "productName": "Amul Butter",
        "detectedItems": [
            {"name": "Amul Butter", "category": "Dairy", "expiryDate": "2026-09-01"}
        ],
        "categoryName": "Dairy",
        "manufacturingDate": "2026-03-01",
        "expiryDate": "2026-09-01",
        "bestBeforeText": null,
        "bestBeforeValue": 0,
        "bestBeforeUnit": null,
        "confidence": "high",
        "fieldConfidence": {"name": "high", "expiry": "high", "category": "high"}
    }"#;

    #[tokio::test]
    async fn extract_fields_happy_path() {
        let extractor = extractor_with_reply(FULL_REPLY);
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.scan.product_name, "Amul Butter");
        assert_eq!(result.scan.category_name, "Dairy");
        assert_eq!(result.scan.manufacturing_date, Some(date(2026, 3, 1)));
        assert_eq!(result.scan.expiry_date, date(2026, 9, 1));
        assert_eq!(result.scan.days_left_to_expire, 92);
        assert!(!result.scan.needs_human_review);
        assert_eq!(result.items.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_and_imageless_calls_resolve_to_none() {
        let disabled = VisionExtractor::new(
            Arc::new(MockGenerativeClient::enveloped(FULL_REPLY)),
            VisionConfig::disabled().with_api_key("k"),
        );
        assert!(disabled
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .is_none());

        let enabled = extractor_with_reply(FULL_REPLY);
        assert!(enabled
            .extract_fields_as_of(&[], fixed_today())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_hard_error() {
        let extractor = VisionExtractor::new(
            Arc::new(MockGenerativeClient::enveloped(FULL_REPLY)),
            VisionConfig::default(),
        );
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await;
        assert!(matches!(result, Err(VisionError::MissingApiKey)));
    }

    #[tokio::test]
    async fn preferred_model_tried_first_then_ladder() {
        let client = Arc::new(
            MockGenerativeClient::enveloped(FULL_REPLY)
                .failing_for("custom-flash")
                .failing_for("gemini-2.5-flash"),
        );
        let extractor = VisionExtractor::new(
            client.clone(),
            config_with_key().with_preferred_model("custom-flash"),
        );

        extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            client.attempted_models(),
            vec!["custom-flash", "gemini-2.5-flash", "gemini-2.0-flash"]
        );
    }

    #[tokio::test]
    async fn discovered_models_extend_the_ladder() {
        let client = Arc::new(
            MockGenerativeClient::enveloped(FULL_REPLY)
                .with_listed_models(&["gemini-9.9-flash", "gemini-2.5-flash"])
                .failing_for("gemini-2.5-flash")
                .failing_for("gemini-2.0-flash")
                .failing_for("gemini-1.5-flash"),
        );
        let extractor = VisionExtractor::new(client.clone(), config_with_key());

        extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();

        // Discovery appends after the ladder; the duplicate is dropped.
        assert_eq!(
            client.attempted_models(),
            vec![
                "gemini-2.5-flash",
                "gemini-2.0-flash",
                "gemini-1.5-flash",
                "gemini-9.9-flash"
            ]
        );
    }

    #[tokio::test]
    async fn discovery_failure_degrades_to_static_ladder() {
        let client =
            Arc::new(MockGenerativeClient::enveloped(FULL_REPLY).with_failed_listing());
        let extractor = VisionExtractor::new(client.clone(), config_with_key());

        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap();
        assert!(result.is_some());
        assert_eq!(client.attempted_models(), vec!["gemini-2.5-flash"]);
    }

    #[tokio::test]
    async fn all_models_failing_errors_on_mandatory_call() {
        let client = Arc::new(
            MockGenerativeClient::enveloped(FULL_REPLY)
                .failing_for("gemini-2.5-flash")
                .failing_for("gemini-2.0-flash")
                .failing_for("gemini-1.5-flash"),
        );
        let extractor = VisionExtractor::new(client, config_with_key());

        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await;
        assert!(matches!(result, Err(VisionError::AllModelsFailed { .. })));
    }

    #[tokio::test]
    async fn malformed_reply_is_no_answer() {
        let extractor = extractor_with_reply("this is not json at all");
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn fenced_reply_still_parses() {
        let fenced = format!("```json\n{FULL_REPLY}\n```");
        let extractor = extractor_with_reply(&fenced);
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.scan.product_name, "Amul Butter");
    }

    #[tokio::test]
    async fn unknown_name_adopts_first_detected_item() {
        let reply = r#"{
            "productName": "Unknown Product",
            "detectedItems": [
                {"name": "Tomato", "category": "Vegetables", "expiryDate": null},
                {"name": "Carrot", "category": "Vegetables", "expiryDate": null}
            ],
            "categoryName": "General",
            "confidence": "medium"
        }"#;
        let extractor = extractor_with_reply(reply);
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.scan.product_name, "Tomato");
        assert_eq!(result.scan.category_name, "Vegetables");
        let items = result.items.unwrap();
        assert_eq!(items.len(), 2);
        // No expiry on the label: per-item category fallback applies.
        assert_eq!(items[0].expiry_date, fixed_today() + chrono::Days::new(7));
        assert!(items[0].needs_human_review);
    }

    #[tokio::test]
    async fn structured_best_before_fills_missing_expiry() {
        let reply = r#"{
            "productName": "Trail Mix",
            "categoryName": "Snacks",
            "manufacturingDate": "2026-01-15",
            "expiryDate": null,
            "bestBeforeValue": 6,
            "bestBeforeUnit": "months",
            "confidence": "medium"
        }"#;
        let extractor = extractor_with_reply(reply);
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.scan.expiry_date, date(2026, 7, 15));
    }

    #[tokio::test]
    async fn best_before_text_rescues_missing_structured_fields() {
        let reply = r#"{
            "productName": "Oat Cookies",
            "categoryName": "Snacks",
            "bestBeforeText": "best before end of Aug 2026",
            "confidence": "medium"
        }"#;
        let extractor = extractor_with_reply(reply);
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.scan.expiry_date, date(2026, 8, 31));
    }

    #[tokio::test]
    async fn no_evidence_uses_category_fallback_and_low_confidence() {
        let reply = r#"{
            "productName": "Paneer",
            "categoryName": "Dairy",
            "confidence": "low"
        }"#;
        let extractor = extractor_with_reply(reply);
        let result = extractor
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap();

        // Dairy fallback: today + 14 days.
        assert_eq!(result.scan.expiry_date, fixed_today() + chrono::Days::new(14));
        assert!(result.scan.is_low_confidence);
        assert!(result.scan.needs_human_review);
    }

    #[tokio::test]
    async fn refine_fills_gaps_from_baseline() {
        let reply = r#"{
            "productName": "Amul Butter 500g",
            "expiryDate": "2026-10-01",
            "confidence": "high",
            "fieldConfidence": {"name": "high", "expiry": "high", "category": "high"}
        }"#;
        let extractor = extractor_with_reply(reply);

        let baseline = extractor_with_reply(FULL_REPLY)
            .extract_fields_as_of(&[b"img".to_vec()], fixed_today())
            .await
            .unwrap()
            .unwrap()
            .scan;

        let refined = extractor
            .refine_as_of("AMUL BUTTER", &[b"img".to_vec()], &baseline, fixed_today())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refined.product_name, "Amul Butter 500g");
        // Category missing in the reply: baseline's value carries over.
        assert_eq!(refined.category_name, "Dairy");
        assert_eq!(refined.manufacturing_date, baseline.manufacturing_date);
        assert_eq!(refined.expiry_date, date(2026, 10, 1));
        // Baseline candidates survive the merge.
        assert!(refined
            .product_candidates
            .iter()
            .any(|c| c == "Amul Butter"));
    }

    #[tokio::test]
    async fn refine_swallows_transport_failure() {
        let client = Arc::new(
            MockGenerativeClient::enveloped(FULL_REPLY)
                .failing_for("gemini-2.5-flash")
                .failing_for("gemini-2.0-flash")
                .failing_for("gemini-1.5-flash"),
        );
        let extractor = VisionExtractor::new(client, config_with_key());
        let baseline = sample_baseline();

        let result = extractor
            .refine_as_of("text", &[b"img".to_vec()], &baseline, fixed_today())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn extract_text_returns_label_lines() {
        let extractor = VisionExtractor::new(
            Arc::new(MockGenerativeClient::enveloped("MILK 1L\nEXP 01/07/2026")),
            config_with_key(),
        );
        let text = extractor
            .extract_text(&[b"img".to_vec()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "MILK 1L\nEXP 01/07/2026");
    }

    #[tokio::test]
    async fn classify_image_parses_reply() {
        let extractor =
            extractor_with_reply(r#"{"productName": "Banana", "categoryName": "Fruits"}"#);
        let guess = extractor.classify_image(b"img").await.unwrap();
        assert_eq!(guess.product_name, "Banana");
        assert_eq!(guess.category_name, "Fruits");
    }

    #[tokio::test]
    async fn classify_image_rejects_unknown_and_swallows_missing_key() {
        let unknown = extractor_with_reply(
            r#"{"productName": "Unknown Product", "categoryName": "General"}"#,
        );
        assert!(unknown.classify_image(b"img").await.is_none());

        let keyless = VisionExtractor::new(
            Arc::new(MockGenerativeClient::enveloped(FULL_REPLY)),
            VisionConfig::default(),
        );
        assert!(keyless.classify_image(b"img").await.is_none());
    }

    #[test]
    fn vision_confidence_scoring() {
        // high + expiry + name + items: 40 + 30 + 20 + 10 = 100.
        let (score, conf, needs) = compute_vision_confidence(Some("high"), None, true, true, 2);
        assert_eq!(score, 100);
        assert_eq!(conf.name, ConfidenceLevel::Medium);
        assert!(!needs);

        // low with nothing resolved: 10 - 10 = 0.
        let (score, conf, needs) = compute_vision_confidence(Some("low"), None, false, false, 0);
        assert_eq!(score, 0);
        assert!(conf.expiry.is_low());
        assert!(needs);

        // Reported per-field block wins over presence heuristics.
        let reported = VisionFieldConfidence {
            name: Some("low".to_string()),
            expiry: Some("high".to_string()),
            category: Some("medium".to_string()),
        };
        let (_, conf, needs) =
            compute_vision_confidence(Some("medium"), Some(&reported), true, true, 0);
        assert_eq!(conf.name, ConfidenceLevel::Low);
        assert_eq!(conf.expiry, ConfidenceLevel::High);
        assert!(needs);
    }

    #[test]
    fn candidate_merge_dedupes_and_caps() {
        let baseline: Vec<String> = vec!["Milk".into(), "Bread".into()];
        let detected: Vec<String> = vec!["milk".into(), "Cheese".into()];
        assert_eq!(merge_candidates(&baseline, &detected), vec!["Milk", "Bread", "Cheese"]);

        let many: Vec<String> = (0..20).map(|i| format!("Item {i}")).collect();
        assert_eq!(merge_candidates(&many, &[]).len(), MAX_PRODUCT_CANDIDATES);
    }

    fn sample_baseline() -> ScanExtraction {
        ScanExtraction {
            product_name: "Milk".to_string(),
            manufacturing_date: None,
            expiry_date: date(2026, 7, 1),
            days_left_to_expire: 30,
            category_name: "Dairy".to_string(),
            is_low_confidence: false,
            product_candidates: Vec::new(),
            confidence_score: 70,
            field_confidence: FieldConfidence::new(
                ConfidenceLevel::High,
                ConfidenceLevel::High,
                ConfidenceLevel::High,
            ),
            needs_human_review: false,
        }
    }
}
