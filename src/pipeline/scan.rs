//! Scan orchestration: the entry point other subsystems call.
//!
//! One scan runs the two extraction sources concurrently (they share no
//! data), reconciles their answers, and optionally writes the result to
//! the inventory. The AI text read is mandatory for image scans because
//! there is no other text source; its configuration or availability
//! failure surfaces to the caller instead of being papered over with a
//! low-quality guess.
//!
//! Cancellation: every async operation here is cancel-safe. Dropping the
//! returned future aborts any in-flight vision call and releases the
//! extractor's throttle permit; the local path has no long-running work.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extraction::{shelf_life, LocalTextExtractor};
use super::reconcile;
use super::vision::{VisionError, VisionExtraction, VisionExtractor};
use crate::inventory::{AddBatchRequest, InventoryError, InventoryStore, StoredProduct};
use crate::models::{DetectedItem, ScanExtraction};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("at least one image is required")]
    NoImages,

    #[error("no label text could be read from the images; retry with a clearer photo")]
    NoTextRecognized,

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

// ──────────────────────────────────────────────
// Collaborator seams
// ──────────────────────────────────────────────

/// Reads raw label text out of images. Vision-backed in production; any
/// OCR engine can stand in behind this trait.
#[async_trait]
pub trait TextExtractionSource: Send + Sync {
    async fn extract_text(&self, images: &[Vec<u8>]) -> Result<Option<String>, VisionError>;
}

/// Produces a structured field extraction from images.
#[async_trait]
pub trait FieldExtractionSource: Send + Sync {
    async fn extract_fields(
        &self,
        images: &[Vec<u8>],
    ) -> Result<Option<VisionExtraction>, VisionError>;
}

#[async_trait]
impl TextExtractionSource for VisionExtractor {
    async fn extract_text(&self, images: &[Vec<u8>]) -> Result<Option<String>, VisionError> {
        VisionExtractor::extract_text(self, images).await
    }
}

#[async_trait]
impl FieldExtractionSource for VisionExtractor {
    async fn extract_fields(
        &self,
        images: &[Vec<u8>],
    ) -> Result<Option<VisionExtraction>, VisionError> {
        VisionExtractor::extract_fields(self, images).await
    }
}

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

/// A finished preview: the reconciled extraction, the raw text it came
/// from, and per-item details for multi-product scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPreview {
    pub extracted: ScanExtraction,
    pub raw_text: String,
    pub detected_items: Option<Vec<DetectedItem>>,
}

/// A scan that also wrote to the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub extracted: ScanExtraction,
    pub added: Vec<StoredProduct>,
    pub raw_text: String,
}

// ──────────────────────────────────────────────
// ScanService
// ──────────────────────────────────────────────

pub struct ScanService {
    local: LocalTextExtractor,
    text_source: Arc<dyn TextExtractionSource>,
    field_source: Arc<dyn FieldExtractionSource>,
    inventory: Arc<dyn InventoryStore>,
}

impl ScanService {
    pub fn new(
        local: LocalTextExtractor,
        text_source: Arc<dyn TextExtractionSource>,
        field_source: Arc<dyn FieldExtractionSource>,
        inventory: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            local,
            text_source,
            field_source,
            inventory,
        }
    }

    /// Preview a scan from raw text the caller already has (typed input
    /// or an external OCR pass). Local-only: no network.
    pub fn preview_text(&self, raw_text: &str) -> ScanPreview {
        let parsed = self.local.extract(raw_text, None);
        let extracted = reconcile::merge(None, &parsed);
        let detected_items = reconcile::build_per_item_details(&extracted);
        ScanPreview {
            extracted,
            raw_text: raw_text.to_string(),
            detected_items,
        }
    }

    pub async fn preview_image(&self, image: &[u8]) -> Result<ScanPreview, ScanError> {
        self.preview_multi(&[image.to_vec()]).await
    }

    pub async fn preview_front_back(
        &self,
        front: &[u8],
        back: &[u8],
    ) -> Result<ScanPreview, ScanError> {
        self.preview_multi(&[front.to_vec(), back.to_vec()]).await
    }

    /// Preview a scan over label images. The field extraction and the
    /// text read run concurrently; the reconciler waits for both.
    pub async fn preview_multi(&self, images: &[Vec<u8>]) -> Result<ScanPreview, ScanError> {
        if images.is_empty() {
            return Err(ScanError::NoImages);
        }

        let (fields, text) = tokio::join!(
            self.field_source.extract_fields(images),
            self.text_source.extract_text(images),
        );

        let fields = fields?;
        let raw_text = text?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ScanError::NoTextRecognized)?;

        let parsed = self.local.extract(&raw_text, Some(&images[0]));
        let extracted = reconcile::merge(fields.as_ref().map(|f| &f.scan), &parsed);

        // Prefer the model's structured item list; synthesize one from
        // candidates otherwise.
        let detected_items = fields
            .and_then(|f| f.items)
            .or_else(|| reconcile::build_per_item_details(&extracted));

        tracing::info!(
            product = %extracted.product_name,
            category = %extracted.category_name,
            score = extracted.confidence_score,
            needs_review = extracted.needs_human_review,
            "scan preview complete"
        );

        Ok(ScanPreview {
            extracted,
            raw_text,
            detected_items,
        })
    }

    pub async fn scan_text_and_add(
        &self,
        raw_text: &str,
        quantity: u32,
    ) -> Result<ScanOutcome, ScanError> {
        let preview = self.preview_text(raw_text);
        self.add_from_preview(preview, quantity).await
    }

    pub async fn scan_image_and_add(
        &self,
        image: &[u8],
        quantity: u32,
    ) -> Result<ScanOutcome, ScanError> {
        let preview = self.preview_image(image).await?;
        self.add_from_preview(preview, quantity).await
    }

    pub async fn scan_multi_and_add(
        &self,
        images: &[Vec<u8>],
        quantity: u32,
    ) -> Result<ScanOutcome, ScanError> {
        let preview = self.preview_multi(images).await?;
        self.add_from_preview(preview, quantity).await
    }

    /// Add each detected item as its own batch with its own category and
    /// expiry, instead of stamping one set of values onto everything.
    pub async fn split_add_all(
        &self,
        preview: &ScanPreview,
        default_quantity: u32,
    ) -> Result<ScanOutcome, ScanError> {
        let quantity = default_quantity.max(1);
        let mut added = Vec::new();

        if let Some(items) = preview
            .detected_items
            .as_ref()
            .filter(|items| !items.is_empty())
        {
            for item in items {
                added.push(
                    self.inventory
                        .add_batch(AddBatchRequest {
                            product_name: item.product_name.clone(),
                            category_name: item.category_name.clone(),
                            expiry_date: item.expiry_date,
                            quantity,
                        })
                        .await?,
                );
            }
        } else if !preview.extracted.product_candidates.is_empty() {
            for candidate in &preview.extracted.product_candidates {
                let category = reconcile::infer_category_from_name(candidate)
                    .map(str::to_string)
                    .unwrap_or_else(|| preview.extracted.category_name.clone());

                // Only the primary candidate inherits the scanned expiry;
                // the rest get their own category fallback.
                let is_primary = candidate.eq_ignore_ascii_case(&preview.extracted.product_name);
                let expiry = if is_primary {
                    preview.extracted.expiry_date
                } else {
                    shelf_life::fallback_expiry(&category, Some(candidate))
                };

                added.push(
                    self.inventory
                        .add_batch(AddBatchRequest {
                            product_name: candidate.clone(),
                            category_name: category,
                            expiry_date: expiry,
                            quantity,
                        })
                        .await?,
                );
            }
        } else {
            added.push(
                self.inventory
                    .add_batch(AddBatchRequest {
                        product_name: preview.extracted.product_name.clone(),
                        category_name: preview.extracted.category_name.clone(),
                        expiry_date: preview.extracted.expiry_date,
                        quantity,
                    })
                    .await?,
            );
        }

        Ok(ScanOutcome {
            extracted: preview.extracted.clone(),
            added,
            raw_text: preview.raw_text.clone(),
        })
    }

    async fn add_from_preview(
        &self,
        preview: ScanPreview,
        quantity: u32,
    ) -> Result<ScanOutcome, ScanError> {
        let product = self
            .inventory
            .add_batch(AddBatchRequest {
                product_name: preview.extracted.product_name.clone(),
                category_name: preview.extracted.category_name.clone(),
                expiry_date: preview.extracted.expiry_date,
                quantity: quantity.max(1),
            })
            .await?;

        Ok(ScanOutcome {
            extracted: preview.extracted,
            added: vec![product],
            raw_text: preview.raw_text,
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InMemoryInventory;
    use crate::models::{today, ConfidenceLevel, FieldConfidence, GENERAL_CATEGORY, UNKNOWN_PRODUCT};
    use chrono::NaiveDate;

    struct MockTextSource {
        text: Option<String>,
        missing_key: bool,
    }

    #[async_trait]
    impl TextExtractionSource for MockTextSource {
        async fn extract_text(&self, _images: &[Vec<u8>]) -> Result<Option<String>, VisionError> {
            if self.missing_key {
                return Err(VisionError::MissingApiKey);
            }
            Ok(self.text.clone())
        }
    }

    struct MockFieldSource {
        extraction: Option<VisionExtraction>,
        exhausted: bool,
    }

    #[async_trait]
    impl FieldExtractionSource for MockFieldSource {
        async fn extract_fields(
            &self,
            _images: &[Vec<u8>],
        ) -> Result<Option<VisionExtraction>, VisionError> {
            if self.exhausted {
                return Err(VisionError::AllModelsFailed {
                    attempts: "gemini-2.5-flash: 503".to_string(),
                });
            }
            Ok(self.extraction.clone())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ai_extraction(name: &str, category: &str, expiry: NaiveDate) -> VisionExtraction {
        VisionExtraction {
            scan: ScanExtraction {
                product_name: name.to_string(),
                manufacturing_date: None,
                expiry_date: expiry,
                days_left_to_expire: 0,
                category_name: category.to_string(),
                is_low_confidence: false,
                product_candidates: vec![name.to_string()],
                confidence_score: 80,
                field_confidence: FieldConfidence::new(
                    ConfidenceLevel::High,
                    ConfidenceLevel::High,
                    ConfidenceLevel::High,
                ),
                needs_human_review: false,
            },
            items: None,
        }
    }

    fn service(
        text: Option<&str>,
        extraction: Option<VisionExtraction>,
    ) -> (ScanService, Arc<InMemoryInventory>) {
        let inventory = Arc::new(InMemoryInventory::new());
        let scan_service = ScanService::new(
            LocalTextExtractor::new(),
            Arc::new(MockTextSource {
                text: text.map(str::to_string),
                missing_key: false,
            }),
            Arc::new(MockFieldSource {
                extraction,
                exhausted: false,
            }),
            inventory.clone(),
        );
        (scan_service, inventory)
    }

    #[tokio::test]
    async fn no_images_is_an_error() {
        let (service, _) = service(Some("MILK"), None);
        assert!(matches!(
            service.preview_multi(&[]).await,
            Err(ScanError::NoImages)
        ));
    }

    #[tokio::test]
    async fn unreadable_text_is_an_error() {
        let (service_none, _) = service(None, None);
        assert!(matches!(
            service_none.preview_image(b"img").await,
            Err(ScanError::NoTextRecognized)
        ));

        let (service, _) = service(Some("   "), None);
        assert!(matches!(
            service.preview_image(b"img").await,
            Err(ScanError::NoTextRecognized)
        ));
    }

    #[tokio::test]
    async fn missing_credentials_propagate() {
        let inventory = Arc::new(InMemoryInventory::new());
        let scan_service = ScanService::new(
            LocalTextExtractor::new(),
            Arc::new(MockTextSource {
                text: None,
                missing_key: true,
            }),
            Arc::new(MockFieldSource {
                extraction: None,
                exhausted: false,
            }),
            inventory,
        );

        let result = scan_service.preview_image(b"img").await;
        assert!(matches!(
            result,
            Err(ScanError::Vision(VisionError::MissingApiKey))
        ));
    }

    #[tokio::test]
    async fn exhausted_models_propagate_on_field_extraction() {
        let inventory = Arc::new(InMemoryInventory::new());
        let scan_service = ScanService::new(
            LocalTextExtractor::new(),
            Arc::new(MockTextSource {
                text: Some("MILK".to_string()),
                missing_key: false,
            }),
            Arc::new(MockFieldSource {
                extraction: None,
                exhausted: true,
            }),
            inventory,
        );

        let result = scan_service.preview_image(b"img").await;
        assert!(matches!(
            result,
            Err(ScanError::Vision(VisionError::AllModelsFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn labeled_label_end_to_end() {
        let raw = "MILK\nMFG: 01/01/2030\nEXP: 15/01/2030";
        let (service, _) = service(Some(raw), None);

        let preview = service.preview_image(b"img").await.unwrap();
        assert_eq!(preview.extracted.product_name, "Milk");
        assert_eq!(preview.extracted.category_name, "Dairy");
        assert_eq!(preview.extracted.manufacturing_date, Some(date(2030, 1, 1)));
        assert_eq!(preview.extracted.expiry_date, date(2030, 1, 15));
        assert!(!preview.extracted.needs_human_review);
        assert_eq!(preview.raw_text, raw);
    }

    #[tokio::test]
    async fn ai_result_merges_over_local() {
        let raw = "MILK\nEXP: 15/01/2030";
        let ai = ai_extraction("Amul Gold Milk", "Dairy", date(2030, 2, 1));
        let (service, _) = service(Some(raw), Some(ai));

        let preview = service.preview_image(b"img").await.unwrap();
        // AI name wins; later expiry wins.
        assert_eq!(preview.extracted.product_name, "Amul Gold Milk");
        assert_eq!(preview.extracted.expiry_date, date(2030, 2, 1));
    }

    #[tokio::test]
    async fn duration_only_label_resolves_relative_to_today() {
        let raw = "Best before 3 months from packaging";
        let (service, _) = service(Some(raw), None);

        let preview = service.preview_image(b"img").await.unwrap();
        let extracted = &preview.extracted;

        assert_eq!(extracted.manufacturing_date, Some(today()));
        // Roughly three calendar months out.
        assert!((85..=95).contains(&extracted.days_left_to_expire));
        assert_eq!(
            extracted.field_confidence.expiry,
            ConfidenceLevel::Medium
        );
    }

    #[tokio::test]
    async fn no_evidence_still_succeeds_with_review_flag() {
        let raw = "@@ ##\n12";
        let (service, _) = service(Some(raw), None);

        let preview = service.preview_image(b"img").await.unwrap();
        let extracted = &preview.extracted;

        assert_eq!(extracted.product_name, UNKNOWN_PRODUCT);
        assert_eq!(extracted.category_name, GENERAL_CATEGORY);
        assert!(extracted.expiry_date > today());
        assert!(extracted.needs_human_review);
        assert!(extracted.confidence_score <= 25);
    }

    #[tokio::test]
    async fn merged_expiry_is_always_future() {
        // Both sources agree on a stale date; the merge must refuse it.
        let raw = "MILK\nEXP: 15/01/2020";
        let ai = ai_extraction("Milk", "Dairy", date(2020, 1, 15));
        let (service, _) = service(Some(raw), Some(ai));

        let preview = service.preview_image(b"img").await.unwrap();
        assert!(preview.extracted.expiry_date > today());
    }

    #[tokio::test]
    async fn scan_and_add_writes_one_batch() {
        let raw = "MILK\nEXP: 15/01/2030";
        let (service, inventory) = service(Some(raw), None);

        let outcome = service.scan_image_and_add(b"img", 0).await.unwrap();
        assert_eq!(outcome.added.len(), 1);
        assert_eq!(outcome.added[0].quantity, 1);
        assert_eq!(inventory.all().await.len(), 1);
    }

    #[tokio::test]
    async fn scan_text_and_add_is_local_only() {
        // Text path must not require the vision sources at all.
        let (service, inventory) = service(None, None);
        let outcome = service
            .scan_text_and_add("BREAD\nEXP: 15/01/2030", 2)
            .await
            .unwrap();
        assert_eq!(outcome.extracted.product_name, "Bread");
        assert_eq!(inventory.all().await[0].quantity, 2);
    }

    #[tokio::test]
    async fn split_add_uses_structured_items_when_present() {
        let raw = "mixed produce";
        let mut ai = ai_extraction("Tomato", "Vegetables", date(2030, 1, 10));
        ai.items = Some(vec![
            DetectedItem {
                product_name: "Tomato".to_string(),
                category_name: "Vegetables".to_string(),
                expiry_date: date(2030, 1, 10),
                days_left_to_expire: 5,
                confidence_score: 50,
                needs_human_review: false,
            },
            DetectedItem {
                product_name: "Paneer".to_string(),
                category_name: "Dairy".to_string(),
                expiry_date: date(2030, 1, 5),
                days_left_to_expire: 0,
                confidence_score: 50,
                needs_human_review: true,
            },
        ]);
        let (service, inventory) = service(Some(raw), Some(ai));

        let preview = service.preview_image(b"img").await.unwrap();
        let outcome = service.split_add_all(&preview, 1).await.unwrap();

        assert_eq!(outcome.added.len(), 2);
        let stored = inventory.all().await;
        assert!(stored.iter().any(|p| p.product_name == "Tomato"));
        assert!(stored
            .iter()
            .any(|p| p.product_name == "Paneer" && p.category_name == "Dairy"));
    }

    #[tokio::test]
    async fn split_add_synthesizes_from_candidates() {
        let raw = "milk carton next to frozen peas";
        let mut ai = ai_extraction("Milk", "Dairy", date(2030, 1, 10));
        ai.scan.product_candidates = vec!["Milk".to_string(), "Frozen Peas".to_string()];
        let (service, inventory) = service(Some(raw), Some(ai));

        let mut preview = service.preview_image(b"img").await.unwrap();
        // Force the candidate-synthesis branch.
        preview.detected_items = None;
        let outcome = service.split_add_all(&preview, 1).await.unwrap();

        assert_eq!(outcome.added.len(), 2);
        let stored = inventory.all().await;
        let milk = stored.iter().find(|p| p.product_name == "Milk").unwrap();
        let peas = stored
            .iter()
            .find(|p| p.product_name == "Frozen Peas")
            .unwrap();

        // Primary keeps the scanned expiry; the other candidate gets its
        // own category fallback.
        assert_eq!(milk.expiry_date, date(2030, 1, 10));
        assert_eq!(peas.category_name, "Frozen");
        assert_ne!(peas.expiry_date, milk.expiry_date);
    }

    #[tokio::test]
    async fn split_add_falls_back_to_single_product() {
        let raw = "plain label without candidates";
        let (service, inventory) = service(Some(raw), None);

        let mut preview = service.preview_image(b"img").await.unwrap();
        preview.extracted.product_candidates.clear();
        preview.detected_items = None;

        let outcome = service.split_add_all(&preview, 3).await.unwrap();
        assert_eq!(outcome.added.len(), 1);
        assert_eq!(inventory.all().await[0].quantity, 3);
    }
}
