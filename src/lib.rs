//! Larder: the label-scanning core of a food-inventory tracker.
//!
//! Raw OCR text and AI vision output go in; one reconciled
//! `(product, category, manufacturing date, expiry date, confidence)`
//! record comes out, plus per-item details for multi-product scans.
//! Everything around this core (HTTP surface, persistence, notification
//! delivery, the OCR engine itself) lives behind collaborator traits.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use larder::inventory::InMemoryInventory;
//! use larder::pipeline::extraction::LocalTextExtractor;
//! use larder::pipeline::scan::ScanService;
//! use larder::pipeline::vision::VisionExtractor;
//!
//! let vision = Arc::new(VisionExtractor::from_env());
//! let service = ScanService::new(
//!     LocalTextExtractor::new(),
//!     vision.clone(),
//!     vision,
//!     Arc::new(InMemoryInventory::new()),
//! );
//! ```

pub mod config;
pub mod corrections;
pub mod inventory;
pub mod models;
pub mod pipeline;
pub mod telemetry;

pub use models::{
    ConfidenceLevel, DetectedItem, FieldConfidence, ScanExtraction, GENERAL_CATEGORY,
    UNKNOWN_PRODUCT,
};
pub use pipeline::scan::{ScanError, ScanOutcome, ScanPreview, ScanService};
