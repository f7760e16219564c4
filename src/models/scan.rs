use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::FieldConfidence;

/// Sentinel product name meaning "not determined".
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

/// Catch-all category used when nothing more specific was recognized.
pub const GENERAL_CATEGORY: &str = "General";

/// The fixed category vocabulary. Callers may also supply custom category
/// strings; anything missing or unrecognized collapses to `General`.
pub const CATEGORY_VOCABULARY: &[&str] = &[
    "General",
    "Dairy",
    "Fruits",
    "Vegetables",
    "Meat",
    "Bakery Item",
    "Snacks",
    "Grains",
    "Beverages",
    "Condiments",
    "Frozen",
];

/// Maximum number of alternate product-name candidates carried on a scan.
pub const MAX_PRODUCT_CANDIDATES: usize = 12;

/// Candidate names shorter or longer than these bounds are dropped.
pub const CANDIDATE_MIN_LEN: usize = 2;
pub const CANDIDATE_MAX_LEN: usize = 60;

/// Today's date in UTC, the single clock read the pipeline depends on.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Whole days from `today` until `expiry` (negative when already past).
pub fn days_until(expiry: NaiveDate, today: NaiveDate) -> i64 {
    expiry.signed_duration_since(today).num_days()
}

/// One best-effort extraction produced from a single scan.
///
/// Immutable once produced: reconciliation builds a fresh value instead of
/// mutating its inputs. `expiry_date` is always concrete by the time
/// extraction completes; the fallback chain guarantees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanExtraction {
    pub product_name: String,
    pub manufacturing_date: Option<NaiveDate>,
    pub expiry_date: NaiveDate,
    pub days_left_to_expire: i64,
    pub category_name: String,
    pub is_low_confidence: bool,
    #[serde(default)]
    pub product_candidates: Vec<String>,
    pub confidence_score: u8,
    pub field_confidence: FieldConfidence,
    pub needs_human_review: bool,
}

impl ScanExtraction {
    pub fn has_known_name(&self) -> bool {
        self.product_name != UNKNOWN_PRODUCT
    }
}

/// One physical product among several detected in a multi-item scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedItem {
    pub product_name: String,
    pub category_name: String,
    pub expiry_date: NaiveDate,
    pub days_left_to_expire: i64,
    pub confidence_score: u8,
    pub needs_human_review: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_until_counts_whole_days() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(days_until(expiry, today), 14);
    }

    #[test]
    fn days_until_negative_for_past_dates() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let expired = NaiveDate::from_ymd_opt(2026, 5, 30).unwrap();
        assert_eq!(days_until(expired, today), -2);
    }

    #[test]
    fn vocabulary_contains_general() {
        assert!(CATEGORY_VOCABULARY.contains(&GENERAL_CATEGORY));
        assert_eq!(CATEGORY_VOCABULARY.len(), 11);
    }
}
