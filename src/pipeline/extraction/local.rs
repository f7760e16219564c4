//! Regex-based field extraction over raw OCR text.
//!
//! Produces one extraction candidate per scan: a product-name guess, a
//! category guess, and the best expiry/manufacturing dates the text
//! supports. Date resolution walks a layered fallback chain so the
//! result is total:
//!
//! 1. date following an expiry label (exp, best before, use by, ...),
//! 2. latest of the unlabeled dates when two or more are present,
//! 3. the only unlabeled date,
//! 4. "best before end of <month> <year>",
//! 5. year-only expiry ("expires 2027"),
//! 6. duration phrase anchored at the manufacturing date,
//! 7. duration phrase anchored at today (synthetic manufacturing date),
//! 8. category shelf-life fallback.
//!
//! Everything is deterministic given the input text and "today".

use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;

use super::classifier::{ImageClassifier, NullClassifier};
use super::normalize::normalize_ocr_text;
use super::{dates, duration, shelf_life};
use crate::models::{
    days_until, today, ConfidenceLevel, FieldConfidence, ScanExtraction, GENERAL_CATEGORY,
    UNKNOWN_PRODUCT,
};

// ──────────────────────────────────────────────
// Pattern tables
// ──────────────────────────────────────────────

/// Date-shaped substring, numeric forms.
static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}[./|\-]\d{1,2}[./|\-]\d{2,4}|\d{4}[./|\-]\d{1,2}[./|\-]\d{1,2})\b")
        .unwrap()
});

/// Date-shaped substring, "15 mar 2026" forms.
static TEXTUAL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2}\s*(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\s*\d{2,4})\b",
    )
    .unwrap()
});

/// Date-shaped substring, "mar 2026" forms.
static MONTH_YEAR_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b((?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*[.\s/-]*\d{2,4})\b",
    )
    .unwrap()
});

/// Any single date-ish token, for use after a label.
const DATEISH: &str = concat!(
    r"\d{1,2}[./|\-]\d{1,2}[./|\-]\d{2,4}",
    r"|\d{4}[./|\-]\d{1,2}[./|\-]\d{1,2}",
    r"|\d{1,2}\s*(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\s*\d{2,4}",
);

static EXPIRY_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:exp(?:iry|ire)?|expires?|best\s*(?:if\s+used\s+)?before|use\s*by|bb|use\s*before|consume\s*before)\s*[:\-]?\s*({})",
        DATEISH
    ))
    .unwrap()
});

static MFG_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:mfg|mfd|mfg\.?\s*date|manufactured|manufacturing|packed\s*on|pkd|pkg\.?\s*date|pack(?:ed|ing)\s*date|prod(?:uction)?\s*date)\s*[:\-]?\s*({})",
        DATEISH
    ))
    .unwrap()
});

/// Product-name keyword vocabulary, checked in order.
const PRODUCT_KEYWORDS: &[(&str, &str)] = &[
    ("milk", "Milk"),
    ("bread", "Bread"),
    ("tomato", "Tomato"),
    ("onion", "Onion"),
    ("egg", "Eggs"),
    ("yogurt", "Yogurt"),
    ("yoghurt", "Yogurt"),
    ("cheese", "Cheese"),
    ("butter", "Butter"),
    ("chicken", "Chicken"),
    ("rice", "Rice"),
    ("juice", "Juice"),
];

/// Category keyword sets, checked in order; first category with a hit
/// wins.
pub(crate) const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Dairy",
        &["milk", "cheese", "butter", "yogurt", "yoghurt", "cream", "paneer", "curd"],
    ),
    ("Bakery Item", &["bread", "bun", "cake", "pastry", "croissant"]),
    (
        "Snacks",
        &["biscuit", "cookie", "chocolate", "chips", "namkeen", "snack", "wafer"],
    ),
    (
        "Fruits",
        &["banana", "apple", "orange", "mango", "grape", "papaya", "kiwi", "pear"],
    ),
    (
        "Meat",
        &["chicken", "beef", "fish", "mutton", "pork", "prawn", "shrimp", "meat"],
    ),
    (
        "Vegetables",
        &["tomato", "onion", "potato", "carrot", "spinach", "broccoli", "capsicum", "cucumber", "lettuce"],
    ),
    (
        "Grains",
        &["rice", "pasta", "noodle", "oats", "cereal", "wheat", "flour", "atta"],
    ),
    (
        "Beverages",
        &["juice", "soda", "water", "tea", "coffee", "drink"],
    ),
    ("Condiments", &["sauce", "ketchup", "pickle", "jam", "honey"]),
    ("Frozen", &["frozen", "ice cream"]),
];

// ──────────────────────────────────────────────
// LocalTextExtractor
// ──────────────────────────────────────────────

/// Regex-driven extraction over raw OCR text, with an optional image
/// classifier filling gaps the text leaves open.
pub struct LocalTextExtractor {
    classifier: Arc<dyn ImageClassifier>,
}

impl Default for LocalTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTextExtractor {
    pub fn new() -> Self {
        Self {
            classifier: Arc::new(NullClassifier),
        }
    }

    pub fn with_classifier(classifier: Arc<dyn ImageClassifier>) -> Self {
        Self { classifier }
    }

    /// Extract fields from raw OCR text. Total: always produces a
    /// concrete expiry date.
    pub fn extract(&self, raw_text: &str, image: Option<&[u8]>) -> ScanExtraction {
        self.extract_as_of(raw_text, image, today())
    }

    /// Deterministic variant of [`extract`](Self::extract) with an
    /// explicit clock.
    pub fn extract_as_of(
        &self,
        raw_text: &str,
        image: Option<&[u8]>,
        today: NaiveDate,
    ) -> ScanExtraction {
        let text = normalize_ocr_text(raw_text);
        let lower = text.to_lowercase();

        let mut product_name = guess_product_name(&text);
        let mut category = guess_category(&lower).to_string();

        let prediction = image.and_then(|bytes| self.classifier.classify(bytes));
        if let Some(guess) = &prediction {
            if product_name == UNKNOWN_PRODUCT {
                product_name = guess.product_name.clone();
            }
            if category == GENERAL_CATEGORY {
                category = guess.category_name.clone();
            }
        }

        let all_dates = extract_dates(&text);
        let expiry_by_label = extract_labeled_date(&EXPIRY_LABEL, &text, true, today);
        let mfg_by_label = extract_labeled_date(&MFG_LABEL, &text, false, today);

        let mut manufacturing = mfg_by_label.or_else(|| {
            (all_dates.len() > 1)
                .then(|| all_dates.iter().min().copied())
                .flatten()
        });
        let mut expiry = expiry_by_label.or_else(|| {
            if all_dates.len() > 1 {
                all_dates.iter().max().copied()
            } else {
                all_dates.first().copied()
            }
        });

        if expiry.is_none() {
            expiry = duration::derive_from_end_of_month(&text);
        }
        if expiry.is_none() {
            expiry = duration::derive_from_year_only(&text);
        }
        if expiry.is_none() {
            if let Some(anchor) = manufacturing {
                expiry = duration::derive_from_duration(&text, anchor);
            }
        }
        if expiry.is_none() && manufacturing.is_none() {
            // "best before three months from packaging" with no packing
            // date printed: anchor at today and record the synthetic
            // manufacturing date.
            if let Some(derived) = duration::derive_from_duration(&text, today) {
                manufacturing = Some(today);
                expiry = Some(derived);
            }
        }

        // Any expiry resolved from the text counts as date evidence, even
        // when derived from a duration phrase rather than a printed date.
        let has_date_evidence = !all_dates.is_empty()
            || expiry_by_label.is_some()
            || mfg_by_label.is_some()
            || expiry.is_some();

        let expiry_date = expiry.unwrap_or_else(|| {
            shelf_life::fallback_expiry_as_of(&category, Some(&product_name), today)
        });

        let (confidence_score, field_confidence, needs_human_review) = compute_confidence(
            &product_name,
            has_date_evidence,
            expiry_by_label.is_some(),
            prediction.is_some(),
            all_dates.len(),
            &category,
        );

        tracing::debug!(
            product = %product_name,
            category = %category,
            score = confidence_score,
            dates_found = all_dates.len(),
            "local extraction complete"
        );

        ScanExtraction {
            product_name,
            manufacturing_date: manufacturing,
            expiry_date,
            days_left_to_expire: days_until(expiry_date, today),
            category_name: category,
            is_low_confidence: confidence_score < 50,
            product_candidates: Vec::new(),
            confidence_score,
            field_confidence,
            needs_human_review,
        }
    }
}

// ──────────────────────────────────────────────
// Field guessing
// ──────────────────────────────────────────────

fn guess_product_name(text: &str) -> String {
    let lower = text.to_lowercase();
    for (keyword, name) in PRODUCT_KEYWORDS {
        if lower.contains(keyword) {
            return (*name).to_string();
        }
    }

    // No keyword hit: first non-empty line that carries a letter,
    // truncated to 80 characters.
    text.lines()
        .map(str::trim)
        .find(|line| line.len() >= 3 && line.chars().any(char::is_alphabetic))
        .map(|line| line.chars().take(80).collect())
        .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string())
}

pub(crate) fn guess_category(text_lower: &str) -> &'static str {
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text_lower.contains(k)))
        .map(|&(category, _)| category)
        .unwrap_or(GENERAL_CATEGORY)
}

// ──────────────────────────────────────────────
// Date collection
// ──────────────────────────────────────────────

/// Collect every date-shaped substring in the text, parsed and deduped.
fn extract_dates(text: &str) -> Vec<NaiveDate> {
    let mut results: Vec<NaiveDate> = Vec::new();
    for pattern in [&*NUMERIC_DATE, &*TEXTUAL_DATE, &*MONTH_YEAR_DATE] {
        for found in pattern.find_iter(text) {
            if let Some(parsed) = dates::parse(found.as_str()) {
                if !results.contains(&parsed) {
                    results.push(parsed);
                }
            }
        }
    }
    results
}

fn extract_labeled_date(
    pattern: &Regex,
    text: &str,
    prefer_future: bool,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let token = pattern.captures(text)?.get(1)?.as_str();
    if prefer_future {
        dates::parse_prefer_future(token, today)
    } else {
        dates::parse(token)
    }
}

// ──────────────────────────────────────────────
// Confidence scoring
// ──────────────────────────────────────────────

/// Detailed confidence with per-field ranks and the human-review flag.
fn compute_confidence(
    product_name: &str,
    has_date_evidence: bool,
    has_labeled_expiry: bool,
    has_classifier_hint: bool,
    date_count: usize,
    category: &str,
) -> (u8, FieldConfidence, bool) {
    let mut score: i32 = 0;

    let name_conf = if product_name != UNKNOWN_PRODUCT {
        score += 25;
        ConfidenceLevel::High
    } else if has_classifier_hint {
        score += 15;
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    let expiry_conf = if has_labeled_expiry {
        score += 30;
        ConfidenceLevel::High
    } else if has_date_evidence {
        score += 20;
        ConfidenceLevel::Medium
    } else {
        score -= 15;
        ConfidenceLevel::Low
    };

    let category_conf = if category != GENERAL_CATEGORY {
        score += 15;
        ConfidenceLevel::High
    } else if has_classifier_hint {
        score += 10;
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    // Two or more raw dates corroborate each other.
    if date_count >= 2 {
        score += 10;
    }

    // Nothing recognized at all: cap hard.
    if product_name == UNKNOWN_PRODUCT && !has_date_evidence {
        score = score.min(25);
    }

    let score = score.clamp(0, 100) as u8;
    let field_confidence = FieldConfidence::new(name_conf, expiry_conf, category_conf);
    let needs_review = name_conf.is_low() || expiry_conf.is_low() || score < 50;

    (score, field_confidence, needs_review)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
