//! Defensive parsing of the vision model's reply.
//!
//! The model is told to return strict JSON, but replies arrive wrapped
//! in markdown fences, with unpredictable key casing, or with junk
//! entries in `detectedItems`. Parsing is lenient everywhere: a field
//! that cannot be read is simply absent, and a malformed reply is "no
//! answer", never an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::types::{VisionDetectedItem, VisionFieldConfidence, VisionFields};
use crate::models::{CANDIDATE_MAX_LEN, CANDIDATE_MIN_LEN, GENERAL_CATEGORY, MAX_PRODUCT_CANDIDATES};

/// Name fragments that are never real products: sentinels and label
/// vocabulary the model sometimes echoes back.
static BLOCKED_NAME_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(unknown product|best before|exp|expiry|mfg|date)").unwrap()
});

static ITEM_CATEGORY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "Vegetables",
            r"(?i)\b(tomato|onion|potato|carrot|cucumber|broccoli|spinach|capsicum|brinjal|eggplant|lettuce|cauliflower)\b",
        ),
        (
            "Fruits",
            r"(?i)\b(apple|banana|orange|grape|mango|pear|papaya|pomegranate|kiwi)\b",
        ),
        (
            "Dairy",
            r"(?i)\b(milk|cheese|butter|yogurt|yoghurt|cream|paneer|curd)\b",
        ),
        (
            "Meat",
            r"(?i)\b(chicken|beef|fish|mutton|pork|prawn|shrimp|meat)\b",
        ),
        ("Bakery Item", r"(?i)\b(bread|cake|bun|pastry|croissant)\b"),
        (
            "Snacks",
            r"(?i)\b(biscuit|cookie|chocolate|chips|wafer|namkeen|snack)\b",
        ),
        (
            "Grains",
            r"(?i)\b(rice|pasta|noodle|oats|cereal|wheat|flour|atta)\b",
        ),
        ("Beverages", r"(?i)\b(juice|soda|water|tea|coffee|drink)\b"),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).unwrap()))
    .collect()
});

// ──────────────────────────────────────────────
// Reply envelope
// ──────────────────────────────────────────────

/// Join the text parts out of a `candidates` reply envelope.
pub fn extract_reply_text(body: &str) -> Option<String> {
    let doc: Value = serde_json::from_str(body).ok()?;
    let parts = doc
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Strip a markdown code fence, keeping the outermost JSON object.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

// ──────────────────────────────────────────────
// Field parsing
// ──────────────────────────────────────────────

/// Parse the model's JSON object into [`VisionFields`]. Field names are
/// matched case-insensitively; malformed entries are skipped.
pub fn parse_vision_fields(json_str: &str) -> Option<VisionFields> {
    let doc: Value = serde_json::from_str(json_str).ok()?;
    let obj = doc.as_object()?;

    let detected_items = ci_get(obj, "detectedItems")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|item| VisionDetectedItem {
                    name: ci_string(item, "name"),
                    category: ci_string(item, "category"),
                    expiry_date: ci_string(item, "expiryDate"),
                })
                .collect()
        })
        .unwrap_or_default();

    let field_confidence = ci_get(obj, "fieldConfidence")
        .and_then(Value::as_object)
        .map(|fc| VisionFieldConfidence {
            name: ci_string(fc, "name"),
            expiry: ci_string(fc, "expiry"),
            category: ci_string(fc, "category"),
        });

    Some(VisionFields {
        product_name: ci_string(obj, "productName"),
        detected_items,
        category_name: ci_string(obj, "categoryName"),
        manufacturing_date: ci_string(obj, "manufacturingDate"),
        expiry_date: ci_string(obj, "expiryDate"),
        best_before_text: ci_string(obj, "bestBeforeText"),
        best_before_value: ci_integer(obj, "bestBeforeValue"),
        best_before_unit: ci_string(obj, "bestBeforeUnit"),
        confidence: ci_string(obj, "confidence"),
        field_confidence,
    })
}

fn ci_get<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn ci_string(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    ci_get(obj, key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn ci_integer(obj: &serde_json::Map<String, Value>, key: &str) -> Option<i64> {
    let value = ci_get(obj, key)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

// ──────────────────────────────────────────────
// Detected-name normalization
// ──────────────────────────────────────────────

/// Clean the model's detected-item names into product candidates:
/// tokenize on `,` and `/`, drop label-vocabulary fragments, filter to
/// 2..=60 characters, dedupe case-insensitively, drop the longer of any
/// substring pair, cap at 12.
pub fn normalize_detected_names(
    items: &[VisionDetectedItem],
    product_name: Option<&str>,
) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for item in items {
        add_tokenized(item.name.as_deref(), &mut names);
    }
    add_tokenized(product_name, &mut names);

    // A name that contains another name is usually the same product with
    // packaging noise attached: keep the shorter canonical form.
    let mut removed = vec![false; names.len()];
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let a = names[i].to_lowercase();
            let b = names[j].to_lowercase();
            if a.contains(&b) {
                removed[i] = true;
            } else if b.contains(&a) {
                removed[j] = true;
            }
        }
    }

    names
        .into_iter()
        .zip(removed)
        .filter(|(_, removed)| !removed)
        .map(|(name, _)| name)
        .take(MAX_PRODUCT_CANDIDATES)
        .collect()
}

fn add_tokenized(value: Option<&str>, names: &mut Vec<String>) {
    let Some(value) = value else { return };
    for raw in value.split([',', '/']) {
        let candidate = raw.trim();
        if candidate.len() < CANDIDATE_MIN_LEN || candidate.len() > CANDIDATE_MAX_LEN {
            continue;
        }
        if BLOCKED_NAME_FRAGMENT.is_match(candidate) {
            continue;
        }
        if names.iter().any(|n| n.eq_ignore_ascii_case(candidate)) {
            continue;
        }
        names.push(candidate.to_string());
    }
}

/// Infer a category from the combined detected-item text.
pub fn infer_category_from_items(names: &[String]) -> &'static str {
    let text = names.join(" ");
    ITEM_CATEGORY_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&text))
        .map(|&(category, _)| category)
        .unwrap_or(GENERAL_CATEGORY)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
