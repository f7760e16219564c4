//! Reconciliation of the two extraction sources.
//!
//! The AI vision result and the local regex result disagree constantly;
//! this module merges them into one answer with recomputed confidence.
//! Precedence rules, per field:
//!
//! - name/category: the AI wins unless it only produced the sentinel,
//! - manufacturing date: AI, then local, then today,
//! - expiry: the later of the two non-default dates. Premature-expiry
//!   false alarms annoy users far more than a late warning, so the
//!   later date wins ties. When BOTH sources rate their own expiry low
//!   (meaning both guessed from a fallback), both guesses are discarded
//!   and the category table answers directly,
//! - confidence: max score, per-field higher rank,
//! - review flag: both sources must agree the scan is fine.
//!
//! Pure functions: a merge never mutates its inputs and always returns a
//! strictly future expiry.

use chrono::NaiveDate;

use crate::models::{
    days_until, today, DetectedItem, ScanExtraction, CANDIDATE_MAX_LEN, CANDIDATE_MIN_LEN,
    GENERAL_CATEGORY, MAX_PRODUCT_CANDIDATES, UNKNOWN_PRODUCT,
};
use crate::pipeline::extraction::local::guess_category;
use crate::pipeline::extraction::shelf_life;

/// Merge an optional AI extraction with the always-present local one.
pub fn merge(ai: Option<&ScanExtraction>, local: &ScanExtraction) -> ScanExtraction {
    merge_as_of(ai, local, today())
}

/// Deterministic variant of [`merge`] with an explicit clock.
pub fn merge_as_of(
    ai: Option<&ScanExtraction>,
    local: &ScanExtraction,
    today: NaiveDate,
) -> ScanExtraction {
    let Some(ai) = ai else {
        // Local-only: keep the extraction but still enforce the future
        // invariant and a score floor.
        let expiry_date = ensure_future_expiry(
            local.expiry_date,
            &local.category_name,
            &local.product_name,
            today,
        );
        return ScanExtraction {
            product_name: local.product_name.clone(),
            manufacturing_date: Some(local.manufacturing_date.unwrap_or(today)),
            expiry_date,
            days_left_to_expire: days_until(expiry_date, today),
            category_name: local.category_name.clone(),
            is_low_confidence: local.is_low_confidence,
            product_candidates: build_candidates(
                &local.product_name,
                [&local.product_candidates],
            ),
            confidence_score: local.confidence_score.max(20),
            field_confidence: local.field_confidence,
            needs_human_review: local.needs_human_review,
        };
    };

    let product_name = if ai.product_name != UNKNOWN_PRODUCT {
        ai.product_name.clone()
    } else {
        local.product_name.clone()
    };
    let category_name = if ai.category_name != GENERAL_CATEGORY {
        ai.category_name.clone()
    } else {
        local.category_name.clone()
    };
    let manufacturing_date = ai
        .manufacturing_date
        .or(local.manufacturing_date)
        .unwrap_or(today);

    let mut expiry_date = select_best_expiry(ai.expiry_date, local.expiry_date);

    // Both sources admitting a low-confidence expiry means neither saw
    // real label evidence; a fresh category fallback beats combining two
    // guesses.
    if ai.field_confidence.expiry.is_low() && local.field_confidence.expiry.is_low() {
        expiry_date = shelf_life::fallback_expiry_as_of(&category_name, Some(&product_name), today);
    }

    let expiry_date = ensure_future_expiry(expiry_date, &category_name, &product_name, today);

    let is_low_confidence = ai.is_low_confidence && local.is_low_confidence;
    let product_candidates = build_candidates(
        &product_name,
        [&ai.product_candidates, &local.product_candidates],
    );
    let confidence_score = ai.confidence_score.max(local.confidence_score);
    let field_confidence = ai.field_confidence.merged_with(local.field_confidence);

    let needs_human_review = (ai.needs_human_review && local.needs_human_review)
        || field_confidence.any_low()
        || confidence_score < 50;

    ScanExtraction {
        product_name,
        manufacturing_date: Some(manufacturing_date),
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

/// Later date wins when the sources disagree.
fn select_best_expiry(ai_expiry: NaiveDate, local_expiry: NaiveDate) -> NaiveDate {
    ai_expiry.max(local_expiry)
}

/// Replace a today-or-earlier expiry with the category fallback.
fn ensure_future_expiry(
    expiry: NaiveDate,
    category_name: &str,
    product_name: &str,
    today: NaiveDate,
) -> NaiveDate {
    if expiry <= today {
        shelf_life::fallback_expiry_as_of(category_name, Some(product_name), today)
    } else {
        expiry
    }
}

/// The merged name plus both candidate lists, deduped case-insensitively,
/// length-filtered, capped.
fn build_candidates<'a>(
    product_name: &str,
    candidate_lists: impl IntoIterator<Item = &'a Vec<String>>,
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    let trimmed = product_name.trim();
    if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(UNKNOWN_PRODUCT) {
        candidates.push(trimmed.to_string());
    }

    for list in candidate_lists {
        for item in list {
            let cleaned = item.trim();
            if cleaned.len() < CANDIDATE_MIN_LEN || cleaned.len() > CANDIDATE_MAX_LEN {
                continue;
            }
            if candidates.iter().any(|c| c.eq_ignore_ascii_case(cleaned)) {
                continue;
            }
            candidates.push(cleaned.to_string());
        }
    }

    candidates.truncate(MAX_PRODUCT_CANDIDATES);
    candidates
}

/// Category inferred from a bare product name, when its keywords say
/// anything at all.
pub(crate) fn infer_category_from_name(name: &str) -> Option<&'static str> {
    match guess_category(&name.to_lowercase()) {
        GENERAL_CATEGORY => None,
        category => Some(category),
    }
}

/// Synthesize a per-item list from the merged candidates when the AI
/// path produced no structured items. The primary candidate keeps the
/// merged expiry; every other candidate gets its own category fallback
/// so a multi-item list does not collapse onto one date.
pub fn build_per_item_details(combined: &ScanExtraction) -> Option<Vec<DetectedItem>> {
    build_per_item_details_as_of(combined, today())
}

pub fn build_per_item_details_as_of(
    combined: &ScanExtraction,
    today: NaiveDate,
) -> Option<Vec<DetectedItem>> {
    if combined.product_candidates.len() < 2 {
        return None;
    }

    let mut items = Vec::new();
    for candidate in &combined.product_candidates {
        let category = infer_category_from_name(candidate)
            .map(str::to_string)
            .unwrap_or_else(|| combined.category_name.clone());
        let is_primary = candidate.eq_ignore_ascii_case(&combined.product_name);
        let expiry = if is_primary {
            combined.expiry_date
        } else {
            shelf_life::fallback_expiry_as_of(&category, Some(candidate), today)
        };

        items.push(DetectedItem {
            product_name: candidate.clone(),
            category_name: category,
            expiry_date: expiry,
            days_left_to_expire: days_until(expiry, today),
            confidence_score: combined.confidence_score,
            needs_human_review: !is_primary || combined.needs_human_review,
        });
    }

    Some(items)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
