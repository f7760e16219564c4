//! Instruction prompts sent to the vision model.
//!
//! The extraction prompt pins the reply to a strict JSON shape so the
//! parser can stay mechanical; the rules exist because real scans are
//! blurry, rotated, multi-product, or missing an explicit date.

use crate::models::ScanExtraction;

/// Structured field extraction over one or more label images.
pub const FIELD_EXTRACTION_PROMPT: &str = r#"Extract and return JSON only:
{
  "productName": "...",
  "detectedItems": [
    {"name": "item1", "category": "Dairy", "expiryDate": "YYYY-MM-DD or null"},
    {"name": "item2", "category": "Fruits", "expiryDate": "YYYY-MM-DD or null"}
  ],
  "categoryName": "...",
  "manufacturingDate": "YYYY-MM-DD or null",
  "expiryDate": "YYYY-MM-DD or null",
  "bestBeforeText": "original best-before text if found, e.g. 'best before 6 months from mfg'",
  "bestBeforeValue": 0,
  "bestBeforeUnit": "days|months|years|null",
  "confidence": "high|medium|low",
  "fieldConfidence": {
    "name": "high|medium|low",
    "expiry": "high|medium|low",
    "category": "high|medium|low"
  }
}
Rules:
- Handle difficult images: blurred text, glare, rotated labels, handwriting. Try reading from all orientations (0, 90, 180, 270 degrees).
- For blurry or low-resolution images: focus on the largest/clearest text first. Expiry/best-before dates are often on a separate label area or printed in a different font/color.
- Look for date stamps, embossed/ink-jet-printed dates, and sticker labels which may differ from the main label text.
- If text is partially readable, extract what you can and lower the field confidence accordingly.
- Prefer visible printed label text from product box/pack.
- If multiple distinct products are visible, you MUST list EACH as a separate object in detectedItems with its OWN name, category, and expiryDate. Do NOT combine multiple products into one entry.
- Each detectedItems entry MUST represent a DISTINCT physical product (different brand, type, or package). Do NOT split a single product's ingredients or label text into multiple items.
- If the same product appears in multiple images, merge into ONE detectedItems entry.
- Each detectedItems entry MUST have a meaningful food product name (not a date, barcode, or label fragment).
- If no readable label text, classify visible food products directly from image appearance.
- When you see multiple loose or unpackaged fruits or vegetables together, identify EACH visually distinct type as a separate detectedItems entry with its own name and category. Do NOT group them as 'Mixed Vegetables' or 'Assorted Produce'.
- For unpackaged produce without labels, set expiryDate to null, confidence to 'low', and fieldConfidence.expiry to 'low'. The system will apply category-based shelf-life defaults automatically.
- Ignore background text, shelf labels, and unrelated objects.
- Use category from: Vegetables, Fruits, Bakery Item, Snacks, Dairy, Meat, Grains, Beverages, Condiments, Frozen, General.
- If expiry not explicit and text says best before X months/years/days from mfg, fill bestBeforeValue and bestBeforeUnit.
- Copy the original best-before phrasing into bestBeforeText so the parser can handle edge cases.
- confidence: "high" if label text is clearly readable, "medium" if partially readable, "low" if guessing from image.
- fieldConfidence: per-field - "high" if clearly read from label, "medium" if partially readable, "low" if inferred or guessed.
"#;

/// Plain text reading, used when the caller needs the raw label text.
pub const TEXT_ONLY_PROMPT: &str =
    "Read only the product/package label text from these images. Ignore background. Return plain text lines only.";

/// Image-only classification for the degraded path with no readable text.
pub const CLASSIFY_PROMPT: &str = r#"Look at this image and identify the food product. Return JSON only:
{"productName": "...", "categoryName": "..."}
Use category from: Vegetables, Fruits, Bakery Item, Snacks, Dairy, Meat, Grains, Beverages, Condiments, Frozen, General.
If you cannot identify a food product, return {"productName": "Unknown Product", "categoryName": "General"}.
"#;

/// Refinement prompt: same contract as field extraction, seeded with the
/// OCR text and the baseline extraction so the model can fill gaps.
pub fn build_refine_prompt(raw_text: &str, baseline: &ScanExtraction) -> String {
    let mut prompt = String::new();
    prompt.push_str("Extract grocery product info from images and OCR text.\n");
    prompt.push_str("Return JSON only with fields:\n");
    prompt.push_str("productName, detectedItems (array of {name, category, expiryDate}), categoryName, manufacturingDate, expiryDate, bestBeforeText, bestBeforeValue, bestBeforeUnit, confidence, fieldConfidence ({name, expiry, category} each high|medium|low)\n");
    prompt.push_str("Rules:\n");
    prompt.push_str("- Handle difficult images: blurred text, glare, rotated labels, handwriting. Try all orientations (0, 90, 180, 270).\n");
    prompt.push_str("- Look for date stamps, embossed/ink-jet-printed dates, and sticker labels separate from main label text.\n");
    prompt.push_str("- Use categories: Vegetables, Fruits, Bakery Item, Snacks, Dairy, Meat, Grains, Beverages, Condiments, Frozen, General.\n");
    prompt.push_str("- If there are MULTIPLE distinct products, you MUST list each in detectedItems with its own name, category, and expiryDate.\n");
    prompt.push_str("- Each detectedItems entry MUST be a DISTINCT physical product. Do NOT split ingredients or label fragments into separate items.\n");
    prompt.push_str("- Merge duplicate products across images into ONE entry.\n");
    prompt.push_str("- If there is no clear product label text, detect visible food items and populate detectedItems.\n");
    prompt.push_str("- Dates must be YYYY-MM-DD or null.\n");
    prompt.push_str("- If text says 'best before X months/years/days from manufacture', compute expiryDate from manufacturingDate and also copy the raw phrasing into bestBeforeText.\n");
    prompt.push_str("- confidence is one of: high, medium, low.\n");
    prompt.push_str("- fieldConfidence: per-field - high if clearly read, medium if partially readable, low if inferred or guessed.\n");
    prompt.push_str("Baseline extraction:\n");
    prompt.push_str(&format!(
        "productName={}, categoryName={}, manufacturingDate={}, expiryDate={}\n",
        baseline.product_name,
        baseline.category_name,
        baseline
            .manufacturing_date
            .map(|d| d.to_string())
            .unwrap_or_default(),
        baseline.expiry_date,
    ));
    prompt.push_str("OCR text:\n");
    prompt.push_str(raw_text);
    prompt
}
