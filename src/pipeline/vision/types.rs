use crate::models::{DetectedItem, ScanExtraction};

/// The structured field set requested from the vision model, as parsed
/// from its JSON reply. Every field is optional: the parser is lenient
/// and downstream code fills gaps from the local path or fallbacks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionFields {
    pub product_name: Option<String>,
    pub detected_items: Vec<VisionDetectedItem>,
    pub category_name: Option<String>,
    pub manufacturing_date: Option<String>,
    pub expiry_date: Option<String>,
    pub best_before_text: Option<String>,
    pub best_before_value: Option<i64>,
    pub best_before_unit: Option<String>,
    pub confidence: Option<String>,
    pub field_confidence: Option<VisionFieldConfidence>,
}

/// One entry of the model's `detectedItems` array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionDetectedItem {
    pub name: Option<String>,
    pub category: Option<String>,
    pub expiry_date: Option<String>,
}

/// The model's own per-field confidence block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionFieldConfidence {
    pub name: Option<String>,
    pub expiry: Option<String>,
    pub category: Option<String>,
}

/// A finished vision extraction: the merged scan result plus the
/// structured per-item list when the model detected several products.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionExtraction {
    pub scan: ScanExtraction,
    pub items: Option<Vec<DetectedItem>>,
}
