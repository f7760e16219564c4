use serde::{Deserialize, Serialize};

/// Three-rank trust rating assigned independently to each extracted field.
///
/// Ordered so that `Low < Medium < High`; merging two ratings takes the
/// higher rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Parse a model-reported confidence string, tolerating arbitrary case
    /// and surrounding whitespace. Anything unrecognized is `None` so the
    /// caller can apply its own presence-based default.
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn is_low(self) -> bool {
        self == Self::Low
    }
}

/// Per-field confidence for the three extracted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConfidence {
    pub name: ConfidenceLevel,
    pub expiry: ConfidenceLevel,
    pub category: ConfidenceLevel,
}

impl FieldConfidence {
    pub fn new(name: ConfidenceLevel, expiry: ConfidenceLevel, category: ConfidenceLevel) -> Self {
        Self {
            name,
            expiry,
            category,
        }
    }

    /// Merge two per-field ratings, keeping the higher rank per field.
    pub fn merged_with(self, other: FieldConfidence) -> FieldConfidence {
        FieldConfidence {
            name: self.name.max(other.name),
            expiry: self.expiry.max(other.expiry),
            category: self.category.max(other.category),
        }
    }

    pub fn any_low(self) -> bool {
        self.name.is_low() || self.expiry.is_low() || self.category.is_low()
    }
}
