//! Local, regex-driven extraction over raw OCR text.
//!
//! Pure functions of the input text plus "today": no network, no locks,
//! no shared state. The one pluggable seam is the optional
//! [`ImageClassifier`] hook.

pub mod classifier;
pub mod dates;
pub mod duration;
pub mod local;
pub mod normalize;
pub mod shelf_life;

pub use classifier::{map_label_to_product, FixedClassifier, ImageClassifier, NullClassifier, ProductGuess};
pub use local::LocalTextExtractor;
pub use normalize::normalize_ocr_text;
