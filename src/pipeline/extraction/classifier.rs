//! Optional image-classifier hook for the local extraction path.
//!
//! The hook exists so a vision model (on-device or remote) can supply a
//! product guess when the label text alone says nothing useful. The
//! shipped default is [`NullClassifier`]: classification stays a
//! pluggable capability, not a hardcoded branch.

use crate::models::{GENERAL_CATEGORY, UNKNOWN_PRODUCT};

/// A product guess produced from image appearance alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductGuess {
    pub product_name: String,
    pub category_name: String,
}

impl ProductGuess {
    pub fn new(product_name: impl Into<String>, category_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            category_name: category_name.into(),
        }
    }
}

/// Classifies a product photo into a (name, category) guess.
pub trait ImageClassifier: Send + Sync {
    /// `None` when the classifier is disabled or cannot identify a food
    /// product in the image.
    fn classify(&self, image: &[u8]) -> Option<ProductGuess>;
}

/// Disabled classifier: always abstains.
pub struct NullClassifier;

impl ImageClassifier for NullClassifier {
    fn classify(&self, _image: &[u8]) -> Option<ProductGuess> {
        None
    }
}

/// Fixed-answer classifier for tests.
pub struct FixedClassifier {
    guess: Option<ProductGuess>,
}

impl FixedClassifier {
    pub fn new(product_name: &str, category_name: &str) -> Self {
        Self {
            guess: Some(ProductGuess::new(product_name, category_name)),
        }
    }

    pub fn abstaining() -> Self {
        Self { guess: None }
    }
}

impl ImageClassifier for FixedClassifier {
    fn classify(&self, _image: &[u8]) -> Option<ProductGuess> {
        self.guess.clone()
    }
}

/// Map a raw classifier label (e.g. an ImageNet-style class name) to a
/// product name and category. Intended for [`ImageClassifier`]
/// implementations that emit free-form labels.
pub fn map_label_to_product(label: &str) -> Option<ProductGuess> {
    const TABLE: &[(&[&str], &str, &str)] = &[
        (&["milk", "carton"], "Milk", "Dairy"),
        (&["cheese", "yogurt", "butter", "cream"], "Dairy Product", "Dairy"),
        (&["egg"], "Eggs", "Dairy"),
        (&["bread", "bagel", "loaf", "toast"], "Bread", "Bakery Item"),
        (
            &["cake", "croissant", "muffin", "pretzel", "dough"],
            "Bakery Product",
            "Bakery Item",
        ),
        (&["tomato"], "Tomato", "Vegetables"),
        (&["onion"], "Onion", "Vegetables"),
        (&["potato"], "Potato", "Vegetables"),
        (&["carrot"], "Carrot", "Vegetables"),
        (&["broccoli"], "Broccoli", "Vegetables"),
        (&["cucumber"], "Cucumber", "Vegetables"),
        (&["pepper", "capsicum"], "Pepper", "Vegetables"),
        (&["mushroom"], "Mushroom", "Vegetables"),
        (&["cabbage"], "Cabbage", "Vegetables"),
        (&["lettuce"], "Lettuce", "Vegetables"),
        (&["banana"], "Banana", "Fruits"),
        (&["apple"], "Apple", "Fruits"),
        (&["orange"], "Orange", "Fruits"),
        (&["lemon"], "Lemon", "Fruits"),
        (&["strawberry"], "Strawberry", "Fruits"),
        (&["pineapple"], "Pineapple", "Fruits"),
        (&["grape"], "Grapes", "Fruits"),
        (&["watermelon", "melon"], "Melon", "Fruits"),
        (&["peach"], "Peach", "Fruits"),
        (&["pear"], "Pear", "Fruits"),
        (&["mango"], "Mango", "Fruits"),
        (&["chocolate"], "Chocolate", "Snacks"),
        (&["biscuit", "cookie", "cracker"], "Biscuit", "Snacks"),
        (&["chips", "crisp"], "Chips", "Snacks"),
        (&["candy", "toffee", "gummy"], "Candy", "Snacks"),
        (&["ice cream", "popsicle"], "Ice Cream", "Frozen"),
        (&["chicken", "hen"], "Chicken", "Meat"),
        (&["beef", "steak"], "Beef", "Meat"),
        (&["fish", "tuna", "salmon"], "Fish", "Meat"),
        (&["pork", "ham", "bacon", "sausage"], "Pork", "Meat"),
        (&["meat", "lamb", "mutton"], "Meat Product", "Meat"),
        (&["shrimp", "prawn", "lobster"], "Seafood", "Meat"),
        (&["rice"], "Rice", "Grains"),
        (&["pasta", "spaghetti", "noodle"], "Pasta", "Grains"),
        (&["cereal", "oat", "granola"], "Cereal", "Grains"),
        (&["juice"], "Juice", "Beverages"),
        (&["soda", "cola"], "Soda", "Beverages"),
        (&["water", "bottle"], "Water", "Beverages"),
        (&["coffee"], "Coffee", "Beverages"),
        (&["tea"], "Tea", "Beverages"),
        (
            &["sauce", "ketchup", "mustard", "mayonnaise"],
            "Condiment",
            "Condiments",
        ),
        (&["honey"], "Honey", "Condiments"),
        (&["jam", "jelly"], "Jam", "Condiments"),
    ];

    let lower = label.to_lowercase();
    TABLE
        .iter()
        .find(|(keywords, _, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|&(_, name, category)| ProductGuess::new(name, category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_classifier_abstains() {
        assert_eq!(NullClassifier.classify(b"any image"), None);
    }

    #[test]
    fn fixed_classifier_returns_guess() {
        let classifier = FixedClassifier::new("Milk", "Dairy");
        let guess = classifier.classify(b"img").unwrap();
        assert_eq!(guess.product_name, "Milk");
        assert_eq!(guess.category_name, "Dairy");
    }

    #[test]
    fn label_mapping_hits() {
        let guess = map_label_to_product("a carton of milk").unwrap();
        assert_eq!(guess.product_name, "Milk");
        assert_eq!(guess.category_name, "Dairy");

        let guess = map_label_to_product("Granny Smith apple").unwrap();
        assert_eq!(guess.category_name, "Fruits");
    }

    #[test]
    fn label_mapping_misses() {
        assert_eq!(map_label_to_product("cardboard box"), None);
    }

    #[test]
    fn unknown_constants_are_not_mapped() {
        // Guards against accidentally adding sentinel strings to the table.
        assert_eq!(map_label_to_product(UNKNOWN_PRODUCT), None);
        assert_eq!(map_label_to_product(GENERAL_CATEGORY), None);
    }
}
