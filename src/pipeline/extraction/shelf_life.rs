//! Category shelf-life fallbacks.
//!
//! When a scan yields no date evidence at all, the expiry is estimated
//! from the product category, refined by keywords in the product name
//! ("frozen chicken" keeps far longer than fresh chicken). The table is
//! total: unknown categories get a conservative 30 days, and the result
//! is always strictly in the future.

use chrono::{Days, NaiveDate};

use crate::models::today;

/// Name-keyword overrides, checked in order before the category default.
/// First matching row wins.
const KEYWORD_OVERRIDES: &[(&str, &[&str], u64)] = &[
    ("Dairy", &["uht", "long life"], 90),
    ("Dairy", &["parmesan", "aged"], 60),
    ("Dairy", &["yogurt", "curd"], 14),
    ("Meat", &["frozen"], 90),
    ("Meat", &["canned"], 365),
    ("Meat", &["dried", "jerky"], 180),
    ("Fruits", &["dried", "raisin"], 180),
    ("Fruits", &["canned"], 365),
    ("Fruits", &["jam", "preserve"], 180),
    ("Vegetables", &["canned"], 365),
    ("Vegetables", &["frozen"], 90),
    ("Vegetables", &["pickled", "pickle"], 180),
    ("Bakery Item", &["frozen"], 90),
    ("Beverages", &["fresh"], 7),
    ("Beverages", &["uht", "tetra"], 180),
];

const CATEGORY_DEFAULTS: &[(&str, u64)] = &[
    ("Dairy", 14),
    ("Meat", 3),
    ("Fruits", 5),
    ("Vegetables", 7),
    ("Bakery Item", 5),
    ("Snacks", 90),
    ("Grains", 180),
    ("Beverages", 90),
    ("Condiments", 180),
    ("Frozen", 90),
];

const UNKNOWN_CATEGORY_DAYS: u64 = 30;

/// Estimated expiry for a product with no date evidence, as of today.
pub fn fallback_expiry(category: &str, product_name: Option<&str>) -> NaiveDate {
    fallback_expiry_as_of(category, product_name, today())
}

/// Deterministic variant of [`fallback_expiry`] with an explicit clock.
pub fn fallback_expiry_as_of(
    category: &str,
    product_name: Option<&str>,
    today: NaiveDate,
) -> NaiveDate {
    today + Days::new(shelf_life_days(category, product_name))
}

/// Shelf-life in days for a category and optional product-name hint.
pub fn shelf_life_days(category: &str, product_name: Option<&str>) -> u64 {
    let name = product_name.unwrap_or_default().to_lowercase();

    for (rule_category, keywords, days) in KEYWORD_OVERRIDES {
        if *rule_category == category && keywords.iter().any(|k| name.contains(k)) {
            return *days;
        }
    }

    CATEGORY_DEFAULTS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|&(_, days)| days)
        .unwrap_or(UNKNOWN_CATEGORY_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn frozen_meat_outlasts_fresh_meat() {
        assert_eq!(
            fallback_expiry_as_of("Meat", Some("frozen chicken"), base()),
            base() + Days::new(90)
        );
        assert_eq!(
            fallback_expiry_as_of("Meat", Some("fresh chicken"), base()),
            base() + Days::new(3)
        );
    }

    #[test]
    fn uht_dairy_override() {
        assert_eq!(shelf_life_days("Dairy", Some("UHT Milk 1L")), 90);
        assert_eq!(shelf_life_days("Dairy", Some("Whole Milk")), 14);
        assert_eq!(shelf_life_days("Dairy", Some("Aged Cheddar")), 60);
    }

    #[test]
    fn canned_goods_keep_a_year() {
        assert_eq!(shelf_life_days("Vegetables", Some("canned corn")), 365);
        assert_eq!(shelf_life_days("Fruits", Some("Canned Peaches")), 365);
        assert_eq!(shelf_life_days("Meat", Some("canned tuna")), 365);
    }

    #[test]
    fn pickled_and_preserved_overrides() {
        assert_eq!(shelf_life_days("Vegetables", Some("pickled onions")), 180);
        assert_eq!(shelf_life_days("Fruits", Some("strawberry jam")), 180);
        assert_eq!(shelf_life_days("Beverages", Some("tetra pack juice")), 180);
    }

    #[test]
    fn category_defaults() {
        assert_eq!(shelf_life_days("Snacks", None), 90);
        assert_eq!(shelf_life_days("Grains", None), 180);
        assert_eq!(shelf_life_days("Condiments", None), 180);
        assert_eq!(shelf_life_days("Frozen", None), 90);
    }

    #[test]
    fn unknown_category_gets_thirty_days() {
        assert_eq!(shelf_life_days("General", None), 30);
        assert_eq!(shelf_life_days("Homemade", Some("lasagna")), 30);
    }

    #[test]
    fn result_is_always_in_the_future() {
        for (category, _) in CATEGORY_DEFAULTS {
            let expiry = fallback_expiry_as_of(category, None, base());
            assert!(expiry > base(), "{category} fallback not in the future");
        }
    }
}
