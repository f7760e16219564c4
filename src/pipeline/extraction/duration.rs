//! Shelf-life duration phrases: "best before 6 months from mfg".
//!
//! Many labels never print an absolute expiry date; they state a duration
//! relative to manufacturing or packaging. The grammar here covers the
//! real-world phrasing zoo (use within, shelf life of, good for, keeps
//! for, stays fresh for, ...), quantity tokens written as digits,
//! decimals, unicode or mixed fractions, or English number words, and an
//! optional anchor keyword. Callers supply the anchor date; when no
//! manufacturing date is known the extractor passes "today" explicitly.

use std::sync::LazyLock;

use chrono::{Days, Months, NaiveDate};
use regex::Regex;

use super::dates::{days_in_month, expand_two_digit_year, month_from_name};

const UNIT_ALTERNATION: &str = "weeks|week|months|month|mons|mon|days|day|years|year|yrs|yr|hours|hrs";

const QUANTITY_ALTERNATION: &str = concat!(
    r"\d{1,3}(?:[½¾]|\s+\d\s*/\s*\d)?(?:\.\d+)?",
    r"|twenty\s*one|twenty\s*two|twenty\s*three|twenty\s*four|twenty",
    r"|one|two|three|four|five|six|seven|eight|nine|ten",
    r"|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen",
    r"|thirty|forty\s*five|sixty|ninety",
);

const LEAD_IN_ALTERNATION: &str = concat!(
    r"best\s*(?:if\s+used\s+)?before|use\s*(?:with)?in|consume\s*(?:with)?in",
    r"|shelf\s*life\s*(?:of|is|:)?|has\s+a\s+shelf\s+life\s+of|valid\s*(?:for|upto)|good\s*for",
    r"|keeps?\s*(?:for|up\s*to)|store\s*(?:for|up\s*to)|stays?\s*fresh\s*(?:for|up\s*to)?",
    r"|lasts?\s*(?:for|up\s*to)?|not\s+to\s+be\s+used\s+after|expir(?:y|es?)\s*(?:in)?",
);

const ANCHOR_ALTERNATION: &str = concat!(
    r"mfg|mfd|manufacture|manufacturing|packed|packaging|packing|pkg|pkd|production|opening",
    r"|date\s*of\s*(?:mfg|manufacture|packing|packaging|production)",
);

/// Full duration phrase: lead-in, quantity, unit, optional "to Y <unit>"
/// second bound, optional anchor keyword.
static DURATION_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)(?:{lead})\s*(?:within\s*|up\s*to\s*)?({quantity})\s*({unit})(?:\s*(?:to|-)\s*\d{{1,3}}\s*(?:{unit}))?\s*(?:from|after|of|since|post)?\s*(?:{anchor})?",
        lead = LEAD_IN_ALTERNATION,
        quantity = QUANTITY_ALTERNATION,
        unit = UNIT_ALTERNATION,
        anchor = ANCHOR_ALTERNATION,
    );
    Regex::new(&pattern).unwrap()
});

/// Bare "N <unit>" with no lead-in phrase, for text the vision model has
/// already isolated as a best-before clause.
static BARE_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?i)({quantity})\s*({unit})",
        quantity = QUANTITY_ALTERNATION,
        unit = UNIT_ALTERNATION,
    );
    Regex::new(&pattern).unwrap()
});

/// "best before end of <month> <year>"; the lead-in is optional so text
/// the vision model has already isolated as a best-before clause still
/// matches.
static END_OF_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:best\s*before\s*)?(?:the\s*)?end\s*(?:of)?\s*(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\s*(\d{2,4})",
    )
    .unwrap()
});

/// Year-only expiry: "expires 2027", "use by 2027".
static YEAR_ONLY_EXPIRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:exp(?:iry|ire)?|expires?|best\s*before|use\s*by)\s*[:\-]?\s*(20[2-9]\d)\b")
        .unwrap()
});

static MIXED_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(\d+)\s*/\s*(\d+)$").unwrap());

/// Derive an absolute expiry from a duration phrase, anchored at
/// `anchor_date` (the manufacturing date, or "today" when none is known).
pub fn derive_from_duration(text: &str, anchor_date: NaiveDate) -> Option<NaiveDate> {
    let caps = DURATION_PHRASE.captures(text)?;
    let value = parse_quantity(&caps[1])?;
    if value <= 0.0 {
        return None;
    }
    add_duration(anchor_date, value, &caps[2])
}

/// Like [`derive_from_duration`] but without requiring a lead-in phrase.
pub fn derive_bare_duration(text: &str, anchor_date: NaiveDate) -> Option<NaiveDate> {
    let caps = BARE_DURATION.captures(text)?;
    let value = parse_quantity(&caps[1])?;
    if value <= 0.0 {
        return None;
    }
    add_duration(anchor_date, value, &caps[2])
}

/// "best before end of <month> <year>" resolves to the last calendar day
/// of that month.
pub fn derive_from_end_of_month(text: &str) -> Option<NaiveDate> {
    let caps = END_OF_MONTH.captures(text)?;
    let month = month_from_name(&caps[1])?;
    let year = expand_two_digit_year(caps[2].parse().ok()?);
    if !(2000..=2100).contains(&year) {
        return None;
    }
    let last_day = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, last_day)
}

/// A year-only expiry phrase resolves to December 31 of that year. The
/// pattern itself constrains the year to 2020..=2099.
pub fn derive_from_year_only(text: &str) -> Option<NaiveDate> {
    let caps = YEAR_ONLY_EXPIRY.captures(text)?;
    let year: i32 = caps[1].parse().ok()?;
    NaiveDate::from_ymd_opt(year, 12, 31)
}

/// Apply `value` of `unit` to an anchor date. Days and weeks round up,
/// months and years are calendar-aware, hours convert to at least one
/// day.
pub fn add_duration(anchor: NaiveDate, value: f64, unit: &str) -> Option<NaiveDate> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "day" | "days" => anchor.checked_add_days(Days::new(value.ceil() as u64)),
        "week" | "weeks" => anchor.checked_add_days(Days::new((value * 7.0).ceil() as u64)),
        "month" | "months" | "mon" | "mons" => {
            anchor.checked_add_months(Months::new(value.ceil() as u32))
        }
        "year" | "years" | "yr" | "yrs" => {
            anchor.checked_add_months(Months::new(12 * value.ceil() as u32))
        }
        "hrs" | "hours" => {
            let days = ((value / 24.0).ceil() as u64).max(1);
            anchor.checked_add_days(Days::new(days))
        }
        _ => None,
    }
}

/// Parse a quantity token: digits, decimals, unicode fractions (`1½`),
/// mixed fractions (`1 1/2`), or English number words up to "ninety".
pub(crate) fn parse_quantity(token: &str) -> Option<f64> {
    let t = token
        .trim()
        .replace('½', ".5")
        .replace('¾', ".75")
        .replace('⅓', ".33")
        .replace('⅔', ".67");

    if let Some(caps) = MIXED_FRACTION.captures(&t) {
        let whole: f64 = caps[1].parse().ok()?;
        let numerator: f64 = caps[2].parse().ok()?;
        let denominator: f64 = caps[3].parse().ok()?;
        if denominator <= 0.0 {
            return None;
        }
        return Some(whole + numerator / denominator);
    }

    if let Ok(n) = t.parse::<f64>() {
        return Some(n);
    }

    let word = t.to_ascii_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let value = match word.as_str() {
        "one" => 1.0,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "eleven" => 11.0,
        "twelve" => 12.0,
        "thirteen" => 13.0,
        "fourteen" => 14.0,
        "fifteen" => 15.0,
        "sixteen" => 16.0,
        "seventeen" => 17.0,
        "eighteen" => 18.0,
        "nineteen" => 19.0,
        "twenty" => 20.0,
        "twenty one" | "twentyone" => 21.0,
        "twenty two" | "twentytwo" => 22.0,
        "twenty three" | "twentythree" => 23.0,
        "twenty four" | "twentyfour" => 24.0,
        "thirty" => 30.0,
        "forty five" | "fortyfive" => 45.0,
        "sixty" => 60.0,
        "ninety" => 90.0,
        _ => return None,
    };
    Some(value)
}
