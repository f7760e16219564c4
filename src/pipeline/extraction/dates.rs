//! Date parsing for label text.
//!
//! Printed dates arrive in every format a packaging line can emit:
//! ISO, `DD/MM/YYYY`, `MM/DD/YYYY`, two-digit years, textual months,
//! month-plus-year only, plus whatever OCR noise survived normalization.
//! Parsing tries an ordered ladder of explicit shapes (ISO first, so the
//! one unambiguous format never gets second-guessed) before falling back
//! to a generic `a/b/y` pattern with day/month disambiguation:
//!
//! - a component over 12 must be the day, wherever it sits,
//! - otherwise prefer day-first (`DD/MM`), a deliberate regional bias,
//! - for expiry-labeled dates, prefer the interpretation that lands in
//!   the future, because a believable expiry date is rarely in the past.
//!
//! Anything resolving outside years 2000..=2100 is treated as unparsed;
//! an obviously wrong OCR misread must not poison the fallback chain.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::normalize::normalize_ocr_text;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[/-](\d{1,2})[/-](\d{1,2})$").unwrap());

/// `15 mar 2026`, `3 september 26`
static TEXTUAL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s*([A-Za-z]+)\s*(\d{2,4})$").unwrap());

/// `mar 2026`, `march-26`, `sept/2026`
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)[\s/-]*(\d{2,4})$").unwrap());

/// Generic `a/b/y` numeric fallback.
static SLASH_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})$").unwrap());

/// Parse a date-like token with the default day-first bias.
pub fn parse(text: &str) -> Option<NaiveDate> {
    let value = clean_token(text);

    if let Some(caps) = ISO_DATE.captures(&value) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).filter(is_reasonable);
    }

    if let Some(caps) = TEXTUAL_DATE.captures(&value) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let year = expand_two_digit_year(caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(year, month, day).filter(is_reasonable);
    }

    if let Some(caps) = MONTH_YEAR.captures(&value) {
        if let Some(month) = month_from_name(&caps[1]) {
            let year = expand_two_digit_year(caps[2].parse().ok()?);
            return NaiveDate::from_ymd_opt(year, month, 1).filter(is_reasonable);
        }
    }

    if let Some((a, b, year)) = split_slash_like(&value) {
        return disambiguate_day_month(a, b, year);
    }

    None
}

/// Parse an expiry-labeled token, preferring the future interpretation of
/// an ambiguous `a/b/y` date. Only kicks in when both components could be
/// a month and they differ; everything else behaves exactly like
/// [`parse`].
pub fn parse_prefer_future(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let value = clean_token(text);

    if let Some((a, b, year)) = split_slash_like(&value) {
        return disambiguate_prefer_future(a, b, year, today);
    }

    parse(text)
}

/// Token cleanup shared by both entry points: character-confusion fixes,
/// `|` to `/`, dots between digits to `/`, remaining dots to spaces (so
/// `Mar.2026` can still month-name parse).
fn clean_token(text: &str) -> String {
    let value = normalize_ocr_text(text.trim()).replace('|', "/");
    let mut chars: Vec<char> = value.chars().collect();
    for i in 0..chars.len() {
        if chars[i] != '.' {
            continue;
        }
        let between_digits = i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
        chars[i] = if between_digits { '/' } else { ' ' };
    }
    chars.into_iter().collect::<String>().trim().to_string()
}

fn split_slash_like(value: &str) -> Option<(u32, u32, i32)> {
    let caps = SLASH_LIKE.captures(value)?;
    let a: u32 = caps[1].parse().ok()?;
    let b: u32 = caps[2].parse().ok()?;
    let year = expand_two_digit_year(caps[3].parse().ok()?);
    if a > 31 || b > 31 {
        return None;
    }
    Some((a, b, year))
}

/// Shared two-digit-year rule: `< 70` lands in 20xx, otherwise 19xx.
pub(crate) fn expand_two_digit_year(year: i32) -> i32 {
    if year < 100 {
        if year < 70 {
            2000 + year
        } else {
            1900 + year
        }
    } else {
        year
    }
}

/// Resolve `a/b/year` into a date with the day-first bias.
pub(crate) fn disambiguate_day_month(a: u32, b: u32, year: i32) -> Option<NaiveDate> {
    let month_range = 1..=12u32;

    if a > 12 && month_range.contains(&b) {
        return build_clamped(year, b, a);
    }
    if b > 12 && month_range.contains(&a) {
        return build_clamped(year, a, b);
    }
    if month_range.contains(&a) && month_range.contains(&b) {
        // Both plausible months: prefer DD/MM.
        return build_clamped(year, b, a);
    }
    if month_range.contains(&b) {
        return build_clamped(year, b, a);
    }
    None
}

/// Future-preferring variant used for expiry labels: when `DD/MM` lands in
/// the past but `MM/DD` lands today-or-later, take the future one.
pub(crate) fn disambiguate_prefer_future(
    a: u32,
    b: u32,
    year: i32,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let dd_mm = disambiguate_day_month(a, b, year);

    if (1..=12).contains(&a) && (1..=12).contains(&b) && a != b {
        let mm_dd = build_exact(year, a, b);
        match (dd_mm, mm_dd) {
            (Some(day_first), Some(month_first)) => {
                if day_first < today && month_first >= today {
                    return Some(month_first);
                }
            }
            (None, Some(month_first)) => return Some(month_first),
            _ => {}
        }
    }

    dd_mm
}

/// Build a date, clamping the day to the month's actual length.
fn build_clamped(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let max_day = days_in_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, max_day)).filter(is_reasonable)
}

/// Build a date only if it is exactly valid (no clamping).
fn build_exact(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).filter(is_reasonable)
}

pub(crate) fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
}

pub(crate) fn month_from_name(token: &str) -> Option<u32> {
    const MONTHS: [(&str, u32); 12] = [
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
    ];
    let lower = token.trim().to_ascii_lowercase();
    if lower.len() < 3 || !lower.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    MONTHS
        .iter()
        .find(|(abbr, _)| lower.starts_with(abbr))
        .map(|&(_, m)| m)
}

pub(crate) fn is_reasonable(date: &NaiveDate) -> bool {
    use chrono::Datelike;
    (2000..=2100).contains(&date.year())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn iso_takes_priority() {
        assert_eq!(parse("2026-01-05"), Some(date(2026, 1, 5)));
        assert_eq!(parse("2026/3/7"), Some(date(2026, 3, 7)));
    }

    #[test]
    fn dd_mm_bias_for_ambiguous_dates() {
        // Both sides could be a month: day-first wins.
        assert_eq!(parse("05/04/2026"), Some(date(2026, 4, 5)));
    }

    #[test]
    fn overflow_component_is_the_day() {
        assert_eq!(parse("25/03/2026"), Some(date(2026, 3, 25)));
        assert_eq!(parse("03/25/2026"), Some(date(2026, 3, 25)));
    }

    #[test]
    fn two_digit_year_pivot() {
        assert_eq!(parse("05/04/26"), Some(date(2026, 4, 5)));
        // 71 expands to 1971, which fails the range check.
        assert_eq!(parse("05/04/71"), None);
    }

    #[test]
    fn textual_month_forms() {
        assert_eq!(parse("15 Mar 2026"), Some(date(2026, 3, 15)));
        assert_eq!(parse("3 september 26"), Some(date(2026, 9, 3)));
        assert_eq!(parse("Mar 2026"), Some(date(2026, 3, 1)));
        assert_eq!(parse("Mar.2026"), Some(date(2026, 3, 1)));
    }

    #[test]
    fn dots_between_digits_act_as_slashes() {
        assert_eq!(parse("15.03.2026"), Some(date(2026, 3, 15)));
    }

    #[test]
    fn pipe_acts_as_slash() {
        assert_eq!(parse("15|03|2026"), Some(date(2026, 3, 15)));
    }

    #[test]
    fn ocr_noise_normalized_before_parsing() {
        assert_eq!(parse("2O26-01-O5"), Some(date(2026, 1, 5)));
        assert_eq!(parse("20Z6-01-05"), Some(date(2026, 1, 5)));
    }

    #[test]
    fn day_clamped_to_month_length() {
        // 31/02 cannot exist; day clamps to Feb 28.
        assert_eq!(parse("31/02/2026"), Some(date(2026, 2, 28)));
    }

    #[test]
    fn out_of_range_years_rejected() {
        assert_eq!(parse("05/04/1985"), None);
        assert_eq!(parse("2150-01-01"), None);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("not a date"), None);
        assert_eq!(parse("99/99/2026"), None);
    }

    #[test]
    fn prefer_future_swaps_when_dd_mm_is_past() {
        // 01/03/2026 read day-first is March 1; with today in June, the
        // day-first reading is past and month-first (Jan 3) is even
        // further past, so day-first stands.
        let today = date(2026, 6, 1);
        assert_eq!(
            parse_prefer_future("01/03/2026", today),
            Some(date(2026, 3, 1))
        );

        // 02/01/27 day-first is Jan 2, 2027 (future): kept as-is.
        let today = date(2026, 12, 15);
        let resolved = parse_prefer_future("02/01/27", today).unwrap();
        assert!(resolved >= today);

        // 03/08/2026 day-first is Aug 3 (past when today is Oct 1);
        // month-first Mar 8 is also past, so day-first stands.
        let today = date(2026, 10, 1);
        assert_eq!(
            parse_prefer_future("03/08/2026", today),
            Some(date(2026, 8, 3))
        );

        // 10/08/2026 day-first is Aug 10 (past when today is Sep 1) but
        // month-first Oct 8 is future: future wins.
        let today = date(2026, 9, 1);
        assert_eq!(
            parse_prefer_future("10/08/2026", today),
            Some(date(2026, 10, 8))
        );
    }

    #[test]
    fn prefer_future_idempotent_for_unambiguous_dates() {
        let today = date(2026, 6, 1);
        assert_eq!(
            parse_prefer_future("25/03/2026", today),
            Some(date(2026, 3, 25))
        );
        assert_eq!(
            parse_prefer_future("2026-01-05", today),
            Some(date(2026, 1, 5))
        );
    }
}
