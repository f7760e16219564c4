//! OCR character-confusion normalization.
//!
//! Camera OCR routinely confuses glyphs that look alike on printed labels:
//! `O` for `0`, `S` for `5`, `Z` for `2`, `l`/`I` for `1`. These fixes are
//! applied text-wide before any date or field pattern runs, so every
//! downstream grammar sees repaired digits.

/// Normalize raw OCR output before pattern matching.
///
/// Applies, in order:
/// 1. carriage returns to newlines,
/// 2. slash/dash-adjacent letter fixes (`O/` to `0/`, `/l` to `/1`, ...),
/// 3. between-digit letter fixes (`S` to 5, `B` to 8, `G` to 6, `D` to 0,
///    `I`/`l` to 1),
/// 4. year-context fixes (`2O26` to `2026`, `20Z6` to `2026`).
pub fn normalize_ocr_text(text: &str) -> String {
    let mut normalized = text.replace('\r', "\n");

    // Letters glued to date separators are almost always misread digits.
    for (from, to) in [
        ("O/", "0/"),
        ("/O", "/0"),
        ("O-", "0-"),
        ("-O", "-0"),
        ("l/", "1/"),
        ("/l", "/1"),
        ("I/", "1/"),
        ("/I", "/1"),
    ] {
        normalized = normalized.replace(from, to);
    }

    let mut chars: Vec<char> = normalized.chars().collect();
    fix_between_digits(&mut chars);
    fix_year_context(&mut chars);
    chars.into_iter().collect()
}

/// Replace confusable letters that sit between two digits.
fn fix_between_digits(chars: &mut [char]) {
    if chars.len() < 3 {
        return;
    }
    for i in 1..chars.len() - 1 {
        if !chars[i - 1].is_ascii_digit() || !chars[i + 1].is_ascii_digit() {
            continue;
        }
        chars[i] = match chars[i] {
            'S' => '5',
            'B' => '8',
            'G' => '6',
            'D' => '0',
            'I' | 'l' => '1',
            c => c,
        };
    }
}

/// Repair `O`/`Z` misreads inside 20xx year tokens: `2O26`, `20O6`,
/// `20Z6`, `2Z26`.
fn fix_year_context(chars: &mut [char]) {
    for i in 0..chars.len() {
        let prev = i.checked_sub(1).and_then(|j| chars.get(j).copied());
        let prev2 = i.checked_sub(2).and_then(|j| chars.get(j).copied());
        let next = chars.get(i + 1).copied();
        let next2 = chars.get(i + 2).copied();

        let after_2 = prev == Some('2');
        let after_20 = prev2 == Some('2') && prev == Some('0');
        let before_2digit =
            next == Some('2') && next2.is_some_and(|c| c.is_ascii_digit());
        let before_digit = next.is_some_and(|c| c.is_ascii_digit());

        match chars[i] {
            'O' if (after_2 && before_2digit) || (after_20 && before_digit) => {
                chars[i] = '0';
            }
            'Z' if after_20 && before_digit => chars[i] = '2',
            'Z' if after_2 && before_2digit => chars[i] = '0',
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_o_in_year_becomes_zero() {
        assert_eq!(normalize_ocr_text("2O26"), "2026");
        assert_eq!(normalize_ocr_text("EXP 2O26-01-O5"), "EXP 2026-01-05");
    }

    #[test]
    fn letter_z_in_year_becomes_two() {
        assert_eq!(normalize_ocr_text("20Z6"), "2026");
    }

    #[test]
    fn s_between_digits_becomes_five() {
        assert_eq!(normalize_ocr_text("1S/03/2026"), "15/03/2026");
    }

    #[test]
    fn b_and_g_between_digits() {
        assert_eq!(normalize_ocr_text("202B"), "2028");
        assert_eq!(normalize_ocr_text("2G/07/26"), "2G/07/26"); // G needs digits both sides
        assert_eq!(normalize_ocr_text("1G2"), "162");
    }

    #[test]
    fn slash_adjacent_letters_fixed() {
        assert_eq!(normalize_ocr_text("1O/O3/2026"), "10/03/2026");
        assert_eq!(normalize_ocr_text("1l/03/26"), "11/03/26");
    }

    #[test]
    fn consecutive_confusions_all_repaired() {
        assert_eq!(normalize_ocr_text("1S2S3"), "15253");
    }

    #[test]
    fn plain_words_untouched() {
        assert_eq!(normalize_ocr_text("BEST BEFORE"), "BEST BEFORE");
        assert_eq!(normalize_ocr_text("SODA"), "SODA");
    }

    #[test]
    fn carriage_returns_become_newlines() {
        assert_eq!(normalize_ocr_text("MILK\r\nEXP"), "MILK\n\nEXP");
    }
}
