//! Identifier and number normalization shared by every allocation stage.
//!
//! Inputs arrive from spreadsheets that freely mix ASCII, Persian, and
//! Arabic-Indic digits, Arabic letter variants, and zero-width characters.
//! Everything downstream (join-key coercion, national-code matching, mentor
//! ranking) relies on the folded forms produced here.

use serde::{Deserialize, Serialize};

const ZERO_WIDTH: [char; 2] = ['\u{200c}', '\u{200d}'];

/// Fold Persian (`۰`–`۹`) and Arabic-Indic (`٠`–`٩`) digits to ASCII.
pub fn fold_digits(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '\u{06f0}'..='\u{06f9}' => char::from(b'0' + (ch as u32 - 0x06f0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (ch as u32 - 0x0660) as u8),
            other => other,
        })
        .collect()
}

/// Canonicalize an identifier: digits folded, Arabic letter variants mapped
/// to their Persian forms, zero-width joiners removed, and surrounding
/// whitespace trimmed.
pub fn normalize_text(value: &str) -> String {
    let folded = fold_digits(value);
    let mapped: String = folded
        .chars()
        .filter(|ch| !ZERO_WIDTH.contains(ch))
        .map(|ch| match ch {
            'ي' | 'ى' => 'ی',
            'ك' => 'ک',
            other => other,
        })
        .collect();
    mapped.trim().to_string()
}

/// Normalize a national code to its canonical ten-digit form.
///
/// Common separators (`-`, spaces) are stripped in this context only.
/// Anything that does not reduce to exactly ten ASCII digits is rejected.
pub fn normalize_national_code(value: &str) -> Option<String> {
    let cleaned: String = normalize_text(value)
        .chars()
        .filter(|ch| *ch != '-' && !ch.is_whitespace())
        .collect();
    if cleaned.len() == 10 && cleaned.chars().all(|ch| ch.is_ascii_digit()) {
        Some(cleaned)
    } else {
        None
    }
}

/// Coerce a raw cell to the integer form required for join-key matching.
///
/// Accepts folded digits with an optional sign and a spreadsheet-style
/// trailing `.0` fraction. Returns `None` for anything else; the caller
/// turns that into a per-student data error, never a panic.
pub fn coerce_join_int(value: &str) -> Option<i64> {
    let cleaned = normalize_text(value);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(parsed) = cleaned.parse::<i64>() {
        return Some(parsed);
    }
    let parsed = cleaned.parse::<f64>().ok()?;
    if parsed.is_finite() && parsed.fract() == 0.0 && parsed.abs() < i64::MAX as f64 {
        Some(parsed as i64)
    } else {
        None
    }
}

/// Split a multi-valued school cell on the common delimiters and trim.
pub fn split_school_tokens(value: &str) -> Vec<String> {
    value
        .split([',', ';', '|'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Natural-order key for mentor identifiers.
///
/// Decomposition rule: the longest non-digit prefix followed by a trailing
/// digit run. `EMP-2` sorts before `EMP-10`, and IDs sharing a numeric value
/// fall back to raw lexicographic order on the normalized string, so
/// `EMP-010` precedes `EMP-10`. Field order carries the comparison: prefix,
/// then numeric value, then raw.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub prefix: String,
    pub number: u64,
    pub raw: String,
}

/// Build the [`NaturalKey`] for an identifier.
///
/// Identifiers without a trailing digit run key as `(whole, 0, whole)` so
/// the ordering stays total. Comparison is case-insensitive; the lowered
/// normalized string is kept as the final tie-breaker.
pub fn natural_key(id: &str) -> NaturalKey {
    let raw = normalize_text(id).to_lowercase();
    let digit_start = raw
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(index, _)| index);

    match digit_start {
        Some(start) if start < raw.len() => {
            let (prefix, digits) = raw.split_at(start);
            match digits.parse::<u64>() {
                Ok(number) => NaturalKey {
                    prefix: prefix.to_string(),
                    number,
                    raw: raw.clone(),
                },
                // Digit run too long for u64: treat as undecomposable.
                Err(_) => NaturalKey {
                    prefix: raw.clone(),
                    number: 0,
                    raw,
                },
            }
        }
        _ => NaturalKey {
            prefix: raw.clone(),
            number: 0,
            raw,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_persian_and_arabic_indic_digits() {
        assert_eq!(fold_digits("۱۲۳"), "123");
        assert_eq!(fold_digits("٤٥٦"), "456");
        assert_eq!(fold_digits("abc789"), "abc789");
    }

    #[test]
    fn normalize_text_maps_arabic_letters_and_strips_zero_width() {
        assert_eq!(normalize_text("علي"), "علی");
        assert_eq!(normalize_text("كریم"), "کریم");
        assert_eq!(normalize_text("  س\u{200c}لام  "), "سلام");
    }

    #[test]
    fn national_code_requires_ten_digits() {
        assert_eq!(
            normalize_national_code("001-234 5678"),
            Some("0012345678".to_string())
        );
        assert_eq!(
            normalize_national_code("۰۰۱۲۳۴۵۶۷۸"),
            Some("0012345678".to_string())
        );
        assert_eq!(normalize_national_code("12345"), None);
        assert_eq!(normalize_national_code("12345678901"), None);
        assert_eq!(normalize_national_code("12345abcde"), None);
    }

    #[test]
    fn coerce_join_int_handles_folded_digits_and_fractions() {
        assert_eq!(coerce_join_int("۱۲۰۱"), Some(1201));
        assert_eq!(coerce_join_int(" 7 "), Some(7));
        assert_eq!(coerce_join_int("12.0"), Some(12));
        assert_eq!(coerce_join_int("12.5"), None);
        assert_eq!(coerce_join_int(""), None);
        assert_eq!(coerce_join_int("abc"), None);
    }

    #[test]
    fn school_tokens_split_on_common_delimiters() {
        assert_eq!(
            split_school_tokens("123, 456;789|0"),
            vec!["123", "456", "789", "0"]
        );
        assert!(split_school_tokens("  ").is_empty());
    }

    #[test]
    fn natural_key_orders_numerically_then_raw() {
        let two = natural_key("EMP-2");
        let ten = natural_key("EMP-10");
        let padded_ten = natural_key("EMP-010");
        assert!(two < ten);
        assert!(two < padded_ten);
        assert!(padded_ten < ten, "equal numbers fall back to raw order");
    }

    #[test]
    fn natural_key_without_digits_uses_whole_string() {
        let key = natural_key("support");
        assert_eq!(key.prefix, "support");
        assert_eq!(key.number, 0);
        assert_eq!(key.raw, "support");
    }

    #[test]
    fn natural_key_sorts_p_series_in_numeric_order() {
        let mut keys = vec![natural_key("P-10"), natural_key("P-1"), natural_key("P-2")];
        keys.sort();
        let raws: Vec<&str> = keys.iter().map(|key| key.raw.as_str()).collect();
        assert_eq!(raws, vec!["p-1", "p-2", "p-10"]);
    }
}
