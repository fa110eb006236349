//! Shape classifiers for cell text.
//!
//! All disambiguation in the pipeline that does not go through an external
//! service is purely shape-based: no currency normalization, no numeric
//! parsing, no mutation of the token text. These helpers answer the few
//! shape questions the stages ask.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a number written with standard thousands/decimal separators,
/// e.g. "19.573.311", "1,250.00", "117439866".
static SEPARATED_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{1,2})?$").expect("separated-number regex")
});

/// Returns true when the text is amount-shaped: either digit-majority or a
/// single token matching the standard separator pattern. A currency prefix
/// such as "Rp" or "$" does not disqualify the text; it only has to lose the
/// digit majority for the shape test to fail.
pub fn is_numeric_shaped(text: &str) -> bool {
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    if digits > letters {
        return true;
    }
    text.split_whitespace()
        .any(|tok| SEPARATED_NUMBER_RE.is_match(tok))
}

/// Returns true when the text is digits only (whitespace between tokens
/// allowed), the preferred shape for a quantity cell.
pub fn is_pure_digits(text: &str) -> bool {
    let mut saw_digit = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            saw_digit = true;
        } else if !c.is_whitespace() {
            return false;
        }
    }
    saw_digit
}

/// Returns true when the text is a short alphabetic unit marker such as
/// "PAX" or "pcs".
pub fn is_short_alpha(text: &str, max_chars: usize) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= max_chars
        && trimmed.chars().all(|c| c.is_alphabetic() || c == '/' || c == '.')
}

/// Fraction of alphanumeric characters that are letters. Zero when the text
/// carries no letters or digits at all.
pub fn letter_ratio(text: &str) -> f32 {
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    let total = letters + digits;
    if total == 0 {
        return 0.0;
    }
    letters as f32 / total as f32
}

/// Truncates `text` to at most `max_chars` characters, appending an ellipsis
/// marker when anything was cut. Used for compact service payloads.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated_numbers_are_numeric_shaped() {
        assert!(is_numeric_shaped("19.573.311"));
        assert!(is_numeric_shaped("1,250.00"));
        assert!(is_numeric_shaped("117439866"));
    }

    #[test]
    fn currency_prefix_keeps_digit_majority() {
        // "Rp 19.573.311": 8 digits vs 2 letters.
        assert!(is_numeric_shaped("Rp 19.573.311"));
        assert!(is_numeric_shaped("$ 1,250.00"));
    }

    #[test]
    fn worded_values_are_not_numeric_shaped() {
        assert!(!is_numeric_shaped("Fifty Rupiah Sub"));
        assert!(!is_numeric_shaped("PAX"));
        assert!(!is_numeric_shaped(""));
    }

    #[test]
    fn pure_digit_detection() {
        assert!(is_pure_digits("1"));
        assert!(is_pure_digits("12 3"));
        assert!(!is_pure_digits("1.5"));
        assert!(!is_pure_digits("two"));
        assert!(!is_pure_digits("   "));
    }

    #[test]
    fn short_alpha_units() {
        assert!(is_short_alpha("PAX", 10));
        assert!(is_short_alpha("pcs.", 10));
        assert!(is_short_alpha("m/s", 10));
        assert!(!is_short_alpha("extraordinarily", 10));
        assert!(!is_short_alpha("5kg", 10));
        assert!(!is_short_alpha("", 10));
    }

    #[test]
    fn letter_ratio_bounds() {
        assert_eq!(letter_ratio("1234"), 0.0);
        assert_eq!(letter_ratio("abcd"), 1.0);
        assert!((letter_ratio("ab12") - 0.5).abs() < 1e-6);
        assert_eq!(letter_ratio("--//--"), 0.0);
    }

    #[test]
    fn truncation_preserves_short_text() {
        assert_eq!(truncate_chars("short", 10), "short");
        let long = truncate_chars("a".repeat(50).as_str(), 10);
        assert_eq!(long.chars().count(), 10);
        assert!(long.ends_with('…'));
    }
}
