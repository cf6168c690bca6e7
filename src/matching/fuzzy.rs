//! String and phone-number similarity primitives
//!
//! All scores are in [0, 1]. Strings are case-folded and trimmed before
//! comparison; phone numbers are reduced to their digits.

/// Shortest and longest digit strings accepted as phone numbers (E.164 max)
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Score for numbers that are probably, but not certainly, the same line
const LIKELY_SAME_NUMBER: f64 = 0.9;

/// Classic edit distance (insert, delete, substitute all cost 1), over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Normalized edit-distance similarity.
///
/// Two empty strings are a vacuous match (1.0); one empty string never
/// matches anything (0.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// [`similarity`] for optional attributes; a missing side scores 0.0
pub fn similarity_opt(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => similarity(a, b),
        _ => 0.0,
    }
}

/// Digits only: `"+1 (555) 123-4567"` -> `"15551234567"`
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Whether a phone number carries formatting punctuation (parentheses,
/// hyphen or space)
pub fn has_formatting(phone: &str) -> bool {
    phone.chars().any(|c| matches!(c, '(' | ')' | '-' | ' '))
}

/// Drop a single leading `1` (North American country code), whatever the length
fn strip_country_code(digits: &str) -> &str {
    digits.strip_prefix('1').unwrap_or(digits)
}

/// Compare two phone numbers.
///
/// - Either side outside 7..=15 digits: 0.0
/// - Same digits: 1.0
/// - Same 10-digit number once a leading `1` is dropped: 1.0 if either input
///   carried formatting punctuation, else 0.9
/// - One digit string contains the other: 0.9
/// - Otherwise: [`similarity`] of the digit strings
pub fn compare_phones(a: &str, b: &str) -> f64 {
    let digits_a = normalize_phone(a);
    let digits_b = normalize_phone(b);

    let valid = |d: &str| (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&d.len());
    if !valid(&digits_a) || !valid(&digits_b) {
        return 0.0;
    }

    if digits_a == digits_b {
        return 1.0;
    }

    let local_a = strip_country_code(&digits_a);
    let local_b = strip_country_code(&digits_b);
    if local_a == local_b && local_a.len() == 10 {
        return if has_formatting(a) || has_formatting(b) {
            1.0
        } else {
            LIKELY_SAME_NUMBER
        };
    }

    if digits_a.contains(&digits_b) || digits_b.contains(&digits_a) {
        return LIKELY_SAME_NUMBER;
    }

    similarity(&digits_a, &digits_b)
}

/// [`compare_phones`] for optional attributes; a missing side scores 0.0
pub fn compare_phones_opt(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => compare_phones(a, b),
        _ => 0.0,
    }
}
