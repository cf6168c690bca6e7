//! PII masking for log output
//!
//! Emails, phone numbers, user ids and account references never reach a log
//! line unmasked. Masking keeps the first and last two characters.

const MASK: &str = "****";

/// Mask a PII value: `first2 + "****" + last2`, or `"****"` for values of
/// four characters or fewer.
pub fn mask_pii(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return MASK.to_string();
    }

    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, MASK, tail)
}

/// Mask an optional value; absent values log as `"-"`
pub fn mask_opt(value: Option<&str>) -> String {
    value.map(mask_pii).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_long_value() {
        assert_eq!(mask_pii("bob@example.com"), "bo****om");
        assert_eq!(mask_pii("+15551234567"), "+1****67");
    }

    #[test]
    fn test_mask_short_value() {
        assert_eq!(mask_pii(""), "****");
        assert_eq!(mask_pii("u1"), "****");
        assert_eq!(mask_pii("abcd"), "****");
        assert_eq!(mask_pii("abcde"), "ab****de");
    }

    #[test]
    fn test_mask_multibyte() {
        assert_eq!(mask_pii("Zoë Ångström"), "Zo****öm");
    }

    #[test]
    fn test_mask_opt() {
        assert_eq!(mask_opt(None), "-");
        assert_eq!(mask_opt(Some("alice_1990")), "al****90");
    }
}
