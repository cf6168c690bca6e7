//! Cheap structural checks run before cross-validation
//!
//! The score starts at 100 and each failed check deducts a fixed penalty.
//! Any deduction fails the screen.

use std::sync::LazyLock;

use crossval_types::{Identity, PreScreenResult};
use regex::Regex;
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::masking::{mask_opt, mask_pii};
use crate::screening::rate_limiter::RateLimiter;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s\-()]+$").expect("valid phone regex"));

const MIN_PHONE_DIGITS: usize = 10;
const MIN_USER_ID_LEN: usize = 3;

const EMAIL_PENALTY: u8 = 30;
const PHONE_PENALTY: u8 = 25;
const USER_ID_PENALTY: u8 = 20;
const SUSPICIOUS_PENALTY: u8 = 40;
const RATE_LIMIT_PENALTY: u8 = 50;

pub const ISSUE_INVALID_EMAIL: &str = "Invalid email format";
pub const ISSUE_INVALID_PHONE: &str = "Invalid phone number format";
pub const ISSUE_SHORT_USER_ID: &str = "User identifier too short";
pub const ISSUE_SUSPICIOUS: &str = "Suspicious pattern detected";
pub const ISSUE_RATE_LIMITED: &str = "Rate limit exceeded";

fn valid_email(email: Option<&str>) -> bool {
    email.is_some_and(|e| EMAIL_RE.is_match(e))
}

fn valid_phone(phone: Option<&str>) -> bool {
    phone.is_some_and(|p| {
        PHONE_RE.is_match(p) && p.chars().filter(|c| c.is_ascii_digit()).count() >= MIN_PHONE_DIGITS
    })
}

/// Structural validation plus the rate-limit gate
pub struct PreScreener {
    rate_limiter: RateLimiter,
    suspicious_tokens: Vec<String>,
}

impl PreScreener {
    pub fn new(rate_limiter: RateLimiter, suspicious_tokens: &[String]) -> Self {
        Self {
            rate_limiter,
            suspicious_tokens: suspicious_tokens
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
        }
    }

    /// Screen one identity.
    ///
    /// An identity without a user id cannot be rate-limited and fails with a
    /// zero score; it is never counted against any window.
    pub fn screen(&self, identity: &Identity) -> PreScreenResult {
        let user_id = match identity.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("Pre-screen rejected identity without user id");
                return PreScreenResult {
                    passed: false,
                    score: 0,
                    issues: vec![ValidationError::MissingUserId.to_string()],
                };
            }
        };

        let email = identity.email.as_deref();
        let phone = identity.phone.as_deref();
        let mut score: u8 = 100;
        let mut issues = Vec::new();
        let mut deduct = |penalty: u8, issue: &str| {
            score = score.saturating_sub(penalty);
            issues.push(issue.to_string());
        };

        if !valid_email(email) {
            deduct(EMAIL_PENALTY, ISSUE_INVALID_EMAIL);
        }
        if !valid_phone(phone) {
            deduct(PHONE_PENALTY, ISSUE_INVALID_PHONE);
        }
        if user_id.chars().count() < MIN_USER_ID_LEN {
            deduct(USER_ID_PENALTY, ISSUE_SHORT_USER_ID);
        }
        if self.is_suspicious(email, phone, user_id) {
            deduct(SUSPICIOUS_PENALTY, ISSUE_SUSPICIOUS);
        }
        if !self.rate_limiter.allow(user_id) {
            deduct(RATE_LIMIT_PENALTY, ISSUE_RATE_LIMITED);
        }

        let passed = issues.is_empty();
        info!(
            user = %mask_pii(user_id),
            email = %mask_opt(email),
            score,
            passed,
            "Pre-screen complete"
        );

        PreScreenResult {
            passed,
            score,
            issues,
        }
    }

    /// Whether email + phone + user id contains a suspicious token
    fn is_suspicious(&self, email: Option<&str>, phone: Option<&str>, user_id: &str) -> bool {
        let combined = format!(
            "{}{}{}",
            email.unwrap_or_default(),
            phone.unwrap_or_default(),
            user_id
        )
        .to_lowercase();
        self.suspicious_tokens
            .iter()
            .any(|token| combined.contains(token.as_str()))
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn screener() -> PreScreener {
        let config = EngineConfig::default();
        let limiter = RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::default()),
            config.rate_limit_window(),
            config.rate_limit_max,
        );
        PreScreener::new(limiter, &config.suspicious_tokens)
    }

    fn clean_identity() -> Identity {
        Identity::verified()
            .with_user_id("alice_1990")
            .with_email("alice@example.com")
            .with_phone("+1 (555) 123-4567")
    }

    #[test]
    fn test_clean_identity_passes() {
        let result = screener().screen(&clean_identity());
        assert!(result.passed);
        assert_eq!(result.score, 100);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_invalid_email_and_phone() {
        let identity = clean_identity()
            .with_email("not-an-email")
            .with_phone("555-1234");
        let result = screener().screen(&identity);

        assert!(!result.passed);
        assert_eq!(result.score, 45);
        assert_eq!(result.issues, vec![ISSUE_INVALID_EMAIL, ISSUE_INVALID_PHONE]);
    }

    #[test]
    fn test_phone_with_letters_rejected() {
        let identity = clean_identity().with_phone("555-CALL-NOW1");
        let result = screener().screen(&identity);
        assert_eq!(result.issues, vec![ISSUE_INVALID_PHONE]);
    }

    #[test]
    fn test_missing_fields_deduct() {
        let identity = Identity::verified().with_user_id("ab");
        let result = screener().screen(&identity);

        assert_eq!(
            result.issues,
            vec![ISSUE_INVALID_EMAIL, ISSUE_INVALID_PHONE, ISSUE_SHORT_USER_ID]
        );
        assert_eq!(result.score, 25);
    }

    #[test]
    fn test_suspicious_tokens_case_insensitive() {
        let identity = clean_identity().with_email("DemoUser@example.com");
        let result = screener().screen(&identity);
        assert_eq!(result.issues, vec![ISSUE_SUSPICIOUS]);
        assert_eq!(result.score, 60);

        let identity = clean_identity().with_phone("+15550000000");
        let result = screener().screen(&identity);
        assert_eq!(result.issues, vec![ISSUE_SUSPICIOUS]);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let s = screener();
        let identity = Identity::verified().with_user_id("te").with_email("fake");
        for _ in 0..5 {
            s.screen(&identity);
        }
        let result = s.screen(&identity);
        assert_eq!(result.score, 0);
        assert!(result.issues.contains(&ISSUE_RATE_LIMITED.to_string()));
    }

    #[test]
    fn test_missing_user_id_is_structured_failure() {
        let identity = Identity::verified().with_email("bob@x.com");
        let result = screener().screen(&identity);

        assert!(!result.passed);
        assert_eq!(result.score, 0);
        assert_eq!(result.issues, vec!["Missing user identifier".to_string()]);

        let blank = Identity::verified().with_user_id("   ");
        assert!(!screener().screen(&blank).passed);
    }
}
