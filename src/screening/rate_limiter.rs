//! Sliding-window attempt counter per identity key

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::masking::mask_pii;
use crate::store::VerificationStore;

/// Allows at most `max_attempts` attempts per identity inside a trailing window
pub struct RateLimiter {
    store: Arc<dyn VerificationStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    max_attempts: usize,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        clock: Arc<dyn Clock>,
        window: std::time::Duration,
        max_attempts: usize,
    ) -> Self {
        Self {
            store,
            clock,
            window: Duration::from_std(window).unwrap_or(Duration::MAX),
            max_attempts,
        }
    }

    /// Record an attempt and report whether it is allowed.
    ///
    /// Blocked attempts still count towards the window.
    pub fn allow(&self, identity_key: &str) -> bool {
        let prior = self
            .store
            .record_attempt(identity_key, self.clock.now(), self.window);
        let allowed = prior < self.max_attempts;

        if allowed {
            debug!(
                identity = %mask_pii(identity_key),
                attempts = prior + 1,
                "Rate limit check passed"
            );
        } else {
            warn!(
                identity = %mask_pii(identity_key),
                attempts = prior + 1,
                max_attempts = self.max_attempts,
                "Rate limit exceeded"
            );
        }
        allowed
    }

    /// Drop windows whose attempts have all aged out
    pub fn sweep(&self) -> usize {
        self.store
            .sweep_rate_windows(self.clock.now(), self.window)
    }
}
