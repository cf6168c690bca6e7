//! Cross-Validation Engine
//!
//! Public entry points: [`CrossValidationEngine::cross_validate`],
//! [`CrossValidationEngine::pre_screen`] and
//! [`CrossValidationEngine::get_verification_status`].
//!
//! ```text
//! SourceSet ──► cache lookup ──hit──────────────────► record
//!                    │
//!                   miss
//!                    ▼
//!            CrossValidator (pairwise scores, consistency)
//!                    ▼
//!            RiskScorer (confidence, risk, pass, issues)
//!                    ▼
//!            publish to cache ─────────────────────► record
//! ```
//!
//! Scoring is pure. The only shared mutable state lives in the
//! [`VerificationStore`] passed in at construction.

use std::sync::Arc;

use crossval_types::{CrossValidationRecord, Identity, PreScreenResult, SourceSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{cache_key, CacheStats, VerificationCache};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ConfigError, ValidationError};
use crate::masking::mask_opt;
use crate::screening::{PreScreener, RateLimiter};
use crate::store::{InMemoryStore, SweepReport, VerificationStore};
use crate::validation::{CrossValidator, RiskScorer};

pub struct CrossValidationEngine {
    config: EngineConfig,
    store: Arc<dyn VerificationStore>,
    clock: Arc<dyn Clock>,
    validator: CrossValidator,
    scorer: RiskScorer,
    cache: VerificationCache,
    prescreener: PreScreener,
}

impl CrossValidationEngine {
    /// Build an engine over the given store and clock.
    ///
    /// Fails if the configuration is invalid; the store is initialised only
    /// once the configuration has been accepted.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VerificationStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        store.init();

        let cache = VerificationCache::new(store.clone(), clock.clone(), config.cache_ttl());
        let rate_limiter = RateLimiter::new(
            store.clone(),
            clock.clone(),
            config.rate_limit_window(),
            config.rate_limit_max,
        );
        let prescreener = PreScreener::new(rate_limiter, &config.suspicious_tokens);

        info!(
            fuzzy_threshold = config.fuzzy_threshold,
            cache_ttl_secs = config.cache_ttl_secs,
            rate_limit_max = config.rate_limit_max,
            "Cross-validation engine ready"
        );

        Ok(Self {
            validator: CrossValidator::from_config(&config),
            scorer: RiskScorer::from_config(&config),
            cache,
            prescreener,
            config,
            store,
            clock,
        })
    }

    /// Engine over a fresh in-memory store and the system clock
    pub fn in_memory(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(InMemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cross-validate a source set.
    ///
    /// Field-identical source sets within the cache TTL return the same
    /// record. Fails only when no source at all is available, since no
    /// record can be produced without one.
    pub fn cross_validate(
        &self,
        sources: &SourceSet,
    ) -> Result<CrossValidationRecord, ValidationError> {
        if sources.availability().count() == 0 {
            warn!(
                user = %mask_opt(sources.primary.user_id.as_deref()),
                "Cross-validation requested with no available source"
            );
            return Err(ValidationError::NoAvailableSources);
        }

        let key = cache_key(sources);
        let record = self
            .cache
            .get_or_compute(&key, || self.compute_record(sources));

        info!(
            verification_id = %record.verification_id,
            user = %mask_opt(sources.primary.user_id.as_deref()),
            passed = record.passed,
            overall_consistency = record.overall_consistency,
            confidence = record.confidence,
            risk_score = record.risk_score,
            "Cross-validation complete"
        );
        Ok(record)
    }

    fn compute_record(&self, sources: &SourceSet) -> CrossValidationRecord {
        let availability = sources.availability();
        let report = self.validator.validate(sources);
        let assessment = self.scorer.assess(availability, &report);

        CrossValidationRecord {
            verification_id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            sources: availability,
            pairwise_scores: report.pairwise_scores,
            overall_consistency: report.overall_consistency,
            confidence: assessment.confidence,
            risk_score: assessment.risk_score,
            passed: assessment.passed,
            issues: assessment.issues,
        }
    }

    /// Structural checks and rate limiting for a single identity
    pub fn pre_screen(&self, identity: &Identity) -> PreScreenResult {
        self.prescreener.screen(identity)
    }

    /// Look up a record by verification id; `None` once it has expired
    pub fn get_verification_status(&self, verification_id: &Uuid) -> Option<CrossValidationRecord> {
        self.store
            .record_get(verification_id)
            .filter(|entry| entry.is_live(self.clock.now()))
            .map(|entry| entry.record)
    }

    /// Remove expired cache entries and idle rate windows
    pub fn sweep(&self) -> SweepReport {
        let report = SweepReport {
            rate_windows: self.prescreener.rate_limiter().sweep(),
            ..self.cache.sweep()
        };
        if report.total() > 0 {
            info!(
                cache_entries = report.cache_entries,
                records = report.records,
                rate_windows = report.rate_windows,
                "Sweep removed expired state"
            );
        }
        report
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop all cached records and rate windows
    pub fn teardown(&self) {
        self.store.teardown();
        info!("Cross-validation engine torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FieldWeights;
    use crossval_types::SourceSlot;

    fn engine() -> (CrossValidationEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let engine = CrossValidationEngine::new(
            EngineConfig::default(),
            Arc::new(InMemoryStore::new()),
            clock.clone(),
        )
        .unwrap();
        (engine, clock)
    }

    #[test]
    fn test_invalid_config_prevents_construction() {
        let config = EngineConfig {
            name_match_threshold: -0.1,
            ..EngineConfig::default()
        };
        assert!(CrossValidationEngine::in_memory(config).is_err());

        let config = EngineConfig {
            weights: FieldWeights {
                email: 0.0,
                phone: 0.0,
                name: 0.0,
                id_exact: 0.0,
            },
            ..EngineConfig::default()
        };
        assert!(CrossValidationEngine::in_memory(config).is_err());
    }

    #[test]
    fn test_no_available_sources_rejected() {
        let (engine, _) = engine();
        let sources = SourceSet::new(Identity::failed().with_user_id("u1"))
            .with_secondary(Identity::failed());

        assert_eq!(
            engine.cross_validate(&sources),
            Err(ValidationError::NoAvailableSources)
        );
    }

    #[test]
    fn test_failed_primary_fails_with_issue() {
        let (engine, _) = engine();
        let bob = Identity::verified().with_email("bob@x.com");
        let sources = SourceSet::new(Identity::failed().with_email("bob@x.com"))
            .with_secondary(bob.clone())
            .with_tertiary(bob);

        let record = engine.cross_validate(&sources).unwrap();
        assert!(!record.passed);
        assert!(!record.sources.primary);
        assert_eq!(record.pairwise_scores.len(), 1);
        assert_eq!(record.pairwise_scores[0].left, SourceSlot::Secondary);
        assert_eq!(record.issues[0], "Identity verification failed");
    }

    #[test]
    fn test_status_lookup_expires_with_cache() {
        let (engine, clock) = engine();
        let sources = SourceSet::new(Identity::verified().with_user_id("u1"));
        let record = engine.cross_validate(&sources).unwrap();

        assert_eq!(
            engine.get_verification_status(&record.verification_id),
            Some(record.clone())
        );
        assert_eq!(engine.get_verification_status(&Uuid::new_v4()), None);

        clock.advance(chrono::Duration::hours(25));
        assert_eq!(engine.get_verification_status(&record.verification_id), None);
    }

    #[test]
    fn test_teardown_drops_records() {
        let (engine, _) = engine();
        let sources = SourceSet::new(Identity::verified().with_user_id("u1"));
        let record = engine.cross_validate(&sources).unwrap();

        engine.teardown();
        assert_eq!(engine.get_verification_status(&record.verification_id), None);
    }
}
