//! Identity Cross-Validation Engine
//!
//! Takes identity attributes reported by up to three independent sources
//! (document verification, account linking, a financial-account aggregator),
//! scores how consistent they are, and produces a confidence score, a risk
//! score and a pass/fail decision. Also offers a cheap pre-screen with
//! per-identity rate limiting.
//!
//! ## Flow
//! SourceSet -> cache lookup -> pairwise scoring -> risk scoring -> cached record
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use identity_crossval::{CrossValidationEngine, EngineConfig, Identity, SourceSet};
//!
//! let engine = CrossValidationEngine::in_memory(EngineConfig::default()).unwrap();
//! let bob = Identity::verified()
//!     .with_user_id("bob_1")
//!     .with_email("bob@example.com")
//!     .with_phone("+15551234567");
//! let sources = SourceSet::new(bob.clone()).with_secondary(bob);
//! let record = engine.cross_validate(&sources).unwrap();
//! assert!(record.passed);
//! ```

// Errors and configuration
pub mod config;
pub mod error;

// Time and log hygiene
pub mod clock;
pub mod masking;

// Scoring
pub mod matching;
pub mod validation;

// Pre-screening and rate limiting
pub mod screening;

// State
pub mod cache;
pub mod store;

// Entry points
pub mod engine;
pub mod sweeper;

pub use crossval_types::{
    CrossValidationRecord, FieldScores, Identity, PairwiseScore, PreScreenResult,
    SourceAvailability, SourceSet, SourceSlot,
};

pub use cache::{cache_key, CacheStats, VerificationCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, FieldWeights};
pub use engine::CrossValidationEngine;
pub use error::{ComputationError, ConfigError, CrossValError, Result, ValidationError};
pub use store::{CacheEntry, InMemoryStore, SweepReport, VerificationStore};
pub use sweeper::spawn_sweep_task;
