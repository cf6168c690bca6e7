//! Cross-validation scoring: pairwise consistency, then confidence and risk

pub mod cross_validator;
pub mod risk;

pub use cross_validator::{overall_consistency, ConsistencyReport, CrossValidator, MatchThresholds};
pub use risk::{RiskAssessment, RiskScorer};
