//! Confidence, risk and the pass decision
//!
//! Derived from source availability and the consistency report. All scores
//! are clamped to [0, 100].

use crossval_types::{PairwiseScore, SourceAvailability};

use crate::config::EngineConfig;
use crate::validation::cross_validator::ConsistencyReport;

pub const ISSUE_IDENTITY_FAILED: &str = "Identity verification failed";
pub const ISSUE_INCONSISTENT: &str = "Inconsistent information across sources";
pub const ISSUE_LOW_CONFIDENCE: &str = "Low confidence in verification";
pub const ISSUE_HIGH_RISK: &str = "High risk detected";

/// Ratio below which sources are treated as disagreeing
const LOW_CONSISTENCY_RATIO: f64 = 0.5;
/// Ratio below which disagreement is reported as an issue
const INCONSISTENCY_ISSUE_RATIO: f64 = 0.7;
const LOW_CONFIDENCE: f64 = 60.0;
const HIGH_RISK: f64 = 50.0;
/// Confidence below which residual risk is added
const RISKY_CONFIDENCE: f64 = 70.0;

const AGREEMENT_BONUS: f64 = 20.0;
const INCONSISTENCY_RISK: f64 = 30.0;
const MISSING_SOURCE_RISK: f64 = 15.0;
const LOW_CONFIDENCE_RISK: f64 = 20.0;

/// Confidence, risk, pass decision and issues for one verification
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub confidence: f64,
    pub risk_score: f64,
    pub passed: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskScorer {
    fuzzy_threshold: f64,
    partial_coverage_factor: f64,
}

impl RiskScorer {
    pub fn new(fuzzy_threshold: f64, partial_coverage_factor: f64) -> Self {
        Self {
            fuzzy_threshold,
            partial_coverage_factor,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.fuzzy_threshold, config.partial_coverage_factor)
    }

    pub fn assess(
        &self,
        sources: SourceAvailability,
        report: &ConsistencyReport,
    ) -> RiskAssessment {
        let overall = report.overall_consistency;
        let confidence = self.calculate_confidence(sources, &report.pairwise_scores, overall);
        let risk_score = self.calculate_risk_score(sources, overall, confidence);
        let passed = self.determine_pass(sources, overall);
        let issues = self.identify_issues(sources, overall, confidence, risk_score);

        RiskAssessment {
            confidence,
            risk_score,
            passed,
            issues,
        }
    }

    /// Consistency ratio a multi-source attempt must reach to pass
    pub fn adjusted_threshold(&self, available: usize) -> f64 {
        if available == 2 {
            self.fuzzy_threshold * self.partial_coverage_factor
        } else {
            self.fuzzy_threshold
        }
    }

    /// The primary source must be available. A lone source passes, since
    /// there is nothing to cross-check; otherwise consistency must reach the
    /// adjusted threshold.
    pub fn determine_pass(&self, sources: SourceAvailability, overall_consistency: f64) -> bool {
        if !sources.primary {
            return false;
        }

        let available = sources.count();
        if available == 1 {
            return true;
        }

        overall_consistency / 100.0 >= self.adjusted_threshold(available)
    }

    pub fn calculate_confidence(
        &self,
        sources: SourceAvailability,
        pairwise_scores: &[PairwiseScore],
        overall_consistency: f64,
    ) -> f64 {
        let available = sources.count() as f64;
        let ratio = overall_consistency / 100.0;

        let mut confidence = if ratio < LOW_CONSISTENCY_RATIO {
            available * 10.0 + ratio * 5.0
        } else {
            available * 20.0 + overall_consistency * 0.3
        };

        let agreeing_pairs = pairwise_scores.iter().filter(|p| p.score > 0.0).count();
        if agreeing_pairs >= 2 && ratio >= LOW_CONSISTENCY_RATIO {
            confidence += AGREEMENT_BONUS;
        }

        confidence.clamp(0.0, 100.0)
    }

    pub fn calculate_risk_score(
        &self,
        sources: SourceAvailability,
        overall_consistency: f64,
        confidence: f64,
    ) -> f64 {
        let mut risk: f64 = 0.0;
        if overall_consistency / 100.0 < LOW_CONSISTENCY_RATIO {
            risk += INCONSISTENCY_RISK;
        }
        risk += MISSING_SOURCE_RISK * sources.missing() as f64;
        if confidence < RISKY_CONFIDENCE {
            risk += LOW_CONFIDENCE_RISK;
        }
        risk.clamp(0.0, 100.0)
    }

    pub fn identify_issues(
        &self,
        sources: SourceAvailability,
        overall_consistency: f64,
        confidence: f64,
        risk_score: f64,
    ) -> Vec<String> {
        let mut issues = Vec::new();
        if !sources.primary {
            issues.push(ISSUE_IDENTITY_FAILED.to_string());
        }
        if overall_consistency / 100.0 < INCONSISTENCY_ISSUE_RATIO {
            issues.push(ISSUE_INCONSISTENT.to_string());
        }
        if confidence < LOW_CONFIDENCE {
            issues.push(ISSUE_LOW_CONFIDENCE.to_string());
        }
        if risk_score > HIGH_RISK {
            issues.push(ISSUE_HIGH_RISK.to_string());
        }
        issues
    }
}
