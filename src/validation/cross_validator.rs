//! Pairwise consistency scoring across identity sources
//!
//! Every unordered pair of available sources gets a score in [0, 100]. Each
//! field that both sources report is *comparable*; a comparable field whose
//! similarity clears its threshold earns its weight. The pair score is the
//! earned share of the comparable weight:
//!
//! ```text
//! score = 100 * earned_weight / comparable_weight     (0 when nothing is comparable)
//! ```
//!
//! The same [`FieldWeights`] apply to every pair. A source that never
//! reports a field (aggregators rarely return names) is neither rewarded
//! nor penalised for it. Raising any field similarity never lowers a score.

use crossval_types::{FieldScores, Identity, PairwiseScore, SourceSet, SourceSlot};
use tracing::debug;

use crate::config::{EngineConfig, FieldWeights};
use crate::matching::fuzzy::{compare_phones, similarity};

/// Per-field similarity needed to earn the field's weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub email: f64,
    pub phone: f64,
    pub name: f64,
}

impl From<&EngineConfig> for MatchThresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            email: config.email_match_threshold,
            phone: config.phone_match_threshold,
            name: config.name_match_threshold,
        }
    }
}

/// Pairwise scores and their aggregate for one source set
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    pub pairwise_scores: Vec<PairwiseScore>,
    /// Mean of the non-zero pair scores, in [0, 100]
    pub overall_consistency: f64,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Stateless scorer; safe to share between threads
#[derive(Debug, Clone)]
pub struct CrossValidator {
    weights: FieldWeights,
    thresholds: MatchThresholds,
}

impl CrossValidator {
    pub fn new(weights: FieldWeights, thresholds: MatchThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.weights, MatchThresholds::from(config))
    }

    /// Score every pair of available sources and aggregate
    pub fn validate(&self, sources: &SourceSet) -> ConsistencyReport {
        let pairwise_scores = self.pairwise_scores(sources);
        let overall_consistency = overall_consistency(&pairwise_scores);
        ConsistencyReport {
            pairwise_scores,
            overall_consistency,
        }
    }

    /// Scores for each unordered pair of available sources, in slot order:
    /// primary/secondary, primary/tertiary, secondary/tertiary
    pub fn pairwise_scores(&self, sources: &SourceSet) -> Vec<PairwiseScore> {
        let available: Vec<(SourceSlot, &Identity)> = sources
            .available_slots()
            .into_iter()
            .filter_map(|slot| sources.get(slot).map(|identity| (slot, identity)))
            .collect();

        let mut scores = Vec::with_capacity(3);
        for (i, (left_slot, left)) in available.iter().enumerate() {
            for (right_slot, right) in &available[i + 1..] {
                scores.push(self.score_pair(*left_slot, left, *right_slot, right));
            }
        }
        scores
    }

    /// Score a single pair of identities
    pub fn score_pair(
        &self,
        left_slot: SourceSlot,
        left: &Identity,
        right_slot: SourceSlot,
        right: &Identity,
    ) -> PairwiseScore {
        let mut field_scores = FieldScores::default();
        let mut comparable: f64 = 0.0;
        let mut earned: f64 = 0.0;

        let mut tally = |weight: f64, score: f64, threshold: f64| {
            comparable += weight;
            if score >= threshold {
                earned += weight;
            }
        };

        if let (Some(a), Some(b)) = (
            present(left.email.as_deref()),
            present(right.email.as_deref()),
        ) {
            field_scores.email = similarity(a, b);
            tally(self.weights.email, field_scores.email, self.thresholds.email);
        }

        if let (Some(a), Some(b)) = (
            present(left.phone.as_deref()),
            present(right.phone.as_deref()),
        ) {
            field_scores.phone = compare_phones(a, b);
            tally(self.weights.phone, field_scores.phone, self.thresholds.phone);
        }

        if let (Some(a), Some(b)) = (
            present(left.name.as_deref()),
            present(right.name.as_deref()),
        ) {
            field_scores.name = similarity(a, b);
            tally(self.weights.name, field_scores.name, self.thresholds.name);
        }

        if let (Some(a), Some(b)) = (
            present(left.user_id.as_deref()),
            present(right.user_id.as_deref()),
        ) {
            field_scores.id_exact = if a.trim() == b.trim() { 1.0 } else { 0.0 };
            tally(self.weights.id_exact, field_scores.id_exact, 1.0);
        }

        let score = if comparable > 0.0 {
            (100.0 * earned / comparable).clamp(0.0, 100.0)
        } else {
            0.0
        };

        debug!(
            left = %left_slot,
            right = %right_slot,
            score,
            email = field_scores.email,
            phone = field_scores.phone,
            name = field_scores.name,
            id_exact = field_scores.id_exact,
            "Scored source pair"
        );

        PairwiseScore {
            left: left_slot,
            right: right_slot,
            score,
            field_scores,
        }
    }
}

/// Mean of the pair scores above zero; pairs scoring exactly zero are left
/// out of the denominator. 0 when no pair scored.
pub fn overall_consistency(scores: &[PairwiseScore]) -> f64 {
    let positive: Vec<f64> = scores
        .iter()
        .map(|s| s.score)
        .filter(|score| *score > 0.0)
        .collect();

    if positive.is_empty() {
        return 0.0;
    }
    (positive.iter().sum::<f64>() / positive.len() as f64).clamp(0.0, 100.0)
}
