//! Shared Boundary Types for Identity Cross-Validation
//!
//! These types cross the boundary between the cross-validation engine and its
//! collaborators (document verifier, account-linking flow, financial-account
//! aggregator). They carry no behaviour beyond construction helpers and the
//! record invariant check.
//!
//! ## Rules
//!
//! 1. JSON field names are camelCase (`verificationId`, `riskScore`, ...)
//! 2. Absent attributes are `None`, never empty strings
//! 3. A source that failed upstream is still present, with `success = false`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SOURCES
// ============================================================================

/// Identity attributes reported by a single source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_ref: Option<String>,
    /// Whether the upstream check that produced this identity succeeded
    pub success: bool,
}

impl Identity {
    /// An identity from a source whose upstream check succeeded
    pub fn verified() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// An identity from a source whose upstream check failed
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_account_ref(mut self, account_ref: impl Into<String>) -> Self {
        self.account_ref = Some(account_ref.into());
        self
    }
}

/// Named source slots, in pairing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSlot {
    /// Primary identity/document check (mandatory)
    Primary,
    /// Account-linking / OAuth flow
    Secondary,
    /// Financial-account aggregator
    Tertiary,
}

impl SourceSlot {
    pub const ALL: [SourceSlot; 3] = [
        SourceSlot::Primary,
        SourceSlot::Secondary,
        SourceSlot::Tertiary,
    ];
}

impl std::fmt::Display for SourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSlot::Primary => write!(f, "primary"),
            SourceSlot::Secondary => write!(f, "secondary"),
            SourceSlot::Tertiary => write!(f, "tertiary"),
        }
    }
}

/// The set of sources submitted for one verification attempt.
///
/// `primary` is mandatory; the optional slots are `None` when the
/// collaborator was never consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSet {
    pub primary: Identity,
    #[serde(default)]
    pub secondary: Option<Identity>,
    #[serde(default)]
    pub tertiary: Option<Identity>,
}

impl SourceSet {
    pub fn new(primary: Identity) -> Self {
        Self {
            primary,
            secondary: None,
            tertiary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Identity) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_tertiary(mut self, tertiary: Identity) -> Self {
        self.tertiary = Some(tertiary);
        self
    }

    /// The identity in a slot, whether or not it is available
    pub fn get(&self, slot: SourceSlot) -> Option<&Identity> {
        match slot {
            SourceSlot::Primary => Some(&self.primary),
            SourceSlot::Secondary => self.secondary.as_ref(),
            SourceSlot::Tertiary => self.tertiary.as_ref(),
        }
    }

    /// A slot is available iff it is present and its source succeeded
    pub fn is_available(&self, slot: SourceSlot) -> bool {
        self.get(slot).is_some_and(|identity| identity.success)
    }

    /// Available slots in pairing order
    pub fn available_slots(&self) -> Vec<SourceSlot> {
        SourceSlot::ALL
            .into_iter()
            .filter(|slot| self.is_available(*slot))
            .collect()
    }

    pub fn availability(&self) -> SourceAvailability {
        SourceAvailability {
            primary: self.is_available(SourceSlot::Primary),
            secondary: self.is_available(SourceSlot::Secondary),
            tertiary: self.is_available(SourceSlot::Tertiary),
        }
    }
}

/// Availability flags for the three slots; always lists all three.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAvailability {
    pub primary: bool,
    pub secondary: bool,
    pub tertiary: bool,
}

impl SourceAvailability {
    pub fn get(&self, slot: SourceSlot) -> bool {
        match slot {
            SourceSlot::Primary => self.primary,
            SourceSlot::Secondary => self.secondary,
            SourceSlot::Tertiary => self.tertiary,
        }
    }

    /// Number of available sources (0..=3)
    pub fn count(&self) -> usize {
        SourceSlot::ALL
            .into_iter()
            .filter(|slot| self.get(*slot))
            .count()
    }

    /// Number of slots that are missing or failed
    pub fn missing(&self) -> usize {
        SourceSlot::ALL.len() - self.count()
    }
}

// ============================================================================
// SCORES
// ============================================================================

/// Per-field match scores for one pair, each in [0,1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldScores {
    pub email: f64,
    pub phone: f64,
    pub name: f64,
    pub id_exact: f64,
}

/// Score in [0,100] for one unordered pair of available sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairwiseScore {
    pub left: SourceSlot,
    pub right: SourceSlot,
    pub score: f64,
    pub field_scores: FieldScores,
}

// ============================================================================
// RECORDS
// ============================================================================

/// The outcome of one cross-validation. Immutable once produced; a
/// recomputation supersedes it with a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidationRecord {
    pub verification_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sources: SourceAvailability,
    pub pairwise_scores: Vec<PairwiseScore>,
    pub overall_consistency: f64,
    pub confidence: f64,
    pub risk_score: f64,
    pub passed: bool,
    pub issues: Vec<String>,
}

impl CrossValidationRecord {
    /// Check the structural invariants every produced record satisfies.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let available = self.sources.count();
        if available == 0 {
            return Err("record has no available sources".to_string());
        }

        let expected_pairs = available * (available - 1) / 2;
        if self.pairwise_scores.len() != expected_pairs {
            return Err(format!(
                "expected {} pairwise scores for {} sources, found {}",
                expected_pairs,
                available,
                self.pairwise_scores.len()
            ));
        }

        for (label, value) in [
            ("overallConsistency", self.overall_consistency),
            ("confidence", self.confidence),
            ("riskScore", self.risk_score),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("{} out of range: {}", label, value));
            }
        }

        for pair in &self.pairwise_scores {
            if !(0.0..=100.0).contains(&pair.score) {
                return Err(format!(
                    "pair {}/{} score out of range: {}",
                    pair.left, pair.right, pair.score
                ));
            }
            if !self.sources.get(pair.left) || !self.sources.get(pair.right) {
                return Err(format!(
                    "pair {}/{} references an unavailable source",
                    pair.left, pair.right
                ));
            }
        }

        Ok(())
    }
}

/// Outcome of the cheap structural pre-screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreScreenResult {
    pub passed: bool,
    /// 0..=100, starting at 100 and reduced by each failed check
    pub score: u8,
    pub issues: Vec<String>,
}
