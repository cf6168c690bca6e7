//! Error types for the cross-validation engine
//!
//! Only configuration errors are fatal. Validation problems are reported
//! through result objects, and computation errors are logged and absorbed
//! by recomputing.

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum CrossValError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Computation error: {0}")]
    Computation(#[from] ComputationError),
}

/// Invalid engine configuration; prevents engine construction
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("'{field}' must be within [0, 1], got {value}")]
    ThresholdOutOfRange { field: &'static str, value: f64 },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Malformed caller input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing user identifier")]
    MissingUserId,

    #[error("No available identity source to cross-validate")]
    NoAvailableSources,
}

/// Unexpected internal fault
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputationError {
    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptCacheEntry { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CrossValError>;
