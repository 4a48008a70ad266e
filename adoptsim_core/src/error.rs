//! Error types for the adoptsim engines.

use adoptsim_env::{ExplorationId, NodeId, RunId};
use thiserror::Error;

/// Invalid input detected before any simulation or search work starts.
///
/// Configuration errors are never retried automatically.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Persona population is empty")]
    EmptyPopulation,

    #[error("Persona {0} has no latent trait profile")]
    MissingTraits(String),

    #[error("n_executions must be at least 1")]
    NoExecutions,

    #[error("sigma must be finite and positive, got {0}")]
    InvalidSigma(f64),

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Weights for {trait_name} sum to {sum}, expected 1.0")]
    WeightSum { trait_name: String, sum: f64 },

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates an out-of-range error.
    pub fn out_of_range(field: impl Into<String>, value: f64, min: f64, max: f64) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        }
    }

    /// Checks `value` is finite and within `[min, max]`.
    pub fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), Self> {
        if value.is_finite() && value >= min && value <= max {
            Ok(())
        } else {
            Err(Self::out_of_range(field, value, min, max))
        }
    }
}

/// Errors raised by the outcome simulator.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sampling error: {0}")]
    Sampling(String),
}

/// Persistence errors surfaced to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Exploration not found: {0}")]
    ExplorationNotFound(ExplorationId),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Integrity violation: {0}")]
    Integrity(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

/// Errors raised by the exploration engine.
///
/// Proposal-collaborator failures never appear here: they are recovered
/// locally as dominated nodes.
#[derive(Debug, Error)]
pub enum ExplorationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Exploration {0} has no root node")]
    MissingRoot(ExplorationId),

    #[error("Exploration {0} already finished")]
    AlreadyFinished(ExplorationId),

    #[error("Exploration {exploration} was started on {expected} personas, resumed with a different population of {found}")]
    PopulationMismatch {
        exploration: ExplorationId,
        expected: usize,
        found: usize,
    },
}
