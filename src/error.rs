//! Error types for the calibration pipeline.
//!
//! Failures are split by how far they propagate:
//!
//! - [`SimulationError`]: one building failed; it is excluded from aggregation.
//! - [`IterationError`]: one iteration produced no usable score; it is skipped
//!   and the optimizer is not updated.
//! - [`OptimizerError`]: the surrogate could not be fitted or searched; the
//!   optimizer falls back to prior sampling.
//! - [`CampaignError`]: a setup precondition failed; the campaign stops.
//!
//! [`SeriesError`], [`StockError`], [`SpaceError`] and [`ScoringError`]
//! describe problems with the underlying data and are wrapped by the variants
//! above.

use thiserror::Error;

/// Errors raised while building or loading hourly series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    /// The input contained no values at all.
    #[error("series is empty")]
    Empty,

    /// A required column was not present in the input.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// A value or timestamp could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Reading the underlying file failed.
    #[error("IO error: {0}")]
    Io(String),

    /// No reference data is registered for the requested year.
    #[error("no reference data for year {0}")]
    MissingYear(i32),
}

/// Errors raised while loading archetype or population tables.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StockError {
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Errors describing an invalid parameter space or parameter vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("parameter `{name}`: lower bound {low} must be below upper bound {high}")]
    InvalidBounds { name: String, low: f64, high: f64 },

    #[error("parameter `{name}`: prior mean {mean} lies outside [{low}, {high}]")]
    PriorOutOfBounds {
        name: String,
        mean: f64,
        low: f64,
        high: f64,
    },

    #[error("parameter `{name}`: prior std must be finite and non-negative, got {std}")]
    InvalidPriorStd { name: String, std: f64 },

    #[error("duplicate parameter `{0}`")]
    Duplicate(String),

    #[error("unknown parameter `{0}`")]
    Unknown(String),

    #[error("missing value for parameter `{0}`")]
    Missing(String),

    #[error("expected {expected} parameter values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("parameter space is empty")]
    Empty,
}

/// Internal surrogate failures. Never fatal: the optimizer recovers from them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("need at least {required} observations to fit the surrogate, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("kernel matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("surrogate has not been fitted")]
    NotFitted,

    #[error("no finite acquisition value among {0} candidates")]
    NoCandidate(usize),

    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// Failure of a single building simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("could not build inputs for `{building}`: {reason}")]
    InvalidInputs { building: String, reason: String },

    #[error("engine failed for `{building}`: {reason}")]
    EngineFailed { building: String, reason: String },

    #[error("no output produced for `{0}`")]
    MissingOutput(String),

    #[error("malformed output for `{building}`: {source}")]
    MalformedOutput {
        building: String,
        #[source]
        source: SeriesError,
    },

    #[error("simulation of `{0}` timed out")]
    TimedOut(String),
}

/// Problems that make a pair of series impossible to score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("cannot score an empty series")]
    Empty,

    #[error("{0} series contains non-finite values")]
    NonFinite(&'static str),

    #[error("reference series has zero mean")]
    ZeroReferenceMean,

    #[error("objective is not finite")]
    NonFiniteObjective,
}

/// Failure of one calibration iteration. The iteration is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IterationError {
    #[error("no building produced an output ({attempted} attempted)")]
    NoOutput { attempted: usize },

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// Fatal campaign-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CampaignError {
    #[error("reference data unavailable: {0}")]
    ReferenceUnavailable(#[source] SeriesError),

    #[error("reference data cannot be scored against: {0}")]
    InvalidReference(#[source] ScoringError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid parameter space: {0}")]
    Space(#[from] SpaceError),

    #[error("no selected building received a weight")]
    NoBuildings,

    #[error("building `{building}` has invalid weight {weight}")]
    InvalidWeight { building: String, weight: f64 },

    #[error("journal error: {0}")]
    Journal(String),

    #[error("campaign has already been run")]
    AlreadyRun,

    #[error("building stock data: {0}")]
    Stock(#[from] StockError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SeriesError::MissingYear(2022);
        assert!(err.to_string().contains("2022"));

        let err = SpaceError::InvalidBounds {
            name: "heating_setpoint".to_string(),
            low: 21.0,
            high: 19.0,
        };
        assert!(err.to_string().contains("heating_setpoint"));

        let err = SimulationError::MalformedOutput {
            building: "B-001".to_string(),
            source: SeriesError::MissingColumn("Time".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("B-001"));
        assert!(msg.contains("Time"));
    }

    #[test]
    fn test_error_conversions() {
        let err: IterationError = ScoringError::ZeroReferenceMean.into();
        assert!(matches!(err, IterationError::Scoring(_)));

        let err: CampaignError = SpaceError::Empty.into();
        assert!(matches!(err, CampaignError::Space(SpaceError::Empty)));
    }
}
