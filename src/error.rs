//! Error types for the simulation core

use thiserror::Error;

use crate::solvers::SolverError;

/// Rejected parameter values
///
/// Raised when a configuration is loaded or a parameter is updated. The
/// running state is never touched by a value that fails validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("process time constant must be positive, got {0}")]
    NonPositiveTimeConstant(f64),

    #[error("sample period must be positive, got {0}")]
    NonPositiveSamplePeriod(f64),

    #[error("dead time must be non-negative, got {0}")]
    NegativeDeadTime(f64),

    #[error("output limits inverted: min {min} > max {max}")]
    InvertedOutputLimits { min: f64, max: f64 },

    #[error("noise variance must be non-negative, got {0}")]
    NegativeVariance(f64),

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("integrator tolerances must be non-negative and not both zero, got atol {atol}, rtol {rtol}")]
    InvalidTolerance { atol: f64, rtol: f64 },

    #[error("minimum integrator step must be positive, got {0}")]
    NonPositiveMinStep(f64),

    #[error("{0} must be at least 1")]
    ZeroStepCount(&'static str),
}

/// Errors surfaced by the simulation core and its I/O helpers
#[derive(Error, Debug)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("numeric instability at t = {t}: {source}")]
    NumericInstability {
        t: f64,
        #[source]
        source: SolverError,
    },

    #[error("invalid input for {field}: {input:?} is not a number")]
    InputValidation { field: String, input: String },

    #[error("process parameters cannot change while the simulation is running")]
    Running,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Fail with [`ConfigError::NonFinite`] unless `value` is finite
pub(crate) fn ensure_finite(field: &'static str, value: f64) -> std::result::Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NonFinite { field, value })
    }
}
