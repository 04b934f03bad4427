//! Error types for odflow

use thiserror::Error;

/// Main error type for odflow operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Insufficient sample size: {n} vectors, need at least {min}")]
    InsufficientSampleSize { n: usize, min: usize },

    #[error("Degenerate statistic: {0}")]
    DegenerateStatistic(String),

    #[error("Invalid spatial weights: {0}")]
    InvalidWeights(String),

    #[error("Numeric error: {0}")]
    NumericError(String),

    #[error("Permutation run cancelled before any trial completed")]
    Cancelled,

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for odflow operations
pub type Result<T> = std::result::Result<T, Error>;
