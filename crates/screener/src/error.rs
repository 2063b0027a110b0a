//! Error types for screener computations.

use thiserror::Error;

/// Result type for screener operations.
pub type Result<T> = std::result::Result<T, ScreenerError>;

/// Errors that can occur while building or running a screen.
///
/// Per-symbol data problems never surface here; they degrade to undefined
/// fields on that symbol's row. Only batch-level input problems and
/// configuration mistakes are reported as errors.
#[derive(Debug, Error)]
pub enum ScreenerError {
    /// Missing required column in input data
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Insufficient data for the requested operation
    #[error("Insufficient data: need {required} rows, got {available}")]
    InsufficientData {
        /// Required number of rows
        required: usize,
        /// Available number of rows
        available: usize,
    },

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: String,
        /// End date of the range
        end: String,
    },

    /// Normalization method name not recognised
    #[error("Unknown normalization method: {0} (expected percentile, zscore or minmax)")]
    UnknownNormalization(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}
