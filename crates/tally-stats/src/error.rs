//! Error types for the statistics crate

use thiserror::Error;

/// Result type alias for statistics operations
pub type Result<T> = std::result::Result<T, StatsError>;

/// Errors that can occur while computing or caching statistics
#[derive(Debug, Error)]
pub enum StatsError {
    /// Core library error (store, timeout, serialization)
    #[error("Core error: {0}")]
    Core(#[from] tally_core::Error),

    /// The transaction source failed
    #[error("Transaction source error: {0}")]
    Source(String),

    /// Unrecognised statistic type name
    #[error("Unknown statistic type: {0}")]
    UnknownStatType(String),

    /// Unrecognised period name
    #[error("Unknown period: {0}")]
    UnknownPeriod(String),
}
