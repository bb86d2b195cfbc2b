//! Error types for podmetrics

use thiserror::Error;

/// Result type alias for podmetrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Main error type shared by podmetrics crates
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tier names outside PODCAST/EPISODE are a contract violation
    #[error("Unsupported tier passed: {0}")]
    UnsupportedTier(String),

    #[error("Unknown metric type: {0}")]
    UnknownMetricType(String),

    #[error("Unknown vendor: {0}")]
    UnknownVendor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
