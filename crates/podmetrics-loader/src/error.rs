//! Loader error types

use thiserror::Error;

use crate::ingest::types::StagingEntry;

/// Result type alias for loader operations
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

/// Errors that abort the current (metric type, day) unit.
///
/// Non-fatal conditions (unresolved identifiers, unconvertible values, vendors
/// without completed output) never surface here; they are logged and counted.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// A completion marker exists but the location holds no readable objects.
    #[error("No files processed under {location}")]
    NoSourceObjects { location: String },

    #[error("Malformed row {line} in {key}: {reason}")]
    MalformedRow {
        key: String,
        line: usize,
        reason: String,
    },

    /// Another run already owns the staging store for this (metric type, day).
    #[error("Staging table {0} already exists")]
    StagingConflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decompression error in {key}: {source}")]
    Decompression {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Summing counts for one key left the `i64` range.
    #[error("Count overflow for {key}")]
    CountOverflow { key: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] podmetrics_common::MetricsError),
}

impl LoaderError {
    pub fn malformed(key: &str, line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            key: key.to_string(),
            line,
            reason: reason.into(),
        }
    }

    pub fn count_overflow(entry: &StagingEntry) -> Self {
        Self::CountOverflow {
            key: format!(
                "{}/{}/{}/{}",
                entry.entity_id,
                entry.timestamp.to_rfc3339(),
                entry.category_code,
                entry.value
            ),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
