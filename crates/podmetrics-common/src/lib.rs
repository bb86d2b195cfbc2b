//! Podmetrics Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the podmetrics workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`MetricsError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: the metric-type catalog (tier, interval, category) and the
//!   vendor catalog with its upstream result directories
//!
//! # Example
//!
//! ```no_run
//! use podmetrics_common::types::MetricType;
//!
//! fn main() -> podmetrics_common::Result<()> {
//!     let metric: MetricType = "episode_day_city".parse()?;
//!     assert_eq!(metric.category_code(), "CITY");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{MetricsError, Result};
