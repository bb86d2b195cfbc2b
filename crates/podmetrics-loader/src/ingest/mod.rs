//! Staging-and-merge pipeline
//!
//! # Architecture
//!
//! - **resolver**: vendor-local id to canonical id, cached per tier
//! - **normalize**: geographic codes to display names
//! - **locator**: completed upstream result sets (`stage2` before `stage1`)
//! - **ingestor**: streaming rows into a staging store with additive merges
//! - **staging**: per-(metric type, day) staging stores
//! - **overrides**: curated corrections, replace-merged after ingestion
//! - **compactor**: keyset-paginated copy into the permanent tables
//! - **driver**: `load_day` / `load_days` orchestration

pub mod compactor;
pub mod driver;
pub mod ingestor;
pub mod locator;
pub mod normalize;
pub mod overrides;
pub mod resolver;
pub mod staging;
pub mod types;

pub use compactor::{Compactor, MemoryMetricSink, MetricSink};
pub use driver::{active_metric_types, DayReport, MetricsLoader, UnitReport};
pub use ingestor::{IngestStats, RecordIngestor};
pub use locator::{SourceLocation, SourceLocator, Stage};
pub use normalize::{GeoReference, GeoTables, ValueNormalizer};
pub use overrides::{MemoryOverrideSource, OverrideApplier, OverrideSource};
pub use resolver::{IdentifierResolver, MemoryProviderMapping, ProviderMapping, ResolverCacheConfig};
pub use staging::{MemoryStagingBackend, StagingBackend, StagingStore};
pub use types::{MergeMode, MetricKey, OverrideEntry, PageCursor, PermanentMetricRow, StagingEntry};
