//! Podcast metrics loader
//!
//! Moves vendor-computed podcast and episode download counts from object
//! storage into the permanent metrics tables.
//!
//! # Overview
//!
//! For every (metric type, day) the loader:
//!
//! - creates an empty staging store
//! - locates each vendor's completed result set and streams its rows in,
//!   summing counts that share a natural key
//! - overlays manually curated overrides, which replace staged counts
//! - copies the staging store into the permanent table page by page
//! - drops the staging store
//!
//! # Example
//!
//! ```no_run
//! use podmetrics_loader::{build_loader, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let loader = build_loader(&config).await?;
//!     let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
//!     loader.load_day(&config.loader.bucket, day, &[], &[]).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod storage;

use std::sync::Arc;

pub use config::Config;
pub use error::{LoaderError, LoaderResult};
pub use ingest::{DayReport, MetricsLoader};

use ingest::{
    Compactor, IdentifierResolver, OverrideApplier, RecordIngestor, ResolverCacheConfig,
    SourceLocator, ValueNormalizer,
};
use storage::{ObjectStore, S3Storage};

/// Wire the production collaborators: Postgres for staging, mappings,
/// overrides and permanent tables; S3 for upstream results.
pub async fn build_loader(config: &Config) -> LoaderResult<MetricsLoader> {
    let pool = db::create_pool(&config.database).await?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3Storage::new(config.storage.clone()).await?);
    let geo = db::load_geo_tables(&pool).await?;

    let resolver = IdentifierResolver::new(
        Arc::new(db::PgProviderMapping::new(pool.clone())),
        ResolverCacheConfig::from(&config.loader),
    );
    let ingestor = RecordIngestor::new(
        Arc::clone(&store),
        Arc::new(resolver),
        ValueNormalizer::new(Arc::new(geo)),
    )
    .with_batch_size(config.loader.ingest_batch_size);
    let compactor = Compactor::new(Arc::new(db::PgMetricSink::new(pool.clone())))
        .with_page_size(config.loader.compact_page_size);

    Ok(MetricsLoader::new(
        Arc::new(db::PgStagingBackend::new(pool.clone())),
        SourceLocator::new(store),
        ingestor,
        OverrideApplier::new(Arc::new(db::PgOverrideSource::new(pool))),
        compactor,
    ))
}
