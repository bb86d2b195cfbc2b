//! Postgres collaborators
//!
//! - [`staging`]: TEMPORARY staging tables with additive and replace upserts
//! - [`metrics`]: replace-on-conflict upserts into the permanent tables
//! - [`overrides`]: manually curated correction rows
//! - [`provider_map`]: vendor id to canonical id lookups
//! - [`geo`]: DMA and country reference tables

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::LoaderResult;

pub mod geo;
pub mod metrics;
pub mod overrides;
pub mod provider_map;
pub mod staging;

pub use geo::load_geo_tables;
pub use metrics::PgMetricSink;
pub use overrides::PgOverrideSource;
pub use provider_map::PgProviderMapping;
pub use staging::{PgStagingBackend, PgStagingStore};

pub async fn create_pool(config: &DatabaseConfig) -> LoaderResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}
