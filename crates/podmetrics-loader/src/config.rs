//! Configuration management

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{LoaderError, LoaderResult};
use crate::storage::config::StorageConfig;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/podmetrics";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Loader Configuration Constants
// ============================================================================

/// Default bucket holding upstream map-reduce results.
pub const DEFAULT_METRICS_BUCKET: &str = "podmetrics-results";

/// Entries per additive flush into the staging store.
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 500;

/// Rows per keyset page when compacting the staging store.
pub const DEFAULT_COMPACT_PAGE_SIZE: usize = 500;

/// LRU capacity of the podcast identifier cache.
pub const DEFAULT_PODCAST_CACHE_CAPACITY: usize = 512;

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub loader: LoaderConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Staging-and-merge tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub bucket: String,
    pub ingest_batch_size: usize,
    pub compact_page_size: usize,
    pub podcast_cache_capacity: usize,
    /// `None` leaves the episode cache unbounded.
    pub episode_cache_capacity: Option<usize>,
}

/// `Ok(None)` when `name` is unset; a value that does not parse is an error.
pub(crate) fn env_parse<T>(name: &str) -> LoaderResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| LoaderError::Config(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

fn env_or<T>(name: &str, default: T) -> LoaderResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(env_parse(name)?.unwrap_or(default))
}

impl Config {
    /// Load configuration from `.env`, environment and defaults
    pub fn load() -> LoaderResult<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS)?,
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS)?,
            },
            storage: StorageConfig::from_env()?,
            loader: LoaderConfig {
                bucket: std::env::var("METRICS_BUCKET")
                    .unwrap_or_else(|_| DEFAULT_METRICS_BUCKET.to_string()),
                ingest_batch_size: env_or("METRICS_INGEST_BATCH_SIZE", DEFAULT_INGEST_BATCH_SIZE)?,
                compact_page_size: env_or("METRICS_COMPACT_PAGE_SIZE", DEFAULT_COMPACT_PAGE_SIZE)?,
                podcast_cache_capacity: env_or(
                    "METRICS_PODCAST_CACHE_CAPACITY",
                    DEFAULT_PODCAST_CACHE_CAPACITY,
                )?,
                episode_cache_capacity: env_parse("METRICS_EPISODE_CACHE_CAPACITY")?
                    .filter(|capacity: &usize| *capacity > 0),
            },
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> LoaderResult<()> {
        if self.database.url.is_empty() {
            return Err(LoaderError::Config("Database URL cannot be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(LoaderError::Config(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(LoaderError::Config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        self.loader.validate()
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> LoaderResult<()> {
        if self.bucket.is_empty() {
            return Err(LoaderError::Config("Metrics bucket cannot be empty".into()));
        }
        if self.ingest_batch_size == 0 {
            return Err(LoaderError::Config("Ingest batch size must be greater than 0".into()));
        }
        if self.compact_page_size == 0 {
            return Err(LoaderError::Config("Compaction page size must be greater than 0".into()));
        }
        if self.podcast_cache_capacity == 0 {
            return Err(LoaderError::Config(
                "Podcast cache capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_METRICS_BUCKET.to_string(),
            ingest_batch_size: DEFAULT_INGEST_BATCH_SIZE,
            compact_page_size: DEFAULT_COMPACT_PAGE_SIZE,
            podcast_cache_capacity: DEFAULT_PODCAST_CACHE_CAPACITY,
            episode_cache_capacity: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            storage: StorageConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.loader.ingest_batch_size, 500);
        assert_eq!(config.loader.compact_page_size, 500);
        assert_eq!(config.loader.podcast_cache_capacity, 512);
        assert_eq!(config.loader.episode_cache_capacity, None);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = Config::default();
        config.loader.compact_page_size = 0;
        assert!(matches!(config.validate(), Err(LoaderError::Config(_))));
    }

    #[test]
    fn test_min_connections_above_max_rejected() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("METRICS_BUCKET", "metrics-test");
        std::env::set_var("METRICS_INGEST_BATCH_SIZE", "250");
        std::env::set_var("METRICS_EPISODE_CACHE_CAPACITY", "10000");

        let config = Config::load().unwrap();
        assert_eq!(config.loader.bucket, "metrics-test");
        assert_eq!(config.loader.ingest_batch_size, 250);
        assert_eq!(config.loader.episode_cache_capacity, Some(10000));

        std::env::remove_var("METRICS_BUCKET");
        std::env::remove_var("METRICS_INGEST_BATCH_SIZE");
        std::env::remove_var("METRICS_EPISODE_CACHE_CAPACITY");
    }

    #[test]
    #[serial]
    fn test_zero_episode_capacity_means_unbounded() {
        std::env::set_var("METRICS_EPISODE_CACHE_CAPACITY", "0");
        let config = Config::load().unwrap();
        assert_eq!(config.loader.episode_cache_capacity, None);
        std::env::remove_var("METRICS_EPISODE_CACHE_CAPACITY");
    }

    #[test]
    #[serial]
    fn test_unparseable_env_value_is_config_error() {
        std::env::set_var("METRICS_COMPACT_PAGE_SIZE", "lots");
        let result = Config::load();
        std::env::remove_var("METRICS_COMPACT_PAGE_SIZE");

        match result {
            Err(LoaderError::Config(msg)) => assert!(msg.contains("METRICS_COMPACT_PAGE_SIZE")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    #[serial]
    fn test_negative_episode_capacity_is_config_error() {
        std::env::set_var("METRICS_EPISODE_CACHE_CAPACITY", "-1");
        let result = Config::load();
        std::env::remove_var("METRICS_EPISODE_CACHE_CAPACITY");
        assert!(matches!(result, Err(LoaderError::Config(_))));
    }
}
