use serde::{Deserialize, Serialize};
use std::env;

use crate::config::env_parse;
use crate::error::LoaderResult;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Explicit key pair; without one the default AWS credential chain applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Where the upstream results live. Buckets are named per load, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub region: String,
    /// S3-compatible endpoint (MinIO, localstack); `None` means AWS
    pub endpoint_url: Option<String>,
    pub keys: Option<StaticKeys>,
    pub force_path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            keys: None,
            force_path_style: false,
        }
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok())
}

impl StorageConfig {
    /// `S3_REGION`, `S3_ENDPOINT`, `S3_ACCESS_KEY`, `S3_SECRET_KEY` and
    /// `S3_PATH_STYLE`, with the standard `AWS_*` names as fallbacks.
    pub fn from_env() -> LoaderResult<Self> {
        let keys = match (
            first_var(&["S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]),
            first_var(&["S3_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticKeys {
                access_key_id,
                secret_access_key,
            }),
            _ => None,
        };

        Ok(Self {
            region: first_var(&["S3_REGION", "AWS_REGION"])
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: first_var(&["S3_ENDPOINT"]),
            keys,
            force_path_style: env_parse("S3_PATH_STYLE")?.unwrap_or(false),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_uses_credential_chain() {
        let config = StorageConfig::default();
        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.keys.is_none());
        assert!(!config.force_path_style);
    }

    #[test]
    #[serial]
    fn test_half_a_key_pair_is_ignored() {
        env::set_var("S3_ACCESS_KEY", "minioadmin");
        env::remove_var("S3_SECRET_KEY");
        env::remove_var("AWS_SECRET_ACCESS_KEY");
        env::set_var("S3_ENDPOINT", "http://localhost:9000");
        env::set_var("S3_PATH_STYLE", "true");

        let config = StorageConfig::from_env().unwrap();
        assert!(config.keys.is_none());
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(config.force_path_style);

        env::remove_var("S3_ACCESS_KEY");
        env::remove_var("S3_ENDPOINT");
        env::remove_var("S3_PATH_STYLE");
    }

    #[test]
    #[serial]
    fn test_path_style_must_be_a_bool() {
        env::set_var("S3_PATH_STYLE", "yes");
        let result = StorageConfig::from_env();
        env::remove_var("S3_PATH_STYLE");
        assert!(matches!(result, Err(crate::error::LoaderError::Config(_))));
    }
}
