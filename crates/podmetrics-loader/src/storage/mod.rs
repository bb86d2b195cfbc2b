//! Object storage holding upstream map-reduce results
//!
//! The loader only reads: completion markers are checked with [`ObjectStore::exists`],
//! result objects are enumerated with [`ObjectStore::list`] and streamed as
//! tab-delimited rows with [`ObjectStore::read_rows`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, Client};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, instrument};

use crate::error::{LoaderError, LoaderResult};

pub mod config;
pub mod memory;
pub mod rows;

pub use memory::MemoryObjectStore;
pub use rows::{Row, RowReader, RowStream};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, bucket: &str, key: &str) -> LoaderResult<bool>;

    /// Keys under `prefix` ending in one of `suffixes`, in key order.
    async fn list(&self, bucket: &str, prefix: &str, suffixes: &[&str]) -> LoaderResult<Vec<String>>;

    /// Lazily decompressed rows of one object. The body is read as rows are
    /// consumed, never buffered whole.
    async fn read_rows(&self, bucket: &str, key: &str) -> LoaderResult<RowReader>;
}

pub fn s3_url(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}

/// S3 (or S3-compatible) result store
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: config::StorageConfig) -> LoaderResult<Self> {
        debug!(endpoint = ?config.endpoint_url, "Initializing result storage");

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(keys) = &config.keys {
            loader = loader.credentials_provider(Credentials::new(
                &keys.access_key_id,
                &keys.secret_access_key,
                None,
                None,
                "podmetrics-storage",
            ));
        }

        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        info!(region = %config.region, "Storage client initialized");

        Ok(Self {
            client: Client::from_conf(s3_config),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, key: &str) -> LoaderResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(LoaderError::storage(format!(
                        "Failed to check existence of {}: {}",
                        s3_url(bucket, key),
                        service_err
                    )))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str, suffixes: &[&str]) -> LoaderResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    LoaderError::storage(format!(
                        "Failed to list {}: {}",
                        s3_url(bucket, prefix),
                        e.into_service_error()
                    ))
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter(|key| suffixes.iter().any(|suffix| key.ends_with(suffix)))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} objects under {}", keys.len(), s3_url(bucket, prefix));
        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn read_rows(&self, bucket: &str, key: &str) -> LoaderResult<RowReader> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                LoaderError::storage(format!(
                    "Failed to download {}: {}",
                    s3_url(bucket, key),
                    e.into_service_error()
                ))
            })?;

        debug!(
            bytes = response.content_length().unwrap_or_default(),
            "Streaming {}",
            s3_url(bucket, key)
        );

        // read on the blocking pool by RowReader::into_stream
        let body = SyncIoBridge::new(Box::pin(response.body.into_async_read()));
        Ok(RowReader::new(key, body))
    }
}
