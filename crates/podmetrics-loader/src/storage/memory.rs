use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{s3_url, ObjectStore, RowReader};
use crate::error::{LoaderError, LoaderResult};

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String), Vec<u8>>,
    reads: Vec<String>,
}

/// Object store held in memory. Records every object read so callers can
/// assert which result sets were consumed.
#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.state()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    /// `s3://` URLs of every object streamed so far, in read order.
    pub fn reads(&self) -> Vec<String> {
        self.state().reads.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, bucket: &str, key: &str) -> LoaderResult<bool> {
        Ok(self
            .state()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn list(&self, bucket: &str, prefix: &str, suffixes: &[&str]) -> LoaderResult<Vec<String>> {
        Ok(self
            .state()
            .objects
            .keys()
            .filter(|(b, key)| {
                b == bucket
                    && key.starts_with(prefix)
                    && suffixes.iter().any(|suffix| key.ends_with(suffix))
            })
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn read_rows(&self, bucket: &str, key: &str) -> LoaderResult<RowReader> {
        let mut state = self.state();
        let data = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| LoaderError::storage(format!("No such object {}", s3_url(bucket, key))))?;
        state.reads.push(s3_url(bucket, key));
        Ok(RowReader::from_bytes(key, data))
    }
}
