//! Ephemeral per-(metric type, day) staging stores
//!
//! A store is created empty, filled with additive merges during ingestion,
//! overlaid with replace merges for overrides, drained by the compactor and
//! destroyed. The backend hands out at most one live store per name.

use async_trait::async_trait;
use chrono::NaiveDate;
use podmetrics_common::types::MetricType;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::{coalesce, merged_count, MergeMode, MetricKey, PageCursor, StagingEntry};
use crate::error::{LoaderError, LoaderResult};

/// Name of the staging store for a (metric type, day) run, e.g.
/// `temp_episode_day_city_20240305`.
pub fn staging_table_name(metric_type: MetricType, day: NaiveDate) -> String {
    format!("temp_{}_{}", metric_type.dir_name(), day.format("%Y%m%d"))
}

#[async_trait]
pub trait StagingStore: Send {
    fn name(&self) -> &str;

    /// Insert-or-increment every entry.
    ///
    /// Replaying a batch that was already merged double-counts it.
    async fn merge_add(&mut self, batch: &[StagingEntry]) -> LoaderResult<()>;

    /// Insert-or-overwrite every entry.
    async fn merge_replace(&mut self, batch: &[StagingEntry]) -> LoaderResult<()>;

    /// Up to `limit` entries strictly after `cursor`, ascending by
    /// `(entity_id, timestamp, value)`.
    async fn page_after(
        &mut self,
        cursor: Option<&PageCursor>,
        limit: usize,
    ) -> LoaderResult<Vec<StagingEntry>>;

    /// Remove every entry, keeping the store itself.
    async fn clear(&mut self) -> LoaderResult<()>;

    async fn destroy(self: Box<Self>) -> LoaderResult<()>;
}

#[async_trait]
pub trait StagingBackend: Send + Sync {
    async fn create(
        &self,
        metric_type: MetricType,
        day: NaiveDate,
    ) -> LoaderResult<Box<dyn StagingStore>>;
}

// ============================================================================
// In-memory backend
// ============================================================================

type Tables = HashMap<String, BTreeMap<MetricKey, i64>>;

/// BTreeMap-backed staging stores, shared so tests can inspect live tables.
#[derive(Clone, Default)]
pub struct MemoryStagingBackend {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStagingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of stores that have been created and not yet destroyed.
    pub fn live_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.tables).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entries(&self, name: &str) -> Option<Vec<StagingEntry>> {
        lock(&self.tables).get(name).map(|table| {
            table
                .iter()
                .map(|(key, count)| to_entry(key, *count))
                .collect()
        })
    }
}

#[async_trait]
impl StagingBackend for MemoryStagingBackend {
    async fn create(
        &self,
        metric_type: MetricType,
        day: NaiveDate,
    ) -> LoaderResult<Box<dyn StagingStore>> {
        let name = staging_table_name(metric_type, day);
        let mut tables = lock(&self.tables);
        if tables.contains_key(&name) {
            return Err(LoaderError::StagingConflict(name));
        }
        tables.insert(name.clone(), BTreeMap::new());
        tracing::info!("Creating staging table {}", name);

        Ok(Box::new(MemoryStagingStore {
            name,
            tables: Arc::clone(&self.tables),
        }))
    }
}

pub struct MemoryStagingStore {
    name: String,
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStagingStore {
    fn merge(&self, batch: &[StagingEntry], mode: MergeMode) -> LoaderResult<()> {
        let mut tables = lock(&self.tables);
        let table = tables
            .get_mut(&self.name)
            .ok_or_else(|| LoaderError::storage(format!("staging table {} is gone", self.name)))?;

        // all or nothing, like one upsert statement
        let merged = coalesce(batch, mode)?
            .into_iter()
            .map(|entry| {
                let key = entry.key();
                let count = match table.get(&key) {
                    Some(&stored) => merged_count(&to_entry(&key, stored), entry.count, mode)?,
                    None => entry.count,
                };
                Ok((key, count))
            })
            .collect::<LoaderResult<Vec<_>>>()?;

        table.extend(merged);
        Ok(())
    }
}

#[async_trait]
impl StagingStore for MemoryStagingStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn merge_add(&mut self, batch: &[StagingEntry]) -> LoaderResult<()> {
        self.merge(batch, MergeMode::Add)
    }

    async fn merge_replace(&mut self, batch: &[StagingEntry]) -> LoaderResult<()> {
        self.merge(batch, MergeMode::Replace)
    }

    async fn page_after(
        &mut self,
        cursor: Option<&PageCursor>,
        limit: usize,
    ) -> LoaderResult<Vec<StagingEntry>> {
        let tables = lock(&self.tables);
        let table = tables
            .get(&self.name)
            .ok_or_else(|| LoaderError::storage(format!("staging table {} is gone", self.name)))?;

        let lower = match cursor {
            Some(c) => Bound::Excluded(c.floor_key()),
            None => Bound::Unbounded,
        };

        Ok(table
            .range((lower, Bound::Unbounded))
            .map(|(key, count)| to_entry(key, *count))
            .filter(|entry| cursor.map_or(true, |c| c.precedes(entry)))
            .take(limit)
            .collect())
    }

    async fn clear(&mut self) -> LoaderResult<()> {
        if let Some(table) = lock(&self.tables).get_mut(&self.name) {
            table.clear();
        }
        Ok(())
    }

    async fn destroy(self: Box<Self>) -> LoaderResult<()> {
        tracing::info!("Dropping staging table {}", self.name);
        lock(&self.tables).remove(&self.name);
        Ok(())
    }
}

fn to_entry(key: &MetricKey, count: i64) -> StagingEntry {
    StagingEntry {
        entity_id: key.entity_id,
        timestamp: key.timestamp,
        category_code: key.category_code.clone(),
        value: key.value.clone(),
        count,
    }
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
