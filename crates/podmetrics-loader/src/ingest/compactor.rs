//! Copying a finished staging store into its permanent table
//!
//! The store is read in keyset order `(entity_id, timestamp, value)`, one
//! bounded page at a time, and every page is upserted with replace semantics
//! (`metrics_count` and `updated_at` overwritten, `created_at` kept). After a
//! full pass the store is cleared, so a second drain copies nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use podmetrics_common::types::MetricType;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};

use super::staging::StagingStore;
use super::types::{MetricKey, PageCursor, PermanentMetricRow, StagingEntry};
use crate::config::DEFAULT_COMPACT_PAGE_SIZE;
use crate::error::LoaderResult;

/// Permanent metric tables
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Upsert one page into the permanent table of `metric_type`. New rows get
    /// `created_at = updated_at = merged_at`; existing rows get the new count
    /// and `updated_at = merged_at`.
    async fn upsert(
        &self,
        metric_type: MetricType,
        rows: &[StagingEntry],
        merged_at: DateTime<Utc>,
    ) -> LoaderResult<u64>;
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Compactor {
    sink: Arc<dyn MetricSink>,
    page_size: usize,
    clock: Clock,
}

impl Compactor {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self {
            sink,
            page_size: DEFAULT_COMPACT_PAGE_SIZE,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Copy every staged entry exactly once, then clear the store.
    /// Returns the number of rows copied.
    #[instrument(skip(self, staging), fields(table = staging.name()))]
    pub async fn drain(
        &self,
        metric_type: MetricType,
        staging: &mut dyn StagingStore,
    ) -> LoaderResult<u64> {
        let merged_at = (self.clock)();
        let mut cursor: Option<PageCursor> = None;
        let mut total: u64 = 0;

        loop {
            let page = staging.page_after(cursor.as_ref(), self.page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.cursor());

            self.sink.upsert(metric_type, &page, merged_at).await?;
            total += page.len() as u64;
            info!("Copied {} rows from {}", page.len(), staging.name());
        }

        staging.clear().await?;
        info!("Copied {} total rows from {}", total, staging.name());
        Ok(total)
    }

    /// Drain the store and destroy it, whether or not the drain succeeded.
    pub async fn compact(
        &self,
        metric_type: MetricType,
        mut staging: Box<dyn StagingStore>,
    ) -> LoaderResult<u64> {
        let drained = self.drain(metric_type, staging.as_mut()).await;
        let name = staging.name().to_string();
        let destroyed = staging.destroy().await;

        match (drained, destroyed) {
            (Ok(total), Ok(())) => Ok(total),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(destroy_err)) => {
                warn!("Failed to drop staging table {}: {}", name, destroy_err);
                Err(e)
            }
        }
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Stored {
    count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

type Tables = HashMap<&'static str, BTreeMap<MetricKey, Stored>>;

/// Permanent tables held in memory
#[derive(Default)]
pub struct MemoryMetricSink {
    tables: Mutex<Tables>,
    upserts: AtomicUsize,
}

impl MemoryMetricSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of one permanent table, in key order.
    pub fn rows(&self, table: &str) -> Vec<PermanentMetricRow> {
        self.lock()
            .get(table)
            .map(|rows| rows.iter().map(|(key, stored)| to_row(key, stored)).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, table: &str, key: &MetricKey) -> Option<PermanentMetricRow> {
        self.lock()
            .get(table)
            .and_then(|rows| rows.get(key))
            .map(|stored| to_row(key, stored))
    }

    /// Number of upsert calls (one per page).
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MetricSink for MemoryMetricSink {
    async fn upsert(
        &self,
        metric_type: MetricType,
        rows: &[StagingEntry],
        merged_at: DateTime<Utc>,
    ) -> LoaderResult<u64> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.lock();
        let table = tables.entry(metric_type.permanent_table()).or_default();

        for row in rows {
            table
                .entry(row.key())
                .and_modify(|stored| {
                    stored.count = row.count;
                    stored.updated_at = merged_at;
                })
                .or_insert(Stored {
                    count: row.count,
                    created_at: merged_at,
                    updated_at: merged_at,
                });
        }
        Ok(rows.len() as u64)
    }
}

fn to_row(key: &MetricKey, stored: &Stored) -> PermanentMetricRow {
    PermanentMetricRow {
        tier_id: key.entity_id,
        timestamp: key.timestamp,
        category_code: key.category_code.clone(),
        value: key.value.clone(),
        count: stored.count,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::staging::{MemoryStagingBackend, StagingBackend};
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn entry(id: u128, value: &str, count: i64) -> StagingEntry {
        StagingEntry::new(
            Uuid::from_u128(id),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap(),
            "CITY",
            value,
            count,
        )
    }

    fn fixed_clock(ts: DateTime<Utc>) -> Clock {
        Arc::new(move || ts)
    }

    #[tokio::test]
    async fn test_drain_pages_and_clears() {
        let backend = MemoryStagingBackend::new();
        let mut staging = backend.create(MetricType::EpisodeDayCity, day()).await.unwrap();
        staging
            .merge_add(&[
                entry(1, "Boston", 1),
                entry(1, "Albany", 2),
                entry(2, "Boston", 3),
                entry(3, "Chicago", 4),
                entry(3, "Denver", 5),
            ])
            .await
            .unwrap();

        let sink = Arc::new(MemoryMetricSink::new());
        let compactor = Compactor::new(sink.clone()).with_page_size(2);

        assert_eq!(compactor.drain(MetricType::EpisodeDayCity, staging.as_mut()).await.unwrap(), 5);
        assert_eq!(sink.upsert_calls(), 3);
        assert_eq!(sink.rows("episode_metrics_daily").len(), 5);

        // drained stores copy nothing the second time
        assert_eq!(compactor.drain(MetricType::EpisodeDayCity, staging.as_mut()).await.unwrap(), 0);
        assert_eq!(sink.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let sink = MemoryMetricSink::new();
        let first = Utc.with_ymd_and_hms(2024, 3, 6, 1, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 6, 2, 0, 0).unwrap();

        sink.upsert(MetricType::PodcastDay, &[entry(1, "total", 6)], first).await.unwrap();
        sink.upsert(MetricType::PodcastDay, &[entry(1, "total", 10)], second).await.unwrap();

        let row = sink.get("podcast_metrics_daily", &entry(1, "total", 0).key()).unwrap();
        assert_eq!(row.count, 10);
        assert_eq!(row.created_at, first);
        assert_eq!(row.updated_at, second);
    }

    #[tokio::test]
    async fn test_compact_destroys_store() {
        let backend = MemoryStagingBackend::new();
        let mut staging = backend.create(MetricType::PodcastDay, day()).await.unwrap();
        staging.merge_add(&[entry(9, "total", 1)]).await.unwrap();

        let sink = Arc::new(MemoryMetricSink::new());
        let merged_at = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        let copied = Compactor::new(sink.clone())
            .with_clock(fixed_clock(merged_at))
            .compact(MetricType::PodcastDay, staging)
            .await
            .unwrap();

        assert_eq!(copied, 1);
        assert!(backend.live_tables().is_empty());
        assert_eq!(sink.rows("podcast_metrics_daily")[0].updated_at, merged_at);
    }
}
