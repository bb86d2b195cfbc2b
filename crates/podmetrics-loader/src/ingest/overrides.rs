//! Manually curated corrections, applied last so they win over upstream counts

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use podmetrics_common::types::{Interval, MetricType, Tier};
use std::sync::{Arc, Mutex};
use tracing::info;

use super::staging::StagingStore;
use super::types::{OverrideEntry, StagingEntry};
use crate::error::LoaderResult;

/// Read-only access to the per-tier override tables.
#[async_trait]
pub trait OverrideSource: Send + Sync {
    /// Overrides matching interval, exact timestamp and category code.
    async fn overrides(
        &self,
        tier: Tier,
        interval: Interval,
        timestamp: DateTime<Utc>,
        category_code: &str,
    ) -> LoaderResult<Vec<OverrideEntry>>;
}

/// Timestamp an override must carry to apply to `day`.
pub fn day_timestamp(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[derive(Clone)]
pub struct OverrideApplier {
    source: Arc<dyn OverrideSource>,
}

impl OverrideApplier {
    pub fn new(source: Arc<dyn OverrideSource>) -> Self {
        Self { source }
    }

    /// Replace-merge the overrides for `(metric_type, day)` into `staging`.
    /// Returns the number of overrides applied.
    pub async fn apply(
        &self,
        metric_type: MetricType,
        staging: &mut dyn StagingStore,
        day: NaiveDate,
    ) -> LoaderResult<usize> {
        let (tier, interval, _) = metric_type.components();
        let rows = self
            .source
            .overrides(tier, interval, day_timestamp(day), metric_type.category_code())
            .await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let entries: Vec<StagingEntry> = rows.iter().map(OverrideEntry::to_staging).collect();
        info!("Overriding {} metrics", entries.len());
        staging.merge_replace(&entries).await?;
        Ok(entries.len())
    }
}

/// Override tables held in memory
#[derive(Default)]
pub struct MemoryOverrideSource {
    rows: Mutex<Vec<(Tier, OverrideEntry)>>,
}

impl MemoryOverrideSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tier: Tier, entry: OverrideEntry) {
        self.rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((tier, entry));
    }
}

#[async_trait]
impl OverrideSource for MemoryOverrideSource {
    async fn overrides(
        &self,
        tier: Tier,
        interval: Interval,
        timestamp: DateTime<Utc>,
        category_code: &str,
    ) -> LoaderResult<Vec<OverrideEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(t, row)| {
                *t == tier
                    && row.interval == interval
                    && row.timestamp == timestamp
                    && row.category_code == category_code
            })
            .map(|(_, row)| row.clone())
            .collect())
    }
}
