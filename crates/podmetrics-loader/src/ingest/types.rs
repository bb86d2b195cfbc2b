//! Row shapes flowing through the staging-and-merge pipeline

use chrono::{DateTime, Utc};
use podmetrics_common::types::Interval;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{LoaderError, LoaderResult};

/// Natural key of a staged or permanent metric row.
///
/// Field order matters: the derived ordering is the compaction keyset order
/// `(entity_id, timestamp, value)`, with `category_code` last. Every row of one
/// staging store shares a category code, so within a store the keyset order is
/// a total order over keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub entity_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub value: String,
    pub category_code: String,
}

/// One accumulated count in a staging store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingEntry {
    pub entity_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category_code: String,
    pub value: String,
    pub count: i64,
}

impl StagingEntry {
    pub fn new(
        entity_id: Uuid,
        timestamp: DateTime<Utc>,
        category_code: impl Into<String>,
        value: impl Into<String>,
        count: i64,
    ) -> Self {
        Self {
            entity_id,
            timestamp,
            category_code: category_code.into(),
            value: value.into(),
            count,
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey {
            entity_id: self.entity_id,
            timestamp: self.timestamp,
            value: self.value.clone(),
            category_code: self.category_code.clone(),
        }
    }

    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            entity_id: self.entity_id,
            timestamp: self.timestamp,
            value: self.value.clone(),
        }
    }
}

/// Manually curated correction; replaces whatever was accumulated for its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub interval: Interval,
    pub entity_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category_code: String,
    pub value: String,
    pub count: i64,
}

impl OverrideEntry {
    pub fn to_staging(&self) -> StagingEntry {
        StagingEntry {
            entity_id: self.entity_id,
            timestamp: self.timestamp,
            category_code: self.category_code.clone(),
            value: self.value.clone(),
            count: self.count,
        }
    }
}

/// Row of a permanent `(tier, interval)` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermanentMetricRow {
    pub tier_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category_code: String,
    pub value: String,
    pub count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Last `(entity_id, timestamp, value)` seen by keyset pagination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCursor {
    pub entity_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

impl PageCursor {
    /// Smallest key sharing this cursor's `(entity_id, timestamp, value)`.
    pub fn floor_key(&self) -> MetricKey {
        MetricKey {
            entity_id: self.entity_id,
            timestamp: self.timestamp,
            value: self.value.clone(),
            category_code: String::new(),
        }
    }

    /// Strict "greater than" in keyset order.
    pub fn precedes(&self, entry: &StagingEntry) -> bool {
        (self.entity_id, self.timestamp, self.value.as_str())
            < (entry.entity_id, entry.timestamp, entry.value.as_str())
    }
}

/// How a batch resolves collisions on the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Stored count += incoming count
    Add,
    /// Stored count = incoming count
    Replace,
}

/// Fold entries that share a natural key so a batch can go out as one
/// multi-row upsert. Equivalent to applying the entries one at a time.
pub fn coalesce(batch: &[StagingEntry], mode: MergeMode) -> LoaderResult<Vec<StagingEntry>> {
    let mut index: HashMap<MetricKey, usize> = HashMap::with_capacity(batch.len());
    let mut out: Vec<StagingEntry> = Vec::with_capacity(batch.len());

    for entry in batch {
        match index.get(&entry.key()) {
            Some(&pos) => {
                out[pos].count = merged_count(&out[pos], entry.count, mode)?;
            }
            None => {
                index.insert(entry.key(), out.len());
                out.push(entry.clone());
            }
        }
    }

    Ok(out)
}

/// Count stored for `current` after merging `incoming` into it.
pub fn merged_count(current: &StagingEntry, incoming: i64, mode: MergeMode) -> LoaderResult<i64> {
    match mode {
        MergeMode::Add => current
            .count
            .checked_add(incoming)
            .ok_or_else(|| LoaderError::count_overflow(current)),
        MergeMode::Replace => Ok(incoming),
    }
}
