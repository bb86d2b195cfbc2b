//! Streaming result objects into a staging store
//!
//! Each object is a tab-delimited file of `vendor_id, timestamp, [value,] count`
//! rows (the value column is present only for categorized metric types). Rows
//! are filtered, resolved and normalized, then merged additively in batches.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use podmetrics_common::types::{MetricType, Vendor, DEFAULT_METRIC_VALUE};
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::locator::SourceLocation;
use super::normalize::ValueNormalizer;
use super::resolver::IdentifierResolver;
use super::staging::StagingStore;
use super::types::StagingEntry;
use crate::config::DEFAULT_INGEST_BATCH_SIZE;
use crate::error::{LoaderError, LoaderResult};
use crate::storage::{ObjectStore, Row};

/// Suffixes of result objects; everything else in a result directory
/// (markers, logs) is skipped.
pub const OBJECT_SUFFIXES: [&str; 2] = [".bz2", ".gz"];

/// What happened to the rows of one or more objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub rows_read: usize,
    /// Timestamp outside the day being loaded
    pub out_of_day: usize,
    /// No canonical id for the vendor-local id
    pub unresolved: usize,
    /// Value unknown to the reference tables, or empty
    pub unconvertible: usize,
    pub staged: usize,
}

impl AddAssign for IngestStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.rows_read += other.rows_read;
        self.out_of_day += other.out_of_day;
        self.unresolved += other.unresolved;
        self.unconvertible += other.unconvertible;
        self.staged += other.staged;
    }
}

pub struct RecordIngestor {
    store: Arc<dyn ObjectStore>,
    resolver: Arc<IdentifierResolver>,
    normalizer: ValueNormalizer,
    batch_size: usize,
}

impl RecordIngestor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        resolver: Arc<IdentifierResolver>,
        normalizer: ValueNormalizer,
    ) -> Self {
        Self {
            store,
            resolver,
            normalizer,
            batch_size: DEFAULT_INGEST_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stage every result object under `location`.
    ///
    /// A located directory without any result object is an error: the marker
    /// claims completion but there is nothing to load.
    #[instrument(skip(self, location, staging), fields(location = %location.url()))]
    pub async fn ingest(
        &self,
        vendor: Vendor,
        metric_type: MetricType,
        location: &SourceLocation,
        day: NaiveDate,
        staging: &mut dyn StagingStore,
    ) -> LoaderResult<IngestStats> {
        let keys = self
            .store
            .list(&location.bucket, &location.prefix, &OBJECT_SUFFIXES)
            .await?;

        if keys.is_empty() {
            return Err(LoaderError::NoSourceObjects {
                location: location.url(),
            });
        }

        let mut stats = IngestStats::default();
        for key in &keys {
            stats += self
                .ingest_object(vendor, metric_type, &location.bucket, key, day, staging)
                .await?;
        }

        debug!(
            files = stats.files,
            rows = stats.rows_read,
            out_of_day = stats.out_of_day,
            unresolved = stats.unresolved,
            unconvertible = stats.unconvertible,
            "Finished {}",
            location.url()
        );
        Ok(stats)
    }

    async fn ingest_object(
        &self,
        vendor: Vendor,
        metric_type: MetricType,
        bucket: &str,
        key: &str,
        day: NaiveDate,
        staging: &mut dyn StagingStore,
    ) -> LoaderResult<IngestStats> {
        info!("Loading metrics from file {}/{}", bucket, key);

        let tier = metric_type.tier();
        let categorized = metric_type.category().is_some();
        let category_code = metric_type.category_code();
        let day_prefix = day.format("%Y-%m-%d").to_string();

        let mut stats = IngestStats {
            files: 1,
            ..Default::default()
        };
        let mut batch: Vec<StagingEntry> = Vec::with_capacity(self.batch_size);
        let mut rows = self
            .store
            .read_rows(bucket, key)
            .await?
            .into_stream(self.batch_size);

        while let Some(row) = rows.next().await {
            let Row { line, fields } = row?;
            stats.rows_read += 1;

            let (vendor_id, raw_ts, raw_value, raw_count) = match (categorized, fields.as_slice()) {
                (true, [id, ts, value, count]) => (id, ts, value.as_str(), count),
                (false, [id, ts, count]) => (id, ts, DEFAULT_METRIC_VALUE, count),
                _ => {
                    return Err(LoaderError::malformed(
                        key,
                        line,
                        format!(
                            "expected {} fields, found {}",
                            if categorized { 4 } else { 3 },
                            fields.len()
                        ),
                    ))
                }
            };

            if !raw_ts.starts_with(&day_prefix) {
                stats.out_of_day += 1;
                continue;
            }

            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
                LoaderError::malformed(key, line, format!("invalid timestamp {:?}", raw_ts))
            })?;
            let count = parse_count(raw_count).ok_or_else(|| {
                LoaderError::malformed(key, line, format!("invalid count {:?}", raw_count))
            })?;

            let Some(entity_id) = self.resolver.resolve(vendor, tier, vendor_id).await? else {
                error!("No ID found for {} {}", tier, vendor_id);
                stats.unresolved += 1;
                continue;
            };

            let Some(value) = self.normalizer.normalize(metric_type, raw_value) else {
                stats.unconvertible += 1;
                continue;
            };

            batch.push(StagingEntry::new(entity_id, timestamp, category_code, value, count));
            stats.staged += 1;

            if batch.len() >= self.batch_size {
                staging.merge_add(&batch).await?;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            staging.merge_add(&batch).await?;
        }

        info!("Inserted {} metrics", stats.staged);
        Ok(stats)
    }
}

/// Upstream emits RFC 3339 in stage2 and `YYYY-MM-DD HH:MM:SS[+zz:zz]` or bare
/// dates in older stage1 output. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn parse_count(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|count| *count >= 0)
}
