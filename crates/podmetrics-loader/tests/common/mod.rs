//! In-memory harness for driving the full loader pipeline
//!
//! Every collaborator (object store, provider mapping, overrides, staging,
//! permanent tables) is an in-memory implementation, so these tests need
//! neither Postgres nor S3.

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use podmetrics_common::types::{Interval, MetricType, Tier};
use podmetrics_loader::ingest::compactor::Clock;
use podmetrics_loader::ingest::locator::{result_prefix, Stage, SUCCESS_MARKER};
use podmetrics_loader::ingest::{
    Compactor, GeoTables, IdentifierResolver, MemoryMetricSink, MemoryOverrideSource,
    MemoryProviderMapping, MemoryStagingBackend, MetricKey, MetricsLoader, OverrideApplier,
    OverrideEntry, PermanentMetricRow, RecordIngestor, ResolverCacheConfig, SourceLocator,
    ValueNormalizer,
};
use podmetrics_loader::storage::MemoryObjectStore;
use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const BUCKET: &str = "podmetrics-test";

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
}

pub fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap())
}

pub fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip(content: &str) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn key(entity_id: Uuid, timestamp: DateTime<Utc>, category: &str, value: &str) -> MetricKey {
    MetricKey {
        entity_id,
        timestamp,
        value: value.to_string(),
        category_code: category.to_string(),
    }
}

pub struct Harness {
    pub objects: Arc<MemoryObjectStore>,
    pub mapping: Arc<MemoryProviderMapping>,
    pub overrides: Arc<MemoryOverrideSource>,
    pub staging: MemoryStagingBackend,
    pub sink: Arc<MemoryMetricSink>,
    pub geo: GeoTables,
    ticks: Arc<AtomicI64>,
}

impl Harness {
    pub fn new(mapping: MemoryProviderMapping) -> Self {
        Self {
            objects: Arc::new(MemoryObjectStore::new()),
            mapping: Arc::new(mapping),
            overrides: Arc::new(MemoryOverrideSource::new()),
            staging: MemoryStagingBackend::new(),
            sink: Arc::new(MemoryMetricSink::new()),
            geo: GeoTables::from_pairs(
                [("506", "Boston (Manchester)"), ("501", "New York")],
                [("US", "United States"), ("DE", "Germany")],
            ),
            ticks: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Merge time of the n-th compaction (0-based).
    pub fn merge_time(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 6, 0, 0).unwrap() + Duration::hours(n)
    }

    /// Loader over the harness collaborators with a fresh identifier cache.
    /// Each compaction pass reads a clock one hour later than the last.
    pub fn loader(&self, batch_size: usize, page_size: usize) -> MetricsLoader {
        let ticks = Arc::clone(&self.ticks);
        let clock: Clock = Arc::new(move || Self::merge_time(ticks.fetch_add(1, Ordering::SeqCst)));

        let resolver = IdentifierResolver::new(
            self.mapping.clone(),
            ResolverCacheConfig::default(),
        );
        let ingestor = RecordIngestor::new(
            self.objects.clone(),
            Arc::new(resolver),
            ValueNormalizer::new(Arc::new(self.geo.clone())),
        )
        .with_batch_size(batch_size);
        let compactor = Compactor::new(self.sink.clone())
            .with_page_size(page_size)
            .with_clock(clock);

        MetricsLoader::new(
            Arc::new(self.staging.clone()),
            SourceLocator::new(self.objects.clone()),
            ingestor,
            OverrideApplier::new(self.overrides.clone()),
            compactor,
        )
    }

    /// Write a result object (compressed per its suffix) without a marker.
    pub fn put_object(
        &self,
        vendor_dir: &str,
        metric_type: MetricType,
        day: NaiveDate,
        stage: Stage,
        file_name: &str,
        rows: &str,
    ) {
        let data = if file_name.ends_with(".bz2") {
            bzip(rows)
        } else if file_name.ends_with(".gz") {
            gzip(rows)
        } else {
            rows.as_bytes().to_vec()
        };
        let prefix = result_prefix(vendor_dir, metric_type, day, stage);
        self.objects.put(BUCKET, &format!("{}{}", prefix, file_name), data);
    }

    pub fn mark_complete(&self, vendor_dir: &str, metric_type: MetricType, day: NaiveDate, stage: Stage) {
        let prefix = result_prefix(vendor_dir, metric_type, day, stage);
        self.objects.put(BUCKET, &format!("{}{}", prefix, SUCCESS_MARKER), "");
    }

    /// Completed result set with one object per entry of `files`.
    pub fn put_result(
        &self,
        vendor_dir: &str,
        metric_type: MetricType,
        day: NaiveDate,
        stage: Stage,
        files: &[(&str, &str)],
    ) {
        for (file_name, rows) in files {
            self.put_object(vendor_dir, metric_type, day, stage, file_name, rows);
        }
        self.mark_complete(vendor_dir, metric_type, day, stage);
    }

    pub fn add_override(&self, tier: Tier, entity_id: Uuid, category: &str, value: &str, count: i64) {
        self.overrides.insert(
            tier,
            OverrideEntry {
                interval: Interval::Day,
                entity_id,
                timestamp: midnight(day()),
                category_code: category.to_string(),
                value: value.to_string(),
                count,
            },
        );
    }

    pub fn rows(&self, table: &str) -> Vec<PermanentMetricRow> {
        self.sink.rows(table)
    }
}
