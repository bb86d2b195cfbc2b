//! Day / metric-type orchestration
//!
//! Each (metric type, day) is one unit: create its staging store, ingest every
//! vendor's completed output, overlay overrides, compact into the permanent
//! table and drop the store. Units run one after another in catalog order;
//! days run in ascending order with no shared state besides the identifier
//! caches. A failed unit aborts the load and is retried from scratch.

use chrono::NaiveDate;
use podmetrics_common::types::{MetricType, Vendor};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::compactor::Compactor;
use super::ingestor::{IngestStats, RecordIngestor};
use super::locator::SourceLocator;
use super::overrides::OverrideApplier;
use super::staging::{StagingBackend, StagingStore};
use crate::error::LoaderResult;

/// `(map-reduced types − exclude) ∪ include`, in catalog order.
pub fn active_metric_types(exclude: &[MetricType], include: &[MetricType]) -> BTreeSet<MetricType> {
    let excluded: BTreeSet<MetricType> = exclude.iter().copied().collect();
    MetricType::MAPREDUCED
        .into_iter()
        .filter(|m| !excluded.contains(m))
        .chain(include.iter().copied())
        .collect()
}

/// Outcome of one (metric type, day) unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub metric_type: MetricType,
    /// Completed result directories ingested, across vendors
    pub locations: usize,
    pub ingest: IngestStats,
    pub overrides: usize,
    pub compacted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub day: NaiveDate,
    pub units: Vec<UnitReport>,
}

impl DayReport {
    pub fn total_compacted(&self) -> u64 {
        self.units.iter().map(|u| u.compacted).sum()
    }

    pub fn unit(&self, metric_type: MetricType) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.metric_type == metric_type)
    }
}

pub struct MetricsLoader {
    staging: Arc<dyn StagingBackend>,
    locator: SourceLocator,
    ingestor: RecordIngestor,
    overrides: OverrideApplier,
    compactor: Compactor,
    vendors: Vec<Vendor>,
}

impl MetricsLoader {
    pub fn new(
        staging: Arc<dyn StagingBackend>,
        locator: SourceLocator,
        ingestor: RecordIngestor,
        overrides: OverrideApplier,
        compactor: Compactor,
    ) -> Self {
        Self {
            staging,
            locator,
            ingestor,
            overrides,
            compactor,
            vendors: Vendor::ALL.to_vec(),
        }
    }

    /// Restrict (or reorder) the vendors scanned for every unit.
    pub fn with_vendors(mut self, vendors: Vec<Vendor>) -> Self {
        self.vendors = vendors;
        self
    }

    /// Load one day for every active metric type.
    #[instrument(skip(self, exclude, include))]
    pub async fn load_day(
        &self,
        bucket: &str,
        day: NaiveDate,
        exclude: &[MetricType],
        include: &[MetricType],
    ) -> LoaderResult<DayReport> {
        info!("Loading metrics for {}", day);

        let mut units = Vec::new();
        for metric_type in active_metric_types(exclude, include) {
            units.push(self.load_unit(bucket, metric_type, day).await?);
        }

        let report = DayReport { day, units };
        info!(
            units = report.units.len(),
            rows = report.total_compacted(),
            "Finished loading metrics for {}",
            day
        );
        Ok(report)
    }

    /// Load each distinct day once, oldest first.
    pub async fn load_days(
        &self,
        bucket: &str,
        days: &[NaiveDate],
        exclude: &[MetricType],
        include: &[MetricType],
    ) -> LoaderResult<Vec<DayReport>> {
        let days: BTreeSet<NaiveDate> = days.iter().copied().collect();

        let mut reports = Vec::with_capacity(days.len());
        for day in days {
            reports.push(self.load_day(bucket, day, exclude, include).await?);
        }
        Ok(reports)
    }

    async fn load_unit(
        &self,
        bucket: &str,
        metric_type: MetricType,
        day: NaiveDate,
    ) -> LoaderResult<UnitReport> {
        let mut staging = self.staging.create(metric_type, day).await?;
        let mut report = UnitReport {
            metric_type,
            locations: 0,
            ingest: IngestStats::default(),
            overrides: 0,
            compacted: 0,
        };

        if let Err(e) = self
            .stage(bucket, metric_type, day, staging.as_mut(), &mut report)
            .await
        {
            let name = staging.name().to_string();
            if let Err(drop_err) = staging.destroy().await {
                warn!("Failed to drop staging table {}: {}", name, drop_err);
            }
            return Err(e);
        }

        report.compacted = self.compactor.compact(metric_type, staging).await?;
        Ok(report)
    }

    async fn stage(
        &self,
        bucket: &str,
        metric_type: MetricType,
        day: NaiveDate,
        staging: &mut dyn StagingStore,
        report: &mut UnitReport,
    ) -> LoaderResult<()> {
        for &vendor in &self.vendors {
            for location in self.locator.locate(bucket, vendor, metric_type, day).await? {
                report.ingest += self
                    .ingestor
                    .ingest(vendor, metric_type, &location, day, staging)
                    .await?;
                report.locations += 1;
            }
        }

        report.overrides = self.overrides.apply(metric_type, staging, day).await?;
        Ok(())
    }
}
