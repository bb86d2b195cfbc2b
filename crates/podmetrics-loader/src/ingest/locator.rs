//! Finding the completed result set for a (vendor, metric type, day)
//!
//! Upstream writes each result set under
//! `results/{vendor_dir}/daily/{YYYY/MM/DD}/metrics/{stage}/{metric_dir}/` and
//! drops a `_SUCCESS` marker once it is complete. The refined `stage2` output is
//! preferred; `stage1` is the fallback. Partially written output (no marker)
//! is never read.

use chrono::NaiveDate;
use podmetrics_common::types::{MetricType, Vendor};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::LoaderResult;
use crate::storage::{s3_url, ObjectStore};

pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Processing stage of upstream output, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Stage2,
    Stage1,
}

impl Stage {
    pub const PREFERENCE: [Stage; 2] = [Stage::Stage2, Stage::Stage1];

    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Stage2 => "stage2",
            Stage::Stage1 => "stage1",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A completed result directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: String,
    /// Key prefix ending in `/`
    pub prefix: String,
    pub vendor_dir: String,
    pub stage: Stage,
}

impl SourceLocation {
    pub fn url(&self) -> String {
        s3_url(&self.bucket, &self.prefix)
    }

    pub fn marker_key(&self) -> String {
        format!("{}{}", self.prefix, SUCCESS_MARKER)
    }
}

/// Key prefix of one result directory.
pub fn result_prefix(vendor_dir: &str, metric_type: MetricType, day: NaiveDate, stage: Stage) -> String {
    format!(
        "results/{}/daily/{}/metrics/{}/{}/",
        vendor_dir,
        day.format("%Y/%m/%d"),
        stage.dir_name(),
        metric_type.dir_name()
    )
}

#[derive(Clone)]
pub struct SourceLocator {
    store: Arc<dyn ObjectStore>,
}

impl SourceLocator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Most refined completed result set in one vendor directory.
    pub async fn locate_dir(
        &self,
        bucket: &str,
        vendor_dir: &str,
        metric_type: MetricType,
        day: NaiveDate,
    ) -> LoaderResult<Option<SourceLocation>> {
        for stage in Stage::PREFERENCE {
            let location = SourceLocation {
                bucket: bucket.to_string(),
                prefix: result_prefix(vendor_dir, metric_type, day, stage),
                vendor_dir: vendor_dir.to_string(),
                stage,
            };

            if self.store.exists(bucket, &location.marker_key()).await? {
                info!("Found {}", location.url());
                return Ok(Some(location));
            }
            debug!("No completion marker under {}", location.url());
        }
        Ok(None)
    }

    /// One location per vendor directory that has completed output. Empty when
    /// the vendor has nothing for this day yet.
    pub async fn locate(
        &self,
        bucket: &str,
        vendor: Vendor,
        metric_type: MetricType,
        day: NaiveDate,
    ) -> LoaderResult<Vec<SourceLocation>> {
        let mut locations = Vec::new();
        for vendor_dir in vendor.result_dirs() {
            if let Some(location) = self.locate_dir(bucket, vendor_dir, metric_type, day).await? {
                locations.push(location);
            }
        }
        Ok(locations)
    }
}
