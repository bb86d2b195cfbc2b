//! Domain catalogs shared across podmetrics crates

pub mod metrics;
pub mod vendors;

pub use metrics::{
    permanent_table, Category, Interval, MetricType, Tier, DEFAULT_CATEGORY_CODE,
    DEFAULT_METRIC_VALUE,
};
pub use vendors::Vendor;
