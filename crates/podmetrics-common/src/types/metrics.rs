//! Metric-type catalog
//!
//! Every [`MetricType`] decomposes into exactly one `(Tier, Interval, Category)`
//! triple. The triple routes a metric to its permanent table, the identifier
//! kind used to resolve vendor ids, and the value conversion applied on ingest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetricsError;

/// Category code stored for metrics without a named dimension.
pub const DEFAULT_CATEGORY_CODE: &str = "DOWNLOADS";

/// Value stored for metrics without a named dimension.
pub const DEFAULT_METRIC_VALUE: &str = "total";

/// Entity level a metric applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Podcast,
    Episode,
}

impl Tier {
    pub fn name(self) -> &'static str {
        match self {
            Tier::Podcast => "PODCAST",
            Tier::Episode => "EPISODE",
        }
    }

    /// Column holding the canonical entity id in permanent and override tables.
    pub fn id_column(self) -> &'static str {
        match self {
            Tier::Podcast => "podcast_id",
            Tier::Episode => "episode_id",
        }
    }

    /// Table of manually curated corrections for this tier.
    pub fn override_table(self) -> &'static str {
        match self {
            Tier::Podcast => "podcast_metrics_override",
            Tier::Episode => "episode_metrics_override",
        }
    }
}

impl FromStr for Tier {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PODCAST" => Ok(Tier::Podcast),
            "EPISODE" => Ok(Tier::Episode),
            _ => Err(MetricsError::UnsupportedTier(s.to_string())),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Time granularity of aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interval {
    Hour,
    Day,
}

impl Interval {
    pub fn name(self) -> &'static str {
        match self {
            Interval::Hour => "HOUR",
            Interval::Day => "DAY",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named secondary dimension. Metrics without one use [`DEFAULT_CATEGORY_CODE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    City,
    Country,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::City => "CITY",
            Category::Country => "COUNTRY",
        }
    }
}

/// Permanent table for a `(Tier, Interval)` pair.
pub fn permanent_table(tier: Tier, interval: Interval) -> &'static str {
    match (tier, interval) {
        (Tier::Podcast, Interval::Day) => "podcast_metrics_daily",
        (Tier::Podcast, Interval::Hour) => "podcast_metrics_hourly",
        (Tier::Episode, Interval::Day) => "episode_metrics_daily",
        (Tier::Episode, Interval::Hour) => "episode_metrics_hourly",
    }
}

/// Interval metric produced by the upstream batch computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricType {
    PodcastDay,
    PodcastDayCity,
    PodcastDayCountry,
    EpisodeDay,
    EpisodeDayCity,
    EpisodeDayCountry,
    PodcastHour,
    EpisodeHour,
}

impl MetricType {
    /// Every known metric type, in catalog order.
    pub const ALL: [MetricType; 8] = [
        MetricType::PodcastDay,
        MetricType::PodcastDayCity,
        MetricType::PodcastDayCountry,
        MetricType::EpisodeDay,
        MetricType::EpisodeDayCity,
        MetricType::EpisodeDayCountry,
        MetricType::PodcastHour,
        MetricType::EpisodeHour,
    ];

    /// Metric types loaded by default from the map-reduced daily results.
    pub const MAPREDUCED: [MetricType; 6] = [
        MetricType::PodcastDay,
        MetricType::PodcastDayCity,
        MetricType::PodcastDayCountry,
        MetricType::EpisodeDay,
        MetricType::EpisodeDayCity,
        MetricType::EpisodeDayCountry,
    ];

    pub fn components(self) -> (Tier, Interval, Option<Category>) {
        use Category::*;
        use Interval::*;
        use Tier::*;
        match self {
            MetricType::PodcastDay => (Podcast, Day, None),
            MetricType::PodcastDayCity => (Podcast, Day, Some(City)),
            MetricType::PodcastDayCountry => (Podcast, Day, Some(Country)),
            MetricType::EpisodeDay => (Episode, Day, None),
            MetricType::EpisodeDayCity => (Episode, Day, Some(City)),
            MetricType::EpisodeDayCountry => (Episode, Day, Some(Country)),
            MetricType::PodcastHour => (Podcast, Hour, None),
            MetricType::EpisodeHour => (Episode, Hour, None),
        }
    }

    pub fn tier(self) -> Tier {
        self.components().0
    }

    pub fn interval(self) -> Interval {
        self.components().1
    }

    pub fn category(self) -> Option<Category> {
        self.components().2
    }

    /// Category code written to staging and permanent rows.
    pub fn category_code(self) -> &'static str {
        self.category()
            .map(Category::name)
            .unwrap_or(DEFAULT_CATEGORY_CODE)
    }

    pub fn permanent_table(self) -> &'static str {
        let (tier, interval, _) = self.components();
        permanent_table(tier, interval)
    }

    /// Upper-case catalog name, e.g. `EPISODE_DAY_CITY`.
    pub fn name(self) -> &'static str {
        match self {
            MetricType::PodcastDay => "PODCAST_DAY",
            MetricType::PodcastDayCity => "PODCAST_DAY_CITY",
            MetricType::PodcastDayCountry => "PODCAST_DAY_COUNTRY",
            MetricType::EpisodeDay => "EPISODE_DAY",
            MetricType::EpisodeDayCity => "EPISODE_DAY_CITY",
            MetricType::EpisodeDayCountry => "EPISODE_DAY_COUNTRY",
            MetricType::PodcastHour => "PODCAST_HOUR",
            MetricType::EpisodeHour => "EPISODE_HOUR",
        }
    }

    /// Lower-case name used for upstream result directories and staging tables.
    pub fn dir_name(self) -> String {
        self.name().to_ascii_lowercase()
    }
}

impl FromStr for MetricType {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        MetricType::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| MetricsError::UnknownMetricType(s.to_string()))
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
