//! Raw categorical value to display value
//!
//! Geographic metric types carry codes upstream (Nielsen DMA ids for cities,
//! ISO 3166-1 alpha-2 for countries) and are stored under display names. Every
//! other metric type passes its raw value through.

use podmetrics_common::types::{Category, MetricType};
use std::collections::HashMap;
use std::sync::Arc;

/// Geographic reference tables
pub trait GeoReference: Send + Sync {
    fn dma_name(&self, dma_code: &str) -> Option<String>;
    fn country_name(&self, alpha2: &str) -> Option<String>;
}

/// Reference tables held in memory, loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct GeoTables {
    dma: HashMap<String, String>,
    countries: HashMap<String, String>,
}

impl GeoTables {
    pub fn from_pairs<D, C, K, V>(dma: D, countries: C) -> Self
    where
        D: IntoIterator<Item = (K, V)>,
        C: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            dma: dma.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            countries: countries
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_uppercase(), v.into()))
                .collect(),
        }
    }

    pub fn dma_count(&self) -> usize {
        self.dma.len()
    }

    pub fn country_count(&self) -> usize {
        self.countries.len()
    }
}

impl GeoReference for GeoTables {
    fn dma_name(&self, dma_code: &str) -> Option<String> {
        self.dma.get(dma_code.trim()).cloned()
    }

    fn country_name(&self, alpha2: &str) -> Option<String> {
        self.countries.get(&alpha2.trim().to_ascii_uppercase()).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Dma,
    Country,
}

/// Conversion registered for a metric type; `None` passes values through.
fn conversion(metric_type: MetricType) -> Option<Conversion> {
    match metric_type.category()? {
        Category::City => Some(Conversion::Dma),
        Category::Country => Some(Conversion::Country),
    }
}

#[derive(Clone)]
pub struct ValueNormalizer {
    geo: Arc<dyn GeoReference>,
}

impl ValueNormalizer {
    pub fn new(geo: Arc<dyn GeoReference>) -> Self {
        Self { geo }
    }

    /// `None` means the row must be dropped: either the code is unknown to the
    /// reference table or the value is empty.
    pub fn normalize(&self, metric_type: MetricType, raw_value: &str) -> Option<String> {
        let value = match conversion(metric_type) {
            None => Some(raw_value.to_string()),
            Some(Conversion::Dma) => self.geo.dma_name(raw_value),
            Some(Conversion::Country) => self.geo.country_name(raw_value),
        };
        value.filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn normalizer() -> ValueNormalizer {
        let geo = GeoTables::from_pairs(
            [("506", "Boston (Manchester)"), ("501", "New York")],
            [("US", "United States"), ("de", "Germany")],
        );
        ValueNormalizer::new(Arc::new(geo))
    }

    #[test]
    fn test_city_codes_become_dma_names() {
        let n = normalizer();
        assert_eq!(
            n.normalize(MetricType::EpisodeDayCity, "506").as_deref(),
            Some("Boston (Manchester)")
        );
        assert_eq!(n.normalize(MetricType::PodcastDayCity, "999"), None);
    }

    #[test]
    fn test_country_codes_are_case_insensitive() {
        let n = normalizer();
        assert_eq!(
            n.normalize(MetricType::PodcastDayCountry, "us").as_deref(),
            Some("United States")
        );
        assert_eq!(
            n.normalize(MetricType::EpisodeDayCountry, "DE").as_deref(),
            Some("Germany")
        );
        assert_eq!(n.normalize(MetricType::EpisodeDayCountry, "XX"), None);
    }

    #[test]
    fn test_other_metric_types_pass_through() {
        let n = normalizer();
        assert_eq!(n.normalize(MetricType::EpisodeDay, "total").as_deref(), Some("total"));
        assert_eq!(n.normalize(MetricType::EpisodeHour, ""), None);
    }
}
