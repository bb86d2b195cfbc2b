//! Vendor catalog
//!
//! A vendor reports usage through one or more upstream result directories.
//! Directories are scanned in the order declared here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetricsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vendor {
    Megaphone,
    Art19,
    Omny,
}

impl Vendor {
    /// Vendors whose daily results are map-reduced upstream.
    pub const ALL: [Vendor; 3] = [Vendor::Megaphone, Vendor::Art19, Vendor::Omny];

    /// Provider code used by the provider-mapping table.
    pub fn code(self) -> &'static str {
        match self {
            Vendor::Megaphone => "MEGAPHONE",
            Vendor::Art19 => "ART19",
            Vendor::Omny => "OMNY",
        }
    }

    pub fn result_dirs(self) -> &'static [&'static str] {
        match self {
            Vendor::Megaphone => &["megaphone"],
            Vendor::Art19 => &["art19"],
            Vendor::Omny => &["omny", "omny-legacy"],
        }
    }
}

impl FromStr for Vendor {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Vendor::ALL
            .into_iter()
            .find(|v| v.code() == wanted)
            .ok_or_else(|| MetricsError::UnknownVendor(s.to_string()))
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
