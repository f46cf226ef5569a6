//! Run configuration
//!
//! Defaults reproduce the original county study (OSRM demo server, UTM 15N).
//! A JSON file can override any subset of fields; CLI flags override the file.

use crate::projection::UtmZone;
use crate::{MatcherError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const DEFAULT_OSRM_URL: &str = "http://router.project-osrm.org";

/// Matcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Base URL of an OSRM-compatible routing service
    pub osrm_url: String,
    /// Per-request timeout; a timeout falls back to straight-line distance
    pub timeout_secs: u64,
    /// Origins evaluated concurrently (caps in-flight routing requests)
    pub max_concurrent: usize,
    /// Projection of the input layers
    pub utm_zone: UtmZone,
    /// Skip road lookups and use straight-line distances throughout
    pub offline: bool,
    /// Prefix for output file names
    pub output_prefix: String,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            osrm_url: DEFAULT_OSRM_URL.to_string(),
            timeout_secs: 10,
            max_concurrent: 4,
            utm_zone: UtmZone::default(),
            offline: false,
            output_prefix: "Market".to_string(),
        }
    }
}

impl MatcherConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(MatcherError::Config("max_concurrent must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(MatcherError::Config("timeout_secs must be at least 1".to_string()));
        }
        if !self.offline && self.osrm_url.trim().is_empty() {
            return Err(MatcherError::Config("osrm_url is empty".to_string()));
        }
        UtmZone::new(self.utm_zone.number, self.utm_zone.northern)?;
        Ok(())
    }
}
