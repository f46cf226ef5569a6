//! Grain Market Matcher
//!
//! For every origin production point, evaluates every candidate elevator
//! market and keeps the single destination with the highest net profit for
//! one delivery period.
//!
//! # Profit Model
//!
//! ```text
//! profit(o, d) = income(price_d, basis_d, bu_o, period) - cost(dist(o, d), bu_o, period)
//! ```
//!
//! | Period  | Share of annual production | Sale price          |
//! |---------|----------------------------|---------------------|
//! | April   | 0.07                       | spot price          |
//! | October | 0.09                       | price - basis / 100 |
//!
//! # Pipeline
//!
//! 1. [`loader`] reads origin and destination point layers (GeoJSON, projected)
//! 2. [`normalize`] applies declarative data fixups to destinations
//! 3. [`matcher`] scans all O-D pairs, resolving distances through [`routing`]
//! 4. [`writer`] deduplicates selected destinations and writes the tables
//! 5. [`geocode`] re-projects coordinate cells of written tables after the fact

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub mod config;
pub mod cost;
pub mod geocode;
pub mod income;
pub mod loader;
pub mod matcher;
pub mod normalize;
pub mod profit;
pub mod projection;
pub mod routing;
pub mod writer;

pub use config::MatcherConfig;
pub use matcher::{MatchStats, Matcher, PeriodOutcome};
pub use projection::UtmZone;
pub use routing::{DistanceResolver, DistanceSource, OsrmRouter, RoadRouter};

/// Meters in one statute mile
pub const METERS_PER_MILE: f64 = 1609.344;

/// Weight of one bushel of shelled corn in pounds
pub const POUNDS_PER_BUSHEL: f64 = 56.0;

/// Pounds in one short ton
pub const POUNDS_PER_TON: f64 = 2000.0;

/// Sentinel city for destinations ingested without one
pub const UNKNOWN_CITY: &str = "unknown";

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Ingestion failed for {layer} layer: {message}")]
    Ingestion { layer: &'static str, message: String },
    #[error("Failed to write {table} table to {path:?}: {source}")]
    OutputWrite {
        table: &'static str,
        path: PathBuf,
        #[source]
        source: Box<MatcherError>,
    },
    #[error("Cannot create output directory {path:?}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Basis {0:?} has no numeric prefix")]
    InvalidBasis(String),
    #[error("Cannot parse coordinate pair from {0:?}")]
    InvalidCoordinatePair(String),
    #[error("Column {0:?} not found in table header")]
    MissingColumn(String),
    #[error("Invalid normalization rule: {0}")]
    InvalidRule(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MatcherError>;

/// Evaluation period. Each period is an independent full matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    /// Spot delivery, priced at the spot price
    April,
    /// Deferred delivery, priced at price minus basis
    October,
}

impl PeriodKind {
    pub const ALL: [PeriodKind; 2] = [PeriodKind::April, PeriodKind::October];

    /// Fixed share of annual production marketed in this period
    pub fn share(&self) -> f64 {
        match self {
            PeriodKind::April => 0.07,
            PeriodKind::October => 0.09,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PeriodKind::April => "April",
            PeriodKind::October => "October",
        }
    }

    /// Whether the sale price is adjusted by the basis
    pub fn uses_basis(&self) -> bool {
        matches!(self, PeriodKind::October)
    }

    /// Annual bushels converted to short tons marketed in this period
    pub fn tons(&self, volume_bu: f64) -> f64 {
        (volume_bu * POUNDS_PER_BUSHEL) / POUNDS_PER_TON * self.share()
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Planar coordinates in a projected (UTM, meters) reference system.
///
/// Serializes as a single `"(x, y)"` text cell, which is the layout the
/// downstream GIS tooling and [`geocode`] expect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub x: f64,
    pub y: f64,
}

impl Projected {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Projected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Serialize for Projected {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// WGS84 longitude/latitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geographic {
    pub lon: f64,
    pub lat: f64,
}

/// A production point (corn field aggregate)
#[derive(Debug, Clone, PartialEq)]
pub struct OriginPoint {
    pub id: String,
    pub location: Projected,
    /// Total annual production in bushels
    pub volume_bu: f64,
}

/// A candidate buyer (grain elevator, ethanol plant, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationPoint {
    pub name: String,
    pub city: String,
    pub location: Projected,
    pub kind: String,
    pub spot_price: Option<f64>,
    pub spot_basis: Option<String>,
    pub october_price: Option<f64>,
    pub october_basis: Option<String>,
}

impl DestinationPoint {
    /// `Name(City)`, the uniqueness key for destination summaries
    pub fn display_name(&self) -> String {
        format!("{}({})", self.name, self.city)
    }

    pub fn price(&self, period: PeriodKind) -> Option<f64> {
        match period {
            PeriodKind::April => self.spot_price,
            PeriodKind::October => self.october_price,
        }
    }

    pub fn basis(&self, period: PeriodKind) -> Option<&str> {
        match period {
            PeriodKind::April => self.spot_basis.as_deref(),
            PeriodKind::October => self.october_basis.as_deref(),
        }
    }
}

/// Best destination for one origin in one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub period: PeriodKind,
    pub origin_id: String,
    pub volume_bu: f64,
    pub volume_tons: f64,
    pub origin_xy: Projected,
    pub destination_name: String,
    pub destination_city: String,
    pub destination_type: String,
    pub destination_xy: Projected,
    pub price: f64,
    pub basis: String,
    pub distance_mi: f64,
    pub distance_source: DistanceSource,
    pub profit: f64,
    pub od_name: String,
}

/// One row per distinct destination selected by any origin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationSummary {
    pub destination_name: String,
    pub destination_city: String,
    pub destination_type: String,
    pub destination_xy: Projected,
}

impl From<&MatchRecord> for DestinationSummary {
    fn from(record: &MatchRecord) -> Self {
        Self {
            destination_name: record.destination_name.clone(),
            destination_city: record.destination_city.clone(),
            destination_type: record.destination_type.clone(),
            destination_xy: record.destination_xy,
        }
    }
}
