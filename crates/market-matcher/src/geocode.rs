//! Post-hoc geocoding of written tables
//!
//! Older runs stored projected coordinates as a single text cell
//! (`"(354012.5, 5012345.0)"`), which GIS tools cannot map directly. This pass
//! re-reads such a table, converts the pair to WGS84 and appends numeric `X`
//! (longitude) and `Y` (latitude) columns.

use crate::projection::UtmZone;
use crate::{MatcherError, Projected, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Coordinate column of O-D match tables
pub const ORIGIN_XY_COLUMN: &str = "origin_xy";
/// Coordinate column of destination tables
pub const DESTINATION_XY_COLUMN: &str = "destination_xy";

const OUTPUT_SUFFIX: &str = "_WGS84geocode";

/// Parse `"(x, y)"`, `"[x, y]"`, `"x,y"` or `"x y"`
pub fn parse_coordinate_pair(cell: &str) -> Result<Projected> {
    let invalid = || MatcherError::InvalidCoordinatePair(cell.to_string());

    let inner = cell
        .trim()
        .trim_start_matches(['(', '['])
        .trim_end_matches([')', ']']);

    let mut parts = inner
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty());

    let x = parts.next().ok_or_else(invalid)?.parse::<f64>().map_err(|_| invalid())?;
    let y = parts.next().ok_or_else(invalid)?.parse::<f64>().map_err(|_| invalid())?;
    if parts.next().is_some() || !x.is_finite() || !y.is_finite() {
        return Err(invalid());
    }

    Ok(Projected::new(x, y))
}

/// `dir/stem_WGS84geocode.csv`
pub fn geocoded_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.csv", stem, OUTPUT_SUFFIX))
}

/// Pick the coordinate column from a table header
pub fn detect_column(headers: &csv::StringRecord) -> Option<&'static str> {
    [ORIGIN_XY_COLUMN, DESTINATION_XY_COLUMN]
        .into_iter()
        .find(|name| headers.iter().any(|h| h == *name))
}

/// Append `X`/`Y` columns converted from `column` and write the result next
/// to the input. Returns the output path, or `None` for a table with no rows.
pub fn augment_table(input: &Path, column: Option<&str>, zone: UtmZone) -> Result<Option<PathBuf>> {
    let mut reader = csv::Reader::from_path(input)?;
    let headers = reader.headers()?.clone();

    let column = match column {
        Some(name) => name.to_string(),
        None => detect_column(&headers)
            .ok_or_else(|| MatcherError::MissingColumn(ORIGIN_XY_COLUMN.to_string()))?
            .to_string(),
    };
    let index = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| MatcherError::MissingColumn(column.clone()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = record
            .get(index)
            .ok_or_else(|| MatcherError::InvalidCoordinatePair(String::new()))?;
        let geo = zone.to_geographic(parse_coordinate_pair(cell)?);

        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.push(geo.lon.to_string());
        row.push(geo.lat.to_string());
        rows.push(row);
    }

    if rows.is_empty() {
        warn!("{:?} has no rows, nothing to geocode", input);
        return Ok(None);
    }

    let output = geocoded_path(input);
    let mut writer = csv::Writer::from_path(&output)?;
    let mut header: Vec<&str> = headers.iter().collect();
    header.extend(["X", "Y"]);
    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!("Geocoded {} rows from {:?} into {:?}", rows.len(), input, output);

    Ok(Some(output))
}
