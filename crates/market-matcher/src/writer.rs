//! Result assembly and output tables
//!
//! Per period, the run writes:
//! - `{prefix}_OD_{Period}.csv`: one row per origin match (routing "Incidents")
//! - `{prefix}_D_{Period}.csv`: one row per distinct selected destination ("Facilities")
//! - `{prefix}_run_{Period}.json`: run metadata
//! - `{prefix}_OD_{Period}.geojson`: O-D lines in WGS84, when requested
//!
//! Output is written only after a period's full origin set has been matched.

use crate::matcher::{MatchStats, PeriodOutcome};
use crate::projection::UtmZone;
use crate::{DestinationSummary, MatchRecord, MatcherError, PeriodKind, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MATCH_TABLE: &str = "O-D match";
pub const DESTINATION_TABLE: &str = "destination";
pub const METADATA_TABLE: &str = "run metadata";
pub const GEOJSON_TABLE: &str = "O-D GeoJSON";

/// Distinct destinations in first-seen order, keyed by display name
pub fn summarize_destinations(records: &[MatchRecord]) -> Vec<DestinationSummary> {
    let mut seen: HashSet<&str> = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(r.destination_name.as_str()))
        .map(DestinationSummary::from)
        .collect()
}

/// Run metadata written next to the tables
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub period: PeriodKind,
    #[serde(flatten)]
    pub stats: MatchStats,
    pub distinct_destinations: usize,
    pub generated_at: String,
}

/// Paths written for one period; `None` where a table was empty
#[derive(Debug, Clone, Default)]
pub struct WrittenOutputs {
    pub matches: Option<PathBuf>,
    pub destinations: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub geojson: Option<PathBuf>,
}

fn wrap<'a>(table: &'static str, path: &'a Path) -> impl FnOnce(MatcherError) -> MatcherError + 'a {
    move |source| MatcherError::OutputWrite {
        table,
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Write rows as CSV with a header derived from the row type's field names.
///
/// Returns `false` without touching the filesystem when there are no rows.
pub fn write_table<T: Serialize>(path: &Path, table: &'static str, rows: &[T]) -> Result<bool> {
    if rows.is_empty() {
        warn!("No rows for {} table, skipping {:?}", table, path);
        return Ok(false);
    }

    let write = || -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    };
    write().map_err(wrap(table, path))?;

    info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(true)
}

fn write_json<T: Serialize>(path: &Path, table: &'static str, value: &T) -> Result<()> {
    let write = || -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), value)?;
        Ok(())
    };
    write().map_err(wrap(table, path))
}

/// O-D lines in geographic coordinates
pub fn to_geojson(records: &[MatchRecord], zone: UtmZone) -> FeatureCollection {
    let features = records
        .iter()
        .map(|r| {
            let from = zone.to_geographic(r.origin_xy);
            let to = zone.to_geographic(r.destination_xy);
            let geometry = Geometry::new(geojson::Value::LineString(vec![
                vec![from.lon, from.lat],
                vec![to.lon, to.lat],
            ]));

            let mut properties = JsonObject::new();
            properties.insert("origin_id".to_string(), JsonValue::from(r.origin_id.as_str()));
            properties.insert(
                "destination_name".to_string(),
                JsonValue::from(r.destination_name.as_str()),
            );
            properties.insert("od_name".to_string(), JsonValue::from(r.od_name.as_str()));
            properties.insert("volume_tons".to_string(), JsonValue::from(r.volume_tons));
            properties.insert("distance_mi".to_string(), JsonValue::from(r.distance_mi));
            properties.insert("profit".to_string(), JsonValue::from(r.profit));

            Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Output file path for one table of one period
pub fn output_path(dir: &Path, prefix: &str, table: &str, period: PeriodKind, extension: &str) -> PathBuf {
    dir.join(format!("{}_{}_{}.{}", prefix, table, period.label(), extension))
}

/// Write every output for a finished period
pub fn write_period_outputs(
    dir: &Path,
    prefix: &str,
    outcome: &PeriodOutcome,
    geojson_zone: Option<UtmZone>,
) -> Result<WrittenOutputs> {
    fs::create_dir_all(dir).map_err(|source| MatcherError::OutputDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    let period = outcome.period;
    let summaries = summarize_destinations(&outcome.records);
    let mut written = WrittenOutputs::default();

    let matches_path = output_path(dir, prefix, "OD", period, "csv");
    if write_table(&matches_path, MATCH_TABLE, &outcome.records)? {
        written.matches = Some(matches_path);
    }

    let destinations_path = output_path(dir, prefix, "D", period, "csv");
    if write_table(&destinations_path, DESTINATION_TABLE, &summaries)? {
        written.destinations = Some(destinations_path);
    }

    if let Some(zone) = geojson_zone {
        if !outcome.records.is_empty() {
            let path = output_path(dir, prefix, "OD", period, "geojson");
            write_json(&path, GEOJSON_TABLE, &to_geojson(&outcome.records, zone))?;
            info!("Wrote {} O-D lines to {:?}", outcome.records.len(), path);
            written.geojson = Some(path);
        }
    }

    let metadata = RunMetadata {
        period,
        stats: outcome.stats.clone(),
        distinct_destinations: summaries.len(),
        generated_at: chrono::Utc::now().to_rfc3339(),
    };
    let metadata_path = output_path(dir, prefix, "run", period, "json");
    write_json(&metadata_path, METADATA_TABLE, &metadata)?;
    written.metadata = Some(metadata_path);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DistanceSource, Projected};
    use tempfile::tempdir;

    fn record(origin: &str, destination: &str, x: f64) -> MatchRecord {
        MatchRecord {
            period: PeriodKind::October,
            origin_id: origin.to_string(),
            volume_bu: 10_000.0,
            volume_tons: 25.2,
            origin_xy: Projected::new(350_000.0, 5_010_000.0),
            destination_name: format!("{}(Benson)", destination),
            destination_city: "Benson".to_string(),
            destination_type: "elevator".to_string(),
            destination_xy: Projected::new(x, 5_012_000.0),
            price: 3.19,
            basis: "-53K".to_string(),
            distance_mi: 4.2,
            distance_source: DistanceSource::Road,
            profit: 3099.5,
            od_name: format!("{} - {}(Benson)", origin, destination),
        }
    }

    fn outcome(records: Vec<MatchRecord>) -> PeriodOutcome {
        PeriodOutcome {
            period: PeriodKind::October,
            stats: MatchStats {
                origins_evaluated: records.len(),
                records_emitted: records.len(),
                ..MatchStats::default()
            },
            records,
        }
    }

    #[test]
    fn test_summary_dedups_by_name_in_first_seen_order() {
        let records = vec![
            record("1", "Cenex", 351_000.0),
            record("2", "ADM", 352_000.0),
            record("3", "Cenex", 351_000.0),
        ];

        let summary = summarize_destinations(&records);
        let names: Vec<&str> = summary.iter().map(|s| s.destination_name.as_str()).collect();
        assert_eq!(names, vec!["Cenex(Benson)", "ADM(Benson)"]);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let records = vec![record("1", "Cenex", 351_000.0), record("2", "Cenex", 351_000.0)];
        assert_eq!(summarize_destinations(&records), summarize_destinations(&records));
        assert_eq!(summarize_destinations(&records).len(), 1);
    }

    #[test]
    fn test_match_table_header_and_pair_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("od.csv");
        assert!(write_table(&path, MATCH_TABLE, &[record("1", "Cenex", 351_000.0)]).unwrap());

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "period,origin_id,volume_bu,volume_tons,origin_xy,destination_name,destination_city,\
             destination_type,destination_xy,price,basis,distance_mi,distance_source,profit,od_name"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("october,1,10000.0,25.2,\"(350000, 5010000)\",Cenex(Benson),"));
        assert!(row.contains(",road,3099.5,1 - Cenex(Benson)"));
    }

    #[test]
    fn test_empty_table_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let rows: Vec<MatchRecord> = Vec::new();
        assert!(!write_table(&path, MATCH_TABLE, &rows).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_write_failure_names_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("od.csv");
        let err = write_table(&path, MATCH_TABLE, &[record("1", "Cenex", 351_000.0)]).unwrap_err();
        assert!(matches!(err, MatcherError::OutputWrite { table: MATCH_TABLE, .. }));
    }

    #[test]
    fn test_unusable_output_dir_names_directory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let output_dir = blocker.join("out");

        let err = write_period_outputs(&output_dir, "Swift", &outcome(Vec::new()), None).unwrap_err();
        match err {
            MatcherError::OutputDirectory { path, .. } => assert_eq!(path, output_dir),
            other => panic!("expected OutputDirectory, got {:?}", other),
        }
    }

    #[test]
    fn test_write_period_outputs() {
        let dir = tempdir().unwrap();
        let outcome = outcome(vec![
            record("1", "Cenex", 351_000.0),
            record("2", "Cenex", 351_000.0),
        ]);

        let written = write_period_outputs(dir.path(), "Swift", &outcome, Some(UtmZone::default())).unwrap();

        let matches = written.matches.unwrap();
        assert!(matches.ends_with("Swift_OD_October.csv"));
        assert_eq!(fs::read_to_string(&matches).unwrap().lines().count(), 3);

        let destinations = written.destinations.unwrap();
        assert!(destinations.ends_with("Swift_D_October.csv"));
        assert_eq!(
            fs::read_to_string(&destinations).unwrap().lines().next().unwrap(),
            "destination_name,destination_city,destination_type,destination_xy"
        );

        let metadata: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(written.metadata.unwrap()).unwrap()).unwrap();
        assert_eq!(metadata["period"], "october");
        assert_eq!(metadata["records_emitted"], 2);
        assert_eq!(metadata["distinct_destinations"], 1);

        let lines: geojson::GeoJson = fs::read_to_string(written.geojson.unwrap()).unwrap().parse().unwrap();
        match lines {
            geojson::GeoJson::FeatureCollection(fc) => assert_eq!(fc.features.len(), 2),
            _ => panic!("expected FeatureCollection"),
        }
    }

    #[test]
    fn test_empty_period_writes_only_metadata() {
        let dir = tempdir().unwrap();
        let written = write_period_outputs(dir.path(), "Dodge", &outcome(Vec::new()), None).unwrap();
        assert!(written.matches.is_none());
        assert!(written.destinations.is_none());
        assert!(written.geojson.is_none());
        assert!(written.metadata.unwrap().exists());
    }
}
