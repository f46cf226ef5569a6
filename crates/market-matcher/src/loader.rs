//! Point layer ingestion from GeoJSON files
//!
//! Both layers carry projected (UTM meter) point geometries. Attribute names
//! follow the county elevator survey shapefiles the layers are exported from.

use crate::{DestinationPoint, MatcherError, OriginPoint, Projected, Result, UNKNOWN_CITY};
use geojson::{feature::Id, Feature, GeoJson, JsonObject, JsonValue};
use std::fs;
use std::path::Path;
use tracing::info;

const ORIGIN_LAYER: &str = "origin";
const DESTINATION_LAYER: &str = "destination";

// Origin attributes
const VOLUME_FIELD: &str = "Corn_bu";
const ORIGIN_ID_FIELD: &str = "CornID";

// Destination attributes
const NAME_FIELD: &str = "Company_Na";
const CITY_FIELD: &str = "City";
const TYPE_FIELD: &str = "type";
const SPOT_PRICE_FIELD: &str = "Spot";
const SPOT_BASIS_FIELD: &str = "Spot_K";
const OCTOBER_PRICE_FIELD: &str = "price_10_1";
const OCTOBER_BASIS_FIELD: &str = "basis_10_1";

fn ingestion_error(layer: &'static str, index: usize, message: impl AsRef<str>) -> MatcherError {
    MatcherError::Ingestion {
        layer,
        message: format!("feature {}: {}", index, message.as_ref()),
    }
}

/// Read a file as a GeoJSON FeatureCollection
fn read_features(path: &Path, layer: &'static str) -> Result<Vec<Feature>> {
    let text = fs::read_to_string(path)?;
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection.features),
        _ => Err(MatcherError::Ingestion {
            layer,
            message: format!("{:?} is not a FeatureCollection", path),
        }),
    }
}

/// Projected point coordinates of a feature
fn point_of(feature: &Feature, layer: &'static str, index: usize) -> Result<Projected> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| ingestion_error(layer, index, "missing geometry"))?;

    match &geometry.value {
        geojson::Value::Point(position) if position.len() >= 2 => {
            let (x, y) = (position[0], position[1]);
            if !x.is_finite() || !y.is_finite() {
                return Err(ingestion_error(layer, index, "non-finite coordinates"));
            }
            Ok(Projected::new(x, y))
        }
        geojson::Value::Point(_) => Err(ingestion_error(layer, index, "point has fewer than 2 coordinates")),
        other => Err(ingestion_error(
            layer,
            index,
            format!("expected Point geometry, found {}", geometry_kind(other)),
        )),
    }
}

fn geometry_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn properties_of<'a>(feature: &'a Feature, layer: &'static str, index: usize) -> Result<&'a JsonObject> {
    feature
        .properties
        .as_ref()
        .ok_or_else(|| ingestion_error(layer, index, "missing properties"))
}

/// Required string attribute
fn required_str(props: &JsonObject, field: &str, layer: &'static str, index: usize) -> Result<String> {
    match props.get(field) {
        Some(JsonValue::String(s)) => Ok(s.clone()),
        Some(JsonValue::Null) | None => Err(ingestion_error(layer, index, format!("missing {}", field))),
        Some(other) => Err(ingestion_error(
            layer,
            index,
            format!("{} must be a string, found {}", field, other),
        )),
    }
}

/// Nullable numeric attribute
fn optional_f64(props: &JsonObject, field: &str, layer: &'static str, index: usize) -> Result<Option<f64>> {
    match props.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ingestion_error(layer, index, format!("{} is not a finite number", field))),
        Some(other) => Err(ingestion_error(
            layer,
            index,
            format!("{} must be a number, found {}", field, other),
        )),
    }
}

/// Nullable basis attribute; numbers are accepted and kept as text
fn optional_basis(props: &JsonObject, field: &str, layer: &'static str, index: usize) -> Result<Option<String>> {
    match props.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(ingestion_error(
            layer,
            index,
            format!("{} must be a string, found {}", field, other),
        )),
    }
}

/// Feature id, `CornID` attribute, or the feature index
fn origin_id(feature: &Feature, props: &JsonObject, index: usize) -> String {
    match &feature.id {
        Some(Id::String(s)) => s.clone(),
        Some(Id::Number(n)) => n.to_string(),
        None => match props.get(ORIGIN_ID_FIELD) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => index.to_string(),
        },
    }
}

/// Strip non-breaking spaces left over from spreadsheet exports
fn clean_name(name: &str) -> String {
    name.replace('\u{a0}', "").trim().to_string()
}

/// Load origin production points
pub fn load_origins(path: impl AsRef<Path>) -> Result<Vec<OriginPoint>> {
    let path = path.as_ref();
    info!("Loading origins from {:?}", path);

    let features = read_features(path, ORIGIN_LAYER)?;
    let mut origins = Vec::with_capacity(features.len());

    for (i, feature) in features.iter().enumerate() {
        let location = point_of(feature, ORIGIN_LAYER, i)?;
        let props = properties_of(feature, ORIGIN_LAYER, i)?;

        let volume_bu = optional_f64(props, VOLUME_FIELD, ORIGIN_LAYER, i)?
            .ok_or_else(|| ingestion_error(ORIGIN_LAYER, i, format!("missing {}", VOLUME_FIELD)))?;
        if volume_bu < 0.0 {
            return Err(ingestion_error(
                ORIGIN_LAYER,
                i,
                format!("negative {} ({})", VOLUME_FIELD, volume_bu),
            ));
        }

        origins.push(OriginPoint {
            id: origin_id(feature, props, i),
            location,
            volume_bu,
        });
    }

    info!("Loaded {} origins", origins.len());

    Ok(origins)
}

/// Load candidate destinations
pub fn load_destinations(path: impl AsRef<Path>) -> Result<Vec<DestinationPoint>> {
    let path = path.as_ref();
    info!("Loading destinations from {:?}", path);

    let features = read_features(path, DESTINATION_LAYER)?;
    let mut destinations = Vec::with_capacity(features.len());

    for (i, feature) in features.iter().enumerate() {
        let location = point_of(feature, DESTINATION_LAYER, i)?;
        let props = properties_of(feature, DESTINATION_LAYER, i)?;

        let name = clean_name(&required_str(props, NAME_FIELD, DESTINATION_LAYER, i)?);
        let city = match props.get(CITY_FIELD) {
            None | Some(JsonValue::Null) => UNKNOWN_CITY.to_string(),
            Some(_) => required_str(props, CITY_FIELD, DESTINATION_LAYER, i)?,
        };

        destinations.push(DestinationPoint {
            name,
            city,
            location,
            kind: required_str(props, TYPE_FIELD, DESTINATION_LAYER, i)?,
            spot_price: optional_f64(props, SPOT_PRICE_FIELD, DESTINATION_LAYER, i)?,
            spot_basis: optional_basis(props, SPOT_BASIS_FIELD, DESTINATION_LAYER, i)?,
            october_price: optional_f64(props, OCTOBER_PRICE_FIELD, DESTINATION_LAYER, i)?,
            october_basis: optional_basis(props, OCTOBER_BASIS_FIELD, DESTINATION_LAYER, i)?,
        });
    }

    let complete = destinations
        .iter()
        .filter(|d| d.spot_price.is_some() && d.october_price.is_some())
        .count();
    info!(
        "Loaded {} destinations ({} priced for both periods)",
        destinations.len(),
        complete
    );

    Ok(destinations)
}
