//! Declarative destination fixups
//!
//! Source layers carry known-bad rows (stale prices, mistyped basis quotes,
//! rows from a different survey). Fixes are expressed as data:
//!
//! ```json
//! [
//!   {"when": {"name_equals": "ADM Burr Elevator"}, "field": "october_price", "set": 3.19},
//!   {"when": {"city_equals": "Marshall"}, "field": "spot_price", "set": null}
//! ]
//! ```
//!
//! Rules run once, in order, right after ingestion.

use crate::{DestinationPoint, MatcherError, Result, UNKNOWN_CITY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Destination attribute a rule can read or overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationField {
    Name,
    City,
    Type,
    SpotPrice,
    SpotBasis,
    OctoberPrice,
    OctoberBasis,
}

/// Which destinations a rule applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Always,
    NameEquals(String),
    CityEquals(String),
    FieldEquals { field: DestinationField, value: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRule {
    pub when: Predicate,
    pub field: DestinationField,
    /// Replacement value; `null` clears nullable fields
    pub set: Value,
}

impl DestinationField {
    /// Current value as JSON, for comparisons
    fn get(&self, d: &DestinationPoint) -> Value {
        match self {
            Self::Name => Value::from(d.name.as_str()),
            Self::City => Value::from(d.city.as_str()),
            Self::Type => Value::from(d.kind.as_str()),
            Self::SpotPrice => d.spot_price.map(Value::from).unwrap_or(Value::Null),
            Self::SpotBasis => d.spot_basis.as_deref().map(Value::from).unwrap_or(Value::Null),
            Self::OctoberPrice => d.october_price.map(Value::from).unwrap_or(Value::Null),
            Self::OctoberBasis => d.october_basis.as_deref().map(Value::from).unwrap_or(Value::Null),
        }
    }

    fn set(&self, d: &mut DestinationPoint, value: &Value) -> Result<()> {
        match self {
            Self::Name => d.name = required_text(*self, value)?,
            Self::City => {
                d.city = match value {
                    Value::Null => UNKNOWN_CITY.to_string(),
                    _ => required_text(*self, value)?,
                }
            }
            Self::Type => d.kind = required_text(*self, value)?,
            Self::SpotPrice => d.spot_price = nullable_number(*self, value)?,
            Self::SpotBasis => d.spot_basis = nullable_basis(*self, value)?,
            Self::OctoberPrice => d.october_price = nullable_number(*self, value)?,
            Self::OctoberBasis => d.october_basis = nullable_basis(*self, value)?,
        }
        Ok(())
    }
}

fn required_text(field: DestinationField, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MatcherError::InvalidRule(format!("{:?} requires a string, got {}", field, value)))
}

fn nullable_number(field: DestinationField, value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        other => Err(MatcherError::InvalidRule(format!(
            "{:?} requires a number or null, got {}",
            field, other
        ))),
    }
}

fn nullable_basis(field: DestinationField, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(MatcherError::InvalidRule(format!(
            "{:?} requires a string, number or null, got {}",
            field, other
        ))),
    }
}

impl Predicate {
    pub fn matches(&self, d: &DestinationPoint) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::NameEquals(name) => &d.name == name,
            Predicate::CityEquals(city) => &d.city == city,
            Predicate::FieldEquals { field, value } => match (field.get(d), value) {
                // 3 and 3.0 are the same price
                (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
                (current, value) => &current == value,
            },
        }
    }
}

/// Load a rule list from a JSON file
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<NormalizationRule>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let rules: Vec<NormalizationRule> = serde_json::from_reader(BufReader::new(file))?;
    info!("Loaded {} normalization rules from {:?}", rules.len(), path);
    Ok(rules)
}

/// Apply every rule to every matching destination. Returns the number of
/// field updates made.
pub fn apply_rules(destinations: &mut [DestinationPoint], rules: &[NormalizationRule]) -> Result<usize> {
    let mut applied = 0;

    for rule in rules {
        for destination in destinations.iter_mut() {
            if rule.when.matches(destination) {
                rule.field.set(destination, &rule.set)?;
                debug!(
                    "Set {:?} = {} on {}",
                    rule.field,
                    rule.set,
                    destination.display_name()
                );
                applied += 1;
            }
        }
    }

    info!("Applied {} normalization updates", applied);

    Ok(applied)
}
