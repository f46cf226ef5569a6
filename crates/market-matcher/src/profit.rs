//! Net profit of one O-D pair

use crate::cost::transport_cost;
use crate::income::{income, Quote};
use crate::PeriodKind;

/// Round to whole cents, half away from zero: `0.125` becomes `0.13`, where
/// `%.2f`-style formatting (half to even on the binary value) would give `0.12`.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `income - cost`, rounded to cents
pub fn profit(distance_mi: f64, volume_bu: f64, quote: &Quote, period: PeriodKind) -> f64 {
    round_cents(income(quote, volume_bu, period) - transport_cost(distance_mi, volume_bu, period))
}
