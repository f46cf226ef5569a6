//! Trucking cost model
//!
//! Blends four truck classes (Mitra et al., 2007). Each class is costed for
//! the full period volume, loaded out and empty back:
//!
//! ```text
//! trucks = floor(tons / payload) + 1
//! class  = (d · c · (tons + trucks · tare) + d · c · trucks · tare) / proportion
//! cost   = Σ class
//! ```
//!
//! The per-class division by the fleet proportion (a percentage, not a
//! fraction) reproduces the published model and is not renormalized.
//! Cost rates have not been updated for current fuel prices.

use crate::PeriodKind;

/// One truck configuration in the fleet blend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruckClass {
    pub name: &'static str,
    /// Share of the corn-hauling fleet, in percent
    pub proportion: f64,
    /// $ per ton-mile
    pub cost_per_ton_mile: f64,
    pub payload_tons: f64,
    /// Empty vehicle weight
    pub tare_tons: f64,
}

/// 2-axle, 3-axle and 4-axle single units, and the 3-S2 semi
pub const TRUCK_CLASSES: [TruckClass; 4] = [
    TruckClass {
        name: "2A_SU",
        proportion: 9.25,
        cost_per_ton_mile: 0.052,
        payload_tons: 11.25,
        tare_tons: 4.75,
    },
    TruckClass {
        name: "3A_SU",
        proportion: 35.25,
        cost_per_ton_mile: 0.041,
        payload_tons: 14.8,
        tare_tons: 8.2,
    },
    TruckClass {
        name: "4A_SU",
        proportion: 15.25,
        cost_per_ton_mile: 0.029,
        payload_tons: 21.25,
        tare_tons: 8.75,
    },
    TruckClass {
        name: "3_S2",
        proportion: 44.25,
        cost_per_ton_mile: 0.029,
        payload_tons: 26.6,
        tare_tons: 13.4,
    },
];

impl TruckClass {
    /// Full loads needed to move `tons` (fractional)
    pub fn payloads(&self, tons: f64) -> f64 {
        tons / self.payload_tons
    }

    /// Trucks dispatched. Always one more than the whole payload count, so an
    /// exact multiple of the payload still adds a truck.
    pub fn trucks(&self, tons: f64) -> f64 {
        self.payloads(tons).floor() + 1.0
    }

    /// Weighted cost of hauling `tons` over `distance_mi` and returning empty
    pub fn haul_cost(&self, distance_mi: f64, tons: f64) -> f64 {
        let trucks = self.trucks(tons);
        let loaded = distance_mi * self.cost_per_ton_mile * (tons + trucks * self.tare_tons);
        let empty = distance_mi * self.cost_per_ton_mile * trucks * self.tare_tons;
        (loaded + empty) / self.proportion
    }
}

/// Blended trucking cost for moving an origin's period volume
pub fn transport_cost(distance_mi: f64, volume_bu: f64, period: PeriodKind) -> f64 {
    let tons = period.tons(volume_bu);
    TRUCK_CLASSES
        .iter()
        .map(|class| class.haul_cost(distance_mi, tons))
        .sum()
}
