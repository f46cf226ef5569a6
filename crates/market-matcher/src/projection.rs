//! UTM to WGS84 conversion
//!
//! Inverse transverse Mercator on the WGS84 ellipsoid (Krüger series to the
//! fifth order in the third flattening). Accurate to well under a meter
//! inside a zone, which is far tighter than the routing lookups need.

use crate::{Geographic, MatcherError, Projected, Result};
use serde::{Deserialize, Serialize};

/// UTM scale factor on the central meridian
const K0: f64 = 0.9996;
/// WGS84 equatorial radius (m)
const R: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared
const E: f64 = 0.00669438;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A UTM zone: number 1-60 and hemisphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmZone {
    pub number: u8,
    pub northern: bool,
}

impl Default for UtmZone {
    /// Zone 15 North (Minnesota, Iowa)
    fn default() -> Self {
        Self {
            number: 15,
            northern: true,
        }
    }
}

impl UtmZone {
    pub fn new(number: u8, northern: bool) -> Result<Self> {
        if !(1..=60).contains(&number) {
            return Err(MatcherError::Config(format!(
                "UTM zone must be in 1..=60, got {}",
                number
            )));
        }
        Ok(Self { number, northern })
    }

    /// Longitude of the zone's central meridian in degrees
    pub fn central_meridian(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// Convert projected easting/northing (meters) to longitude/latitude
    pub fn to_geographic(&self, point: Projected) -> Geographic {
        let e2 = E * E;
        let e3 = e2 * E;
        let e_p2 = E / (1.0 - E);

        let sqrt_e = (1.0 - E).sqrt();
        let n1 = (1.0 - sqrt_e) / (1.0 + sqrt_e);
        let n2 = n1 * n1;
        let n3 = n2 * n1;
        let n4 = n3 * n1;
        let n5 = n4 * n1;

        let m1 = 1.0 - E / 4.0 - 3.0 * e2 / 64.0 - 5.0 * e3 / 256.0;
        let p2 = 3.0 / 2.0 * n1 - 27.0 / 32.0 * n3 + 269.0 / 512.0 * n5;
        let p3 = 21.0 / 16.0 * n2 - 55.0 / 32.0 * n4;
        let p4 = 151.0 / 96.0 * n3 - 417.0 / 128.0 * n5;
        let p5 = 1097.0 / 512.0 * n4;

        let x = point.x - FALSE_EASTING;
        let y = if self.northern {
            point.y
        } else {
            point.y - FALSE_NORTHING_SOUTH
        };

        // Footpoint latitude
        let mu = y / K0 / (R * m1);
        let p_rad = mu
            + p2 * (2.0 * mu).sin()
            + p3 * (4.0 * mu).sin()
            + p4 * (6.0 * mu).sin()
            + p5 * (8.0 * mu).sin();

        let p_sin = p_rad.sin();
        let p_sin2 = p_sin * p_sin;
        let p_cos = p_rad.cos();
        let p_tan = p_sin / p_cos;
        let p_tan2 = p_tan * p_tan;
        let p_tan4 = p_tan2 * p_tan2;

        let ep_sin = 1.0 - E * p_sin2;
        let n = R / ep_sin.sqrt();
        let r = (1.0 - E) / ep_sin;

        let c = e_p2 * p_cos * p_cos;
        let c2 = c * c;

        let d = x / (n * K0);
        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let lat = p_rad
            - (p_tan / r)
                * (d2 / 2.0 - d4 / 24.0 * (5.0 + 3.0 * p_tan2 + 10.0 * c - 4.0 * c2 - 9.0 * e_p2)
                    + d6 / 720.0
                        * (61.0 + 90.0 * p_tan2 + 298.0 * c + 45.0 * p_tan4
                            - 252.0 * e_p2
                            - 3.0 * c2));

        let lon = (d - d3 / 6.0 * (1.0 + 2.0 * p_tan2 + c)
            + d5 / 120.0 * (5.0 - 2.0 * c + 28.0 * p_tan2 - 3.0 * c2 + 8.0 * e_p2 + 24.0 * p_tan4))
            / p_cos;

        Geographic {
            lon: wrap_degrees(lon.to_degrees() + self.central_meridian()),
            lat: lat.to_degrees(),
        }
    }
}

/// Wrap a longitude into [-180, 180)
fn wrap_degrees(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
