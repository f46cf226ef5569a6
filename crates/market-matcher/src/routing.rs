//! Origin-destination distance resolution
//!
//! Road distance comes from an OSRM-compatible routing service. When the
//! lookup fails for any reason (transport error, timeout, non-2xx status,
//! malformed body, no route) the resolver falls back to a straight-line
//! approximation on the projected plane:
//!
//! ```text
//! miles = (|dx| + |dy|) / 1609.344
//! ```
//!
//! The fallback is only meaningful for projected coordinates in meters (UTM).

use crate::config::MatcherConfig;
use crate::projection::UtmZone;
use crate::{DestinationPoint, Geographic, OriginPoint, Projected, METERS_PER_MILE};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("market-matcher/", env!("CARGO_PKG_VERSION"));

/// Why a road distance lookup did not produce a distance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Routing service returned status {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No route between points")]
    NoRoute,
    #[error("Road lookups disabled")]
    Disabled,
}

/// Road distance provider
pub trait RoadRouter: Send + Sync {
    /// Driving distance in meters between two geographic points
    fn road_distance_m(
        &self,
        from: Geographic,
        to: Geographic,
    ) -> impl Future<Output = Result<f64, RoutingError>> + Send;
}

/// OSRM route response (only the fields we read)
#[derive(Debug, Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// meters
    distance: f64,
}

/// Client for the OSRM `route/v1/driving` endpoint
#[derive(Clone)]
pub struct OsrmRouter {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmRouter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RoutingError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &MatcherConfig) -> Result<Self, RoutingError> {
        Self::new(&config.osrm_url, Duration::from_secs(config.timeout_secs))
    }

    /// `{base}/route/v1/driving/{lon1},{lat1};{lon2},{lat2}`
    pub fn route_url(&self, from: Geographic, to: Geographic) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=false",
            self.base_url, from.lon, from.lat, to.lon, to.lat
        )
    }
}

impl RoadRouter for OsrmRouter {
    async fn road_distance_m(&self, from: Geographic, to: Geographic) -> Result<f64, RoutingError> {
        let url = self.route_url(from, to);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RoutingError::Timeout
            } else {
                RoutingError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(RoutingError::Status(response.status().as_u16()));
        }

        let body: OsrmResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RoutingError::Timeout
            } else {
                RoutingError::Parse(e.to_string())
            }
        })?;

        parse_route_distance(body)
    }
}

fn parse_route_distance(body: OsrmResponse) -> Result<f64, RoutingError> {
    if let Some(code) = body.code.as_deref() {
        if code != "Ok" {
            return Err(RoutingError::Parse(format!("OSRM code {}", code)));
        }
    }

    let route = body.routes.first().ok_or(RoutingError::NoRoute)?;
    if !route.distance.is_finite() || route.distance < 0.0 {
        return Err(RoutingError::Parse(format!(
            "invalid route distance {}",
            route.distance
        )));
    }

    Ok(route.distance)
}

/// Router that never answers; every pair resolves through the fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRouter;

impl RoadRouter for OfflineRouter {
    async fn road_distance_m(&self, _from: Geographic, _to: Geographic) -> Result<f64, RoutingError> {
        Err(RoutingError::Disabled)
    }
}

/// Which method produced a distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceSource {
    Road,
    StraightLine,
}

/// A resolved O-D distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub miles: f64,
    pub source: DistanceSource,
}

/// `(|dx| + |dy|) / 1609.344` on the projected plane
pub fn straight_line_miles(a: Projected, b: Projected) -> f64 {
    ((a.x - b.x).abs() + (a.y - b.y).abs()) / METERS_PER_MILE
}

/// Road lookup with straight-line fallback
pub struct DistanceResolver<R> {
    router: R,
    zone: UtmZone,
}

impl<R: RoadRouter> DistanceResolver<R> {
    pub fn new(router: R, zone: UtmZone) -> Self {
        Self { router, zone }
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    /// Road distance in miles, or the reason the lookup failed
    pub async fn road_miles(&self, from: Projected, to: Projected) -> Result<f64, RoutingError> {
        let from = self.zone.to_geographic(from);
        let to = self.zone.to_geographic(to);
        let meters = self.router.road_distance_m(from, to).await?;
        Ok(meters / METERS_PER_MILE)
    }

    /// Resolve the distance between an origin and a destination.
    ///
    /// Never fails: lookup failures are logged and replaced by the
    /// straight-line approximation.
    pub async fn resolve(&self, origin: &OriginPoint, destination: &DestinationPoint) -> Distance {
        match self.road_miles(origin.location, destination.location).await {
            Ok(miles) => Distance {
                miles,
                source: DistanceSource::Road,
            },
            Err(reason) => {
                let miles = straight_line_miles(origin.location, destination.location);
                if reason == RoutingError::Disabled {
                    debug!(
                        "Straight-line distance for {} -> {}: {:.3} mi",
                        origin.id,
                        destination.display_name(),
                        miles
                    );
                } else {
                    warn!(
                        "Routing distance error ({}), straight-line used for origin {}; destination {}",
                        reason,
                        origin.id,
                        destination.display_name()
                    );
                }
                Distance {
                    miles,
                    source: DistanceSource::StraightLine,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRouter(f64);

    impl RoadRouter for FixedRouter {
        async fn road_distance_m(&self, _from: Geographic, _to: Geographic) -> Result<f64, RoutingError> {
            Ok(self.0)
        }
    }

    struct FailingRouter;

    impl RoadRouter for FailingRouter {
        async fn road_distance_m(&self, _from: Geographic, _to: Geographic) -> Result<f64, RoutingError> {
            Err(RoutingError::Parse("expected value at line 1 column 1".to_string()))
        }
    }

    fn origin(x: f64, y: f64) -> OriginPoint {
        OriginPoint {
            id: "C1".to_string(),
            location: Projected::new(x, y),
            volume_bu: 10_000.0,
        }
    }

    fn destination(x: f64, y: f64) -> DestinationPoint {
        DestinationPoint {
            name: "D1".to_string(),
            city: "Benson".to_string(),
            location: Projected::new(x, y),
            kind: "elevator".to_string(),
            spot_price: Some(3.5),
            spot_basis: Some("50K".to_string()),
            october_price: None,
            october_basis: None,
        }
    }

    #[test]
    fn test_straight_line_is_manhattan_on_plane() {
        let miles = straight_line_miles(Projected::new(0.0, 0.0), Projected::new(-1609.344, 3218.688));
        assert!((miles - 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_road_distance_converted_to_miles() {
        let resolver = DistanceResolver::new(FixedRouter(16_093.44), UtmZone::default());
        let d = resolver
            .resolve(&origin(400_000.0, 5_000_000.0), &destination(410_000.0, 5_000_000.0))
            .await;
        assert_eq!(d.source, DistanceSource::Road);
        assert!((d.miles - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_on_lookup_failure() {
        let resolver = DistanceResolver::new(FailingRouter, UtmZone::default());
        let d = resolver
            .resolve(&origin(0.0, 0.0), &destination(1609.344, 0.0))
            .await;
        assert_eq!(d.source, DistanceSource::StraightLine);
        assert!((d.miles - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_road_miles_exposes_failure_reason() {
        let resolver = DistanceResolver::new(OfflineRouter, UtmZone::default());
        let result = resolver
            .road_miles(Projected::new(0.0, 0.0), Projected::new(1.0, 1.0))
            .await;
        assert_eq!(result, Err(RoutingError::Disabled));
    }

    #[test]
    fn test_route_url_is_lon_lat_ordered() {
        let router = OsrmRouter::new("http://router.example.org/", Duration::from_secs(1)).unwrap();
        let url = router.route_url(
            Geographic { lon: -95.6, lat: 45.3 },
            Geographic { lon: -95.5, lat: 45.25 },
        );
        assert_eq!(
            url,
            "http://router.example.org/route/v1/driving/-95.6,45.3;-95.5,45.25?overview=false"
        );
    }

    #[test]
    fn test_parse_route_distance() {
        let ok: OsrmResponse =
            serde_json::from_str(r#"{"code":"Ok","routes":[{"distance":8046.72,"duration":400}]}"#).unwrap();
        assert_eq!(parse_route_distance(ok), Ok(8046.72));

        let empty: OsrmResponse = serde_json::from_str(r#"{"code":"Ok","routes":[]}"#).unwrap();
        assert_eq!(parse_route_distance(empty), Err(RoutingError::NoRoute));

        let no_route: OsrmResponse = serde_json::from_str(r#"{"code":"NoRoute"}"#).unwrap();
        assert!(matches!(parse_route_distance(no_route), Err(RoutingError::Parse(_))));
    }

    mod osrm {
        use super::*;
        use httpmock::prelude::*;

        fn near_pair() -> (OriginPoint, DestinationPoint) {
            (origin(400_000.0, 5_000_000.0), destination(401_609.344, 5_000_000.0))
        }

        async fn resolve_via(server: &MockServer, timeout: Duration) -> Distance {
            let router = OsrmRouter::new(&server.base_url(), timeout).unwrap();
            let resolver = DistanceResolver::new(router, UtmZone::default());
            let (o, d) = near_pair();
            resolver.resolve(&o, &d).await
        }

        #[tokio::test]
        async fn test_route_found_uses_road_distance() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(GET).query_param("overview", "false");
                    then.status(200).json_body(serde_json::json!({
                        "code": "Ok",
                        "routes": [{"distance": 3218.688, "duration": 180.0}]
                    }));
                })
                .await;

            let d = resolve_via(&server, Duration::from_secs(5)).await;

            mock.assert_async().await;
            assert_eq!(d.source, DistanceSource::Road);
            assert!((d.miles - 2.0).abs() < 1e-9);
        }

        #[tokio::test]
        async fn test_server_error_falls_back() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET);
                    then.status(500).body("internal error");
                })
                .await;

            let d = resolve_via(&server, Duration::from_secs(5)).await;
            assert_eq!(d.source, DistanceSource::StraightLine);
            assert!((d.miles - 1.0).abs() < 1e-9);
        }

        #[tokio::test]
        async fn test_non_json_body_falls_back() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET);
                    then.status(200).body("<html>maintenance</html>");
                })
                .await;

            let d = resolve_via(&server, Duration::from_secs(5)).await;
            assert_eq!(d.source, DistanceSource::StraightLine);
        }

        #[tokio::test]
        async fn test_no_route_code_falls_back() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET);
                    then.status(200).json_body(serde_json::json!({"code": "NoRoute"}));
                })
                .await;

            let d = resolve_via(&server, Duration::from_secs(5)).await;
            assert_eq!(d.source, DistanceSource::StraightLine);
        }

        #[tokio::test]
        async fn test_slow_response_times_out_and_falls_back() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET);
                    then.status(200)
                        .delay(Duration::from_secs(3))
                        .json_body(serde_json::json!({
                            "code": "Ok",
                            "routes": [{"distance": 3218.688}]
                        }));
                })
                .await;

            let router = OsrmRouter::new(&server.base_url(), Duration::from_millis(300)).unwrap();
            let resolver = DistanceResolver::new(router, UtmZone::default());
            let (o, d) = near_pair();

            assert_eq!(
                resolver.road_miles(o.location, d.location).await,
                Err(RoutingError::Timeout)
            );
            let distance = resolver.resolve(&o, &d).await;
            assert_eq!(distance.source, DistanceSource::StraightLine);
            assert!((distance.miles - 1.0).abs() < 1e-9);
        }
    }
}
