//! Routing providers turn a handful of waypoints into a road-following path.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RoutingConfig;
use crate::error::NetworkError;
use crate::fetch::{HttpClient, decode_json, fetch_bytes};
use crate::model::Coord;

/// Abstraction over a routing service (e.g., OSRM).
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Returns the path through `waypoints`, in order, as `[lat, lng]` points.
    async fn route(&self, waypoints: &[Coord]) -> Result<Vec<Coord>, NetworkError>;
}

/// OSRM `route` service client.
pub struct OsrmProvider<C> {
    client: C,
    base_url: String,
    timeout: Duration,
}

impl<C: HttpClient> OsrmProvider<C> {
    pub fn new(client: C, config: &RoutingConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        }
    }

    fn url_for(&self, waypoints: &[Coord]) -> String {
        let coords = waypoints
            .iter()
            .map(|c| format!("{},{}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}/{}?overview=full&geometries=geojson", self.base_url, coords)
    }
}

#[async_trait]
impl<C: HttpClient> RoutingProvider for OsrmProvider<C> {
    async fn route(&self, waypoints: &[Coord]) -> Result<Vec<Coord>, NetworkError> {
        let url = self.url_for(waypoints);
        let bytes = fetch_bytes(&self.client, &url, self.timeout).await?;
        parse_route_response(&url, &bytes)
    }
}

#[derive(Deserialize)]
struct RouteResponse {
    code: Option<String>,
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Deserialize)]
struct RouteEntry {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<Vec<f64>>,
}

/// Extracts `routes[0].geometry.coordinates`, swapping `[lng, lat]` to `[lat, lng]`.
///
/// A path with fewer than two points cannot span a window and is treated as
/// malformed.
pub fn parse_route_response(url: &str, bytes: &[u8]) -> Result<Vec<Coord>, NetworkError> {
    let malformed = |reason: &str| NetworkError::Malformed {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let resp: RouteResponse = decode_json(url, bytes)?;
    if let Some(code) = resp.code.as_deref() {
        if code != "Ok" {
            return Err(malformed(&format!("provider answered {code}")));
        }
    }

    let geometry = resp
        .routes
        .into_iter()
        .next()
        .and_then(|r| r.geometry)
        .ok_or_else(|| malformed("no route geometry"))?;

    let path = geometry
        .coordinates
        .iter()
        .map(|pair| match pair.as_slice() {
            [lng, lat, ..] if lng.is_finite() && lat.is_finite() => Ok(Coord::new(*lat, *lng)),
            _ => Err(malformed("invalid coordinate pair")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if path.len() < 2 {
        return Err(malformed("geometry has fewer than two points"));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;

    #[test]
    fn test_url_uses_lng_lat_order() {
        let config = RoutingConfig {
            base_url: "http://localhost:5000/route/v1/driving/".to_string(),
            ..Default::default()
        };
        let provider = OsrmProvider::new(BasicClient::new().unwrap(), &config);
        let url = provider.url_for(&[Coord::new(22.3, 114.1), Coord::new(22.35, 114.2)]);
        assert_eq!(
            url,
            "http://localhost:5000/route/v1/driving/114.1,22.3;114.2,22.35?overview=full&geometries=geojson"
        );
    }

    #[test]
    fn test_parse_swaps_coordinates() {
        let body = br#"{
            "code": "Ok",
            "routes": [{ "geometry": { "type": "LineString",
                "coordinates": [[114.1, 22.3], [114.15, 22.32], [114.2, 22.35]] } }]
        }"#;
        let path = parse_route_response("u", body).unwrap();
        assert_eq!(
            path,
            vec![
                Coord::new(22.3, 114.1),
                Coord::new(22.32, 114.15),
                Coord::new(22.35, 114.2)
            ]
        );
    }

    #[test]
    fn test_parse_rejects_error_code() {
        let body = br#"{ "code": "NoRoute", "routes": [] }"#;
        assert!(matches!(
            parse_route_response("u", body),
            Err(NetworkError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_geometry() {
        let body = br#"{ "code": "Ok", "routes": [{ "geometry": { "coordinates": [] } }] }"#;
        assert!(parse_route_response("u", body).is_err());

        let body = br#"{ "code": "Ok", "routes": [] }"#;
        assert!(parse_route_response("u", body).is_err());
    }

    #[test]
    fn test_parse_rejects_short_pairs() {
        let body = br#"{ "code": "Ok", "routes": [{ "geometry": { "coordinates": [[114.1], [114.2, 22.3]] } }] }"#;
        assert!(parse_route_response("u", body).is_err());
    }
}
