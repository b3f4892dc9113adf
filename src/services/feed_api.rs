//! Trait and raw record shapes for the upstream transit feed.
//!
//! Upstream fields are loosely typed (numbers often arrive as strings), so
//! every field is optional here and validated when converted into the typed
//! model in [`crate::ingest`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::NetworkError;
use crate::model::Direction;

/// A JSON scalar that may carry a number as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Scalar::Float(_) => None,
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
        .filter(|v: &f64| v.is_finite())
    }
}

/// One entry of the route list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRoute {
    pub route: Option<String>,
    pub bound: Option<String>,
    pub service_type: Option<Scalar>,
    pub orig_en: Option<String>,
    pub dest_en: Option<String>,
}

/// One entry of the stop list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStop {
    pub stop: Option<String>,
    pub name_en: Option<String>,
    pub lat: Option<Scalar>,
    pub long: Option<Scalar>,
}

/// One stop of a route variant's stop list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRouteStop {
    pub route: Option<String>,
    pub bound: Option<String>,
    pub service_type: Option<Scalar>,
    pub seq: Option<Scalar>,
    pub stop: Option<String>,
}

/// Typed `{type, data}` envelope wrapping every feed response.
#[derive(Debug, Deserialize)]
pub struct FeedEnvelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Abstraction over an upstream transit feed (e.g., KMB open data).
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn fetch_routes(&self) -> Result<Vec<RawRoute>, NetworkError>;

    async fn fetch_stops(&self) -> Result<Vec<RawStop>, NetworkError>;

    /// Stops served by one route variant, in upstream order.
    async fn fetch_route_stops(
        &self,
        route_id: &str,
        direction: Direction,
        service_type: i64,
    ) -> Result<Vec<RawRouteStop>, NetworkError>;
}
