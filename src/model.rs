//! Typed network entities as stored and queried.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IntegrityError;

/// A WGS84 point, latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Inclusive latitude/longitude rectangle stops must fall inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }
}

impl Default for BoundingBox {
    /// Hong Kong.
    fn default() -> Self {
        Self {
            min_lat: 22.15,
            max_lat: 22.6,
            min_lng: 113.8,
            max_lng: 114.5,
        }
    }
}

/// Travel direction of a route variant. Stored as 1 (outbound) or 2 (inbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Outbound = 1,
    Inbound = 2,
}

impl Direction {
    /// Maps the upstream bound indicator (`"O"` / `"I"`) to a direction.
    pub fn from_bound(bound: &str) -> Result<Self, IntegrityError> {
        match bound.trim().to_ascii_uppercase().as_str() {
            "O" | "OUTBOUND" => Ok(Direction::Outbound),
            "I" | "INBOUND" => Ok(Direction::Inbound),
            _ => Err(IntegrityError::UnknownBound(bound.to_string())),
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Direction::Outbound),
            2 => Some(Direction::Inbound),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    /// Path segment used by the upstream route-stop endpoint.
    pub fn feed_name(self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("Outbound"),
            Direction::Inbound => f.write_str("Inbound"),
        }
    }
}

/// Service category derived from a route's identifier and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteType {
    Regular,
    Express,
    Night,
    Peak,
    Airport,
    #[serde(rename = "Special Service")]
    SpecialService,
    Special,
    Circular,
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteType::Regular => "Regular",
            RouteType::Express => "Express",
            RouteType::Night => "Night",
            RouteType::Peak => "Peak",
            RouteType::Airport => "Airport",
            RouteType::SpecialService => "Special Service",
            RouteType::Special => "Special",
            RouteType::Circular => "Circular",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub service_type: i64,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub operator: String,
}

impl Stop {
    pub fn coord(&self) -> Coord {
        Coord::new(self.lat, self.lng)
    }

    pub fn check_bounds(&self, bounds: &BoundingBox) -> Result<(), IntegrityError> {
        if bounds.contains(self.lat, self.lng) {
            Ok(())
        } else {
            Err(IntegrityError::OutOfBounds {
                stop_id: self.stop_id.clone(),
                lat: self.lat,
                lng: self.lng,
            })
        }
    }
}

/// One stop's position along a route variant.
///
/// Keyed by `(route_id, stop_id, direction, service_type)`, so a variant can
/// visit a given stop at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStopLink {
    pub route_id: String,
    pub stop_id: String,
    pub direction: Direction,
    pub service_type: i64,
    pub sequence: i64,
}

/// A stop on a route variant joined with its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStop {
    pub stop_id: String,
    pub name: String,
    pub sequence: i64,
    pub coord: Coord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Routes,
    Stops,
    RouteStops,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Routes, EntityType::Stops, EntityType::RouteStops];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Routes => "routes",
            EntityType::Stops => "stops",
            EntityType::RouteStops => "route_stops",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "routes" => Ok(EntityType::Routes),
            "stops" => Ok(EntityType::Stops),
            "route_stops" => Ok(EntityType::RouteStops),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Success,
    Error,
}

impl UpdateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateStatus::Success => "success",
            UpdateStatus::Error => "error",
        }
    }
}

impl FromStr for UpdateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(UpdateStatus::Success),
            "error" => Ok(UpdateStatus::Error),
            other => Err(other.to_string()),
        }
    }
}

/// A row of the append-only update audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateLogEntry {
    pub id: i64,
    pub entity: EntityType,
    pub records: i64,
    pub status: UpdateStatus,
    pub error_message: Option<String>,
    pub logged_at: DateTime<Utc>,
}
