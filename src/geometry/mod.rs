//! Road-following path geometry for a route variant.
//!
//! The stop sequence is cut into overlapping windows that fit the routing
//! provider's waypoint limit, each window is routed independently, and the
//! results are stitched back together in order. Windows the provider cannot
//! route fall back to straight lines between their stops, and the
//! [`Outcome`] says how much of the path is real.

mod cache;
mod provider;
mod resolver;
mod window;

pub use cache::GeometryCache;
pub use provider::{OsrmProvider, RoutingProvider, parse_route_response};
pub use resolver::GeometryResolver;
pub use window::{stitch, window_ranges};

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::model::{Coord, Direction, PathStop};

/// How faithfully a resolved path follows the road network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Every window was routed by the provider.
    FullyRouted,
    /// Some windows fell back to straight lines.
    PartiallyRouted,
    /// No window was routed; the path is the stops joined directly.
    FallbackOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub path: Vec<Coord>,
    pub outcome: Outcome,
    pub routed_windows: usize,
    pub total_windows: usize,
    /// The deadline expired before every window finished.
    pub timed_out: bool,
}

/// Windows finished so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Overrides the configured overall deadline.
    pub deadline: Option<Duration>,
    pub progress: Option<UnboundedSender<Progress>>,
}

/// Cache key: one route variant's ordered stop list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub route_id: String,
    pub direction: Direction,
    pub stop_ids: Vec<String>,
}

impl PathKey {
    pub fn new(route_id: &str, direction: Direction, stop_ids: Vec<String>) -> Self {
        Self {
            route_id: route_id.to_string(),
            direction,
            stop_ids,
        }
    }

    pub fn for_stops(route_id: &str, direction: Direction, stops: &[PathStop]) -> Self {
        Self::new(
            route_id,
            direction,
            stops.iter().map(|s| s.stop_id.clone()).collect(),
        )
    }
}
