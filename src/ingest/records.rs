//! Conversion of raw feed records into the typed model.

use crate::error::IntegrityError;
use crate::model::{Direction, Route, RouteStopLink, Stop};
use crate::services::feed_api::{RawRoute, RawRouteStop, RawStop, Scalar};

const DEFAULT_SERVICE_TYPE: i64 = 1;

fn required<'a>(entity: &'static str, field: &str, value: &'a Option<String>) -> Result<&'a str, IntegrityError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(IntegrityError::malformed(entity, format!("missing {field}"))),
    }
}

fn service_type(entity: &'static str, value: &Option<Scalar>) -> Result<i64, IntegrityError> {
    match value {
        None => Ok(DEFAULT_SERVICE_TYPE),
        Some(s) => s
            .as_i64()
            .filter(|v| *v > 0)
            .ok_or_else(|| IntegrityError::malformed(entity, format!("invalid service_type {s:?}"))),
    }
}

fn coordinate(field: &str, value: &Option<Scalar>) -> Result<f64, IntegrityError> {
    value
        .as_ref()
        .and_then(Scalar::as_f64)
        .ok_or_else(|| IntegrityError::malformed("stop", format!("missing or invalid {field}")))
}

impl RawRoute {
    pub fn into_route(self, operator: &str) -> Result<Route, IntegrityError> {
        let route_id = required("route", "route", &self.route)?.to_string();
        let service_type = service_type("route", &self.service_type)?;
        let origin = self.orig_en.as_deref().map(str::trim).unwrap_or_default().to_string();
        let destination = self.dest_en.as_deref().map(str::trim).unwrap_or_default().to_string();

        Ok(Route {
            name: format!("{origin} → {destination}"),
            route_id,
            origin,
            destination,
            service_type,
            operator: operator.to_string(),
        })
    }
}

impl RawStop {
    /// Bounding-box filtering is left to the store.
    pub fn into_stop(self, operator: &str) -> Result<Stop, IntegrityError> {
        let stop_id = required("stop", "stop", &self.stop)?.to_string();
        let lat = coordinate("lat", &self.lat)?;
        let lng = coordinate("long", &self.long)?;

        Ok(Stop {
            stop_id,
            name: self.name_en.as_deref().map(str::trim).unwrap_or_default().to_string(),
            lat,
            lng,
            operator: operator.to_string(),
        })
    }
}

impl RawRouteStop {
    /// `route_id` and `direction` fill in for fields the record leaves out;
    /// a bound that is present must parse.
    pub fn into_link(self, route_id: &str, direction: Direction) -> Result<RouteStopLink, IntegrityError> {
        let stop_id = required("route-stop", "stop", &self.stop)?.to_string();
        let direction = match self.bound.as_deref().map(str::trim) {
            Some(bound) if !bound.is_empty() => Direction::from_bound(bound)?,
            _ => direction,
        };
        let service_type = service_type("route-stop", &self.service_type)?;
        let sequence = self
            .seq
            .as_ref()
            .and_then(Scalar::as_i64)
            .filter(|v| *v >= 0)
            .ok_or_else(|| IntegrityError::malformed("route-stop", "missing or invalid seq"))?;
        let route_id = match self.route.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => route_id.to_string(),
        };

        Ok(RouteStopLink {
            route_id,
            stop_id,
            direction,
            service_type,
            sequence,
        })
    }
}
