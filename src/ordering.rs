//! Route identifier ordering and route type classification.

use crate::config::RouteTypeRules;
use crate::model::{Route, RouteType};

/// Splits a route id into its leading number and the remainder.
///
/// `"219X"` becomes `(219, "X")`. Ids without leading digits become
/// `(0, id)` and so sort before every numeric id.
pub fn natural_sort_key(route_id: &str) -> (u64, String) {
    let digits = route_id
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(route_id.len(), |(i, _)| i);

    if digits == 0 {
        return (0, route_id.to_string());
    }

    let number = route_id[..digits].parse().unwrap_or(u64::MAX);
    (number, route_id[digits..].to_string())
}

/// Stable ascending sort by [`natural_sort_key`].
pub fn sort_route_ids<S: AsRef<str>>(ids: &mut [S]) {
    ids.sort_by_cached_key(|id| natural_sort_key(id.as_ref()));
}

pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by_cached_key(|r| natural_sort_key(&r.route_id));
}

/// Classifies a route from its destination and identifier.
///
/// A circular keyword in the destination wins over any identifier suffix.
/// Otherwise the first matching suffix rule decides, and a route matching
/// nothing is [`RouteType::Regular`].
pub fn classify_route_type(route: &Route, rules: &RouteTypeRules) -> RouteType {
    let destination = route.destination.to_uppercase();
    if rules
        .circular_keywords
        .iter()
        .any(|k| !k.is_empty() && destination.contains(&k.to_uppercase()))
    {
        return RouteType::Circular;
    }

    let route_id = route.route_id.to_uppercase();
    rules
        .suffixes
        .iter()
        .find(|rule| !rule.suffix.is_empty() && route_id.ends_with(&rule.suffix.to_uppercase()))
        .map_or(RouteType::Regular, |rule| rule.route_type)
}
