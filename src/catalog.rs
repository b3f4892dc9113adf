//! Display-ready view of the stored routes: classified, naturally ordered,
//! and searchable.

use serde::Serialize;

use crate::config::RouteTypeRules;
use crate::error::StoreError;
use crate::model::{Direction, Route, RouteType};
use crate::ordering::{classify_route_type, sort_routes};
use crate::store::NetworkStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub route: Route,
    pub route_type: RouteType,
}

/// One direction of a route as it would be offered to a rider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionSummary {
    pub direction: Direction,
    /// `Outbound`, `Inbound`, or `Circular`.
    pub label: String,
    /// Terminus-to-terminus description for this direction.
    pub depot: String,
    pub stop_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RouteCatalog {
    entries: Vec<CatalogEntry>,
}

impl RouteCatalog {
    /// Route types are recomputed from the stored fields on every load.
    pub async fn load(store: &NetworkStore, rules: &RouteTypeRules) -> Result<Self, StoreError> {
        Ok(Self::from_routes(store.get_routes().await?, rules))
    }

    pub fn from_routes(mut routes: Vec<Route>, rules: &RouteTypeRules) -> Self {
        sort_routes(&mut routes);
        let entries = routes
            .into_iter()
            .map(|route| CatalogEntry {
                route_type: classify_route_type(&route, rules),
                route,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, route_id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.route.route_id == route_id)
    }

    /// Case-insensitive substring match on route id, origin and destination.
    pub fn search(&self, term: &str) -> Vec<&CatalogEntry> {
        let term = term.trim().to_uppercase();
        if term.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| {
                e.route.route_id.to_uppercase().contains(&term)
                    || e.route.origin.to_uppercase().contains(&term)
                    || e.route.destination.to_uppercase().contains(&term)
            })
            .collect()
    }

    /// Directions with at least one linked stop. Unknown routes have none.
    pub async fn directions(&self, store: &NetworkStore, route_id: &str) -> Result<Vec<DirectionSummary>, StoreError> {
        let Some(entry) = self.get(route_id) else {
            return Ok(Vec::new());
        };
        let counts = store.get_direction_stop_counts(route_id).await?;
        Ok(counts
            .into_iter()
            .map(|(direction, stop_count)| summarize(entry, direction, stop_count))
            .collect())
    }
}

fn summarize(entry: &CatalogEntry, direction: Direction, stop_count: i64) -> DirectionSummary {
    let route = &entry.route;
    let (label, depot) = match (entry.route_type, direction) {
        (RouteType::Circular, _) => ("Circular".to_string(), format!("{} (Circular)", route.origin)),
        (_, Direction::Outbound) => (
            direction.to_string(),
            format!("{} → {}", route.origin, route.destination),
        ),
        (_, Direction::Inbound) => (
            direction.to_string(),
            format!("{} → {}", route.destination, route.origin),
        ),
    };
    DirectionSummary {
        direction,
        label,
        depot,
        stop_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, RouteStopLink, Stop};

    fn route(id: &str, origin: &str, destination: &str) -> Route {
        Route {
            route_id: id.to_string(),
            name: format!("{origin} → {destination}"),
            origin: origin.to_string(),
            destination: destination.to_string(),
            service_type: 1,
            operator: "KMB".to_string(),
        }
    }

    fn link(route_id: &str, stop_id: &str, direction: Direction, sequence: i64) -> RouteStopLink {
        RouteStopLink {
            route_id: route_id.to_string(),
            stop_id: stop_id.to_string(),
            direction,
            service_type: 1,
            sequence,
        }
    }

    fn catalog() -> RouteCatalog {
        RouteCatalog::from_routes(
            vec![
                route("219X", "KWUN TONG (YUE MAN SQUARE)", "KO CHUN COURT"),
                route("24", "KAI YIP", "MONG KOK"),
                route("3", "TSZ WAN SHAN", "CENTRAL"),
                route("11K", "TAI WAI", "TSIM SHA TSUI (CIRCULAR)"),
            ],
            &RouteTypeRules::default(),
        )
    }

    #[test]
    fn test_entries_are_sorted_and_classified() {
        let catalog = catalog();
        let ids: Vec<_> = catalog.entries().iter().map(|e| e.route.route_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "11K", "24", "219X"]);
        assert_eq!(catalog.get("219X").unwrap().route_type, RouteType::Express);
        assert_eq!(catalog.get("11K").unwrap().route_type, RouteType::Circular);
        assert_eq!(catalog.get("3").unwrap().route_type, RouteType::Regular);
    }

    #[test]
    fn test_search_matches_id_and_termini() {
        let catalog = catalog();
        let ids = |term: &str| {
            catalog
                .search(term)
                .iter()
                .map(|e| e.route.route_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids("mong kok"), vec!["24"]);
        assert_eq!(ids("2"), vec!["24", "219X"]);
        assert_eq!(ids("kwun"), vec!["219X"]);
        assert!(ids("  ").is_empty());
    }

    #[tokio::test]
    async fn test_direction_summaries() {
        let store = NetworkStore::in_memory(BoundingBox::default()).await.unwrap();
        store
            .upsert_routes(&[route("24", "KAI YIP", "MONG KOK"), route("11K", "TAI WAI", "TSIM SHA TSUI (CIRCULAR)")])
            .await
            .unwrap();
        store
            .upsert_stops(&[Stop {
                stop_id: "S1".to_string(),
                name: "S1".to_string(),
                lat: 22.3,
                lng: 114.17,
                operator: "KMB".to_string(),
            }])
            .await
            .unwrap();
        store
            .upsert_route_stop_links(&[
                link("24", "S1", Direction::Outbound, 1),
                link("24", "S2", Direction::Outbound, 2),
                link("24", "S1", Direction::Inbound, 1),
                link("11K", "S1", Direction::Outbound, 1),
            ])
            .await
            .unwrap();

        let catalog = RouteCatalog::load(&store, &RouteTypeRules::default()).await.unwrap();

        let dirs = catalog.directions(&store, "24").await.unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].label, "Outbound");
        assert_eq!(dirs[0].depot, "KAI YIP → MONG KOK");
        assert_eq!(dirs[0].stop_count, 2);
        assert_eq!(dirs[1].depot, "MONG KOK → KAI YIP");

        let dirs = catalog.directions(&store, "11K").await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].label, "Circular");
        assert_eq!(dirs[0].depot, "TAI WAI (Circular)");

        assert!(catalog.directions(&store, "999").await.unwrap().is_empty());
    }
}
