//! Report types produced by [`NetworkStore::validate_integrity`](super::NetworkStore::validate_integrity).

use serde::Serialize;

use crate::model::{Direction, EntityType};

/// A route-stop link whose route or stop is missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanedLink {
    pub route_id: String,
    pub stop_id: String,
    pub direction: Direction,
    pub service_type: i64,
    pub missing_route: bool,
    pub missing_stop: bool,
}

/// A table holding fewer rows than configured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowCount {
    pub entity: EntityType,
    pub count: i64,
    pub minimum: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub orphaned_links: Vec<OrphanedLink>,
    pub low_counts: Vec<LowCount>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_links.is_empty() && self.low_counts.is_empty()
    }
}
