//! Durable snapshot of the network: routes, stops, route-stop links and the
//! update audit log, kept in SQLite.
//!
//! Every bulk upsert runs in one transaction, so readers see either the
//! previous refresh or the new one, never a half-applied batch. Rows missing
//! from a refresh are left in place.

mod integrity;
mod schema;

pub use integrity::{IntegrityReport, LowCount, OrphanedLink};

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::config::IntegrityConfig;
use crate::error::StoreError;
use crate::model::{
    BoundingBox, Coord, Direction, EntityType, PathStop, Route, RouteStopLink, Stop,
    UpdateLogEntry, UpdateStatus,
};

type StoreResult<T> = Result<T, StoreError>;

/// Row counts and last refresh times per entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub routes: i64,
    pub stops: i64,
    pub route_stops: i64,
    pub last_routes_update: Option<DateTime<Utc>>,
    pub last_stops_update: Option<DateTime<Utc>>,
    pub last_route_stops_update: Option<DateTime<Utc>>,
}

impl StoreStats {
    pub fn count(&self, entity: EntityType) -> i64 {
        match entity {
            EntityType::Routes => self.routes,
            EntityType::Stops => self.stops,
            EntityType::RouteStops => self.route_stops,
        }
    }
}

#[derive(Clone)]
pub struct NetworkStore {
    pool: SqlitePool,
    bounds: BoundingBox,
}

impl NetworkStore {
    /// Opens (creating if missing) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, bounds: BoundingBox) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.into()))?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        info!(path = %path.display(), "Opened network store");
        Self::with_pool(pool, bounds).await
    }

    /// Private in-memory database, used by tests and dry runs.
    pub async fn in_memory(bounds: BoundingBox) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Each in-memory connection is its own database, so pin exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool, bounds).await
    }

    async fn with_pool(pool: SqlitePool, bounds: BoundingBox) -> StoreResult<Self> {
        for statement in schema::SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool, bounds })
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Replaces routes by `route_id`. Returns the number of rows written.
    #[tracing::instrument(skip_all, fields(records = routes.len()))]
    pub async fn upsert_routes(&self, routes: &[Route]) -> StoreResult<usize> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        for route in routes {
            sqlx::query(
                r#"
                INSERT INTO routes (route_id, route_name, origin, destination, service_type, operator, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(route_id) DO UPDATE SET
                    route_name = excluded.route_name,
                    origin = excluded.origin,
                    destination = excluded.destination,
                    service_type = excluded.service_type,
                    operator = excluded.operator,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&route.route_id)
            .bind(&route.name)
            .bind(&route.origin)
            .bind(&route.destination)
            .bind(route.service_type)
            .bind(&route.operator)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(count = routes.len(), "Upserted routes");
        Ok(routes.len())
    }

    /// Replaces stops by `stop_id`. Stops outside the configured bounds are
    /// dropped without being stored; the returned count excludes them.
    #[tracing::instrument(skip_all, fields(records = stops.len()))]
    pub async fn upsert_stops(&self, stops: &[Stop]) -> StoreResult<usize> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for stop in stops {
            if let Err(e) = stop.check_bounds(&self.bounds) {
                debug!(error = %e, "Dropping stop");
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO stops (stop_id, stop_name, lat, lng, operator, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(stop_id) DO UPDATE SET
                    stop_name = excluded.stop_name,
                    lat = excluded.lat,
                    lng = excluded.lng,
                    operator = excluded.operator,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&stop.stop_id)
            .bind(&stop.name)
            .bind(stop.lat)
            .bind(stop.lng)
            .bind(&stop.operator)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;

        let dropped = stops.len() - written;
        if dropped > 0 {
            warn!(dropped, "Dropped stops outside the configured bounds");
        }
        info!(count = written, "Upserted stops");
        Ok(written)
    }

    /// Replaces route-stop links by `(route_id, stop_id, direction, service_type)`.
    ///
    /// Links are stored even when their route or stop is unknown; see
    /// [`validate_integrity`](Self::validate_integrity).
    #[tracing::instrument(skip_all, fields(records = links.len()))]
    pub async fn upsert_route_stop_links(&self, links: &[RouteStopLink]) -> StoreResult<usize> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        for link in links {
            sqlx::query(
                r#"
                INSERT INTO route_stops (route_id, stop_id, direction, service_type, sequence, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(route_id, stop_id, direction, service_type) DO UPDATE SET
                    sequence = excluded.sequence,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&link.route_id)
            .bind(&link.stop_id)
            .bind(link.direction.code())
            .bind(link.service_type)
            .bind(link.sequence)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(count = links.len(), "Upserted route-stop links");
        Ok(links.len())
    }

    pub async fn get_routes(&self) -> StoreResult<Vec<Route>> {
        let rows = sqlx::query_as::<_, (String, String, String, String, i64, String)>(
            r#"
            SELECT route_id, route_name, origin, destination, service_type, operator
            FROM routes
            ORDER BY route_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(route_from_row).collect())
    }

    pub async fn get_route(&self, route_id: &str) -> StoreResult<Option<Route>> {
        let row = sqlx::query_as::<_, (String, String, String, String, i64, String)>(
            r#"
            SELECT route_id, route_name, origin, destination, service_type, operator
            FROM routes
            WHERE route_id = ?
            "#,
        )
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(route_from_row))
    }

    pub async fn get_stops(&self) -> StoreResult<Vec<Stop>> {
        let rows = sqlx::query_as::<_, (String, String, f64, f64, String)>(
            "SELECT stop_id, stop_name, lat, lng, operator FROM stops ORDER BY stop_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(stop_id, name, lat, lng, operator)| Stop {
                stop_id,
                name,
                lat,
                lng,
                operator,
            })
            .collect())
    }

    /// All direction and service variants of one route, ordered by
    /// `(direction, sequence)`. Unknown routes yield an empty list.
    pub async fn get_route_stop_links(&self, route_id: &str) -> StoreResult<Vec<RouteStopLink>> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, i64)>(
            r#"
            SELECT route_id, stop_id, direction, service_type, sequence
            FROM route_stops
            WHERE route_id = ?
            ORDER BY direction, sequence, service_type
            "#,
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(route_id, stop_id, direction, service_type, sequence)| {
                Ok(RouteStopLink {
                    route_id,
                    stop_id,
                    direction: direction_from_code(direction)?,
                    service_type,
                    sequence,
                })
            })
            .collect()
    }

    /// Ordered stops of one route variant with their coordinates. Links whose
    /// stop is missing are skipped.
    pub async fn get_route_path_stops(
        &self,
        route_id: &str,
        direction: Direction,
        service_type: i64,
    ) -> StoreResult<Vec<PathStop>> {
        let rows = sqlx::query_as::<_, (String, String, i64, f64, f64)>(
            r#"
            SELECT rs.stop_id, s.stop_name, rs.sequence, s.lat, s.lng
            FROM route_stops rs
            JOIN stops s ON rs.stop_id = s.stop_id
            WHERE rs.route_id = ? AND rs.direction = ? AND rs.service_type = ?
            ORDER BY rs.sequence
            "#,
        )
        .bind(route_id)
        .bind(direction.code())
        .bind(service_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(stop_id, name, sequence, lat, lng)| PathStop {
                stop_id,
                name,
                sequence,
                coord: Coord::new(lat, lng),
            })
            .collect())
    }

    /// Number of linked stops per direction of a route.
    pub async fn get_direction_stop_counts(&self, route_id: &str) -> StoreResult<Vec<(Direction, i64)>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT direction, COUNT(*)
            FROM route_stops
            WHERE route_id = ?
            GROUP BY direction
            ORDER BY direction
            "#,
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(direction, count)| Ok((direction_from_code(direction)?, count)))
            .collect()
    }

    pub async fn get_stats(&self) -> StoreResult<StoreStats> {
        let mut stats = StoreStats::default();
        for entity in EntityType::ALL {
            let table = table_name(entity);
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            let last: Option<String> = sqlx::query_scalar(&format!("SELECT MAX(updated_at) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            let last = last.as_deref().map(parse_timestamp).transpose()?;

            match entity {
                EntityType::Routes => {
                    stats.routes = count;
                    stats.last_routes_update = last;
                }
                EntityType::Stops => {
                    stats.stops = count;
                    stats.last_stops_update = last;
                }
                EntityType::RouteStops => {
                    stats.route_stops = count;
                    stats.last_route_stops_update = last;
                }
            }
        }
        Ok(stats)
    }

    /// True when routes or stops are empty, or neither has been refreshed
    /// within `max_age_hours`. An age too large to represent never expires.
    pub async fn is_stale(&self, max_age_hours: i64) -> StoreResult<bool> {
        self.is_stale_at(max_age_hours, Utc::now()).await
    }

    async fn is_stale_at(&self, max_age_hours: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let stats = self.get_stats().await?;
        if stats.routes == 0 || stats.stops == 0 {
            return Ok(true);
        }

        let Some(latest) = stats.last_routes_update.max(stats.last_stops_update) else {
            return Ok(true);
        };
        Ok(match TimeDelta::try_hours(max_age_hours) {
            Some(max_age) => now.signed_duration_since(latest) > max_age,
            None => false,
        })
    }

    /// Reports orphaned links and undersized tables. Never modifies data.
    #[tracing::instrument(skip_all)]
    pub async fn validate_integrity(&self, thresholds: &IntegrityConfig) -> StoreResult<IntegrityReport> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, i64, i64)>(
            r#"
            SELECT rs.route_id, rs.stop_id, rs.direction, rs.service_type,
                   r.route_id IS NULL, s.stop_id IS NULL
            FROM route_stops rs
            LEFT JOIN routes r ON r.route_id = rs.route_id
            LEFT JOIN stops s ON s.stop_id = rs.stop_id
            WHERE r.route_id IS NULL OR s.stop_id IS NULL
            ORDER BY rs.route_id, rs.direction, rs.sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut report = IntegrityReport::default();
        for (route_id, stop_id, direction, service_type, missing_route, missing_stop) in rows {
            report.orphaned_links.push(OrphanedLink {
                route_id,
                stop_id,
                direction: direction_from_code(direction)?,
                service_type,
                missing_route: missing_route != 0,
                missing_stop: missing_stop != 0,
            });
        }

        let stats = self.get_stats().await?;
        let minimums = [
            (EntityType::Routes, thresholds.min_routes),
            (EntityType::Stops, thresholds.min_stops),
            (EntityType::RouteStops, thresholds.min_route_stops),
        ];
        for (entity, minimum) in minimums {
            let count = stats.count(entity);
            if count < minimum {
                report.low_counts.push(LowCount {
                    entity,
                    count,
                    minimum,
                });
            }
        }

        if !report.is_clean() {
            warn!(
                orphaned_links = report.orphaned_links.len(),
                low_counts = report.low_counts.len(),
                "Integrity check found problems"
            );
        }
        Ok(report)
    }

    /// Appends one audit row. Returns its id.
    pub async fn log_update(
        &self,
        entity: EntityType,
        records: usize,
        status: UpdateStatus,
        error_message: Option<&str>,
    ) -> StoreResult<i64> {
        self.log_update_at(entity, records, status, error_message, Utc::now())
            .await
    }

    async fn log_update_at(
        &self,
        entity: EntityType,
        records: usize,
        status: UpdateStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO update_log (entity_type, records_updated, status, error_message, logged_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entity.as_str())
        .bind(records as i64)
        .bind(status.as_str())
        .bind(error_message)
        .bind(timestamp(at))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent audit rows first.
    pub async fn get_update_history(&self, limit: u32) -> StoreResult<Vec<UpdateLogEntry>> {
        let rows = sqlx::query_as::<_, (i64, String, i64, String, Option<String>, String)>(
            r#"
            SELECT id, entity_type, records_updated, status, error_message, logged_at
            FROM update_log
            ORDER BY logged_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, entity, records, status, error_message, logged_at)| {
                Ok(UpdateLogEntry {
                    id,
                    entity: entity.parse().map_err(|value| StoreError::Corrupt {
                        column: "entity_type",
                        value,
                    })?,
                    records,
                    status: status.parse().map_err(|value| StoreError::Corrupt {
                        column: "status",
                        value,
                    })?,
                    error_message,
                    logged_at: parse_timestamp(&logged_at)?,
                })
            })
            .collect()
    }

    /// Deletes audit rows older than `days_to_keep` days. Returns rows removed.
    ///
    /// A cutoff before the representable calendar deletes nothing.
    pub async fn prune_update_log(&self, days_to_keep: u32) -> StoreResult<u64> {
        let cutoff = TimeDelta::try_days(i64::from(days_to_keep))
            .and_then(|keep| Utc::now().checked_sub_signed(keep));
        let Some(cutoff) = cutoff else {
            debug!(days_to_keep, "Retention reaches past the calendar, nothing to prune");
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM update_log WHERE logged_at < ?")
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        info!(days_to_keep, deleted = result.rows_affected(), "Pruned update log");
        Ok(result.rows_affected())
    }
}

fn route_from_row(row: (String, String, String, String, i64, String)) -> Route {
    let (route_id, name, origin, destination, service_type, operator) = row;
    Route {
        route_id,
        name,
        origin,
        destination,
        service_type,
        operator,
    }
}

fn table_name(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Routes => "routes",
        EntityType::Stops => "stops",
        EntityType::RouteStops => "route_stops",
    }
}

fn direction_from_code(code: i64) -> StoreResult<Direction> {
    Direction::from_code(code).ok_or(StoreError::Corrupt {
        column: "direction",
        value: code.to_string(),
    })
}

/// Fixed-width UTC so lexical order matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column: "timestamp",
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> NetworkStore {
        NetworkStore::in_memory(BoundingBox::default()).await.unwrap()
    }

    fn route(route_id: &str, destination: &str) -> Route {
        Route {
            route_id: route_id.to_string(),
            name: destination.to_string(),
            origin: "CHUK YUEN ESTATE".to_string(),
            destination: destination.to_string(),
            service_type: 1,
            operator: "KMB/LWB".to_string(),
        }
    }

    fn stop(stop_id: &str, lat: f64, lng: f64) -> Stop {
        Stop {
            stop_id: stop_id.to_string(),
            name: format!("Stop {stop_id}"),
            lat,
            lng,
            operator: "KMB/LWB".to_string(),
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

    #[tokio::test]
    async fn test_upsert_routes_is_idempotent() {
        let store = store().await;
        let routes = vec![route("1", "STAR FERRY"), route("2", "CHEUNG SHA WAN")];

        assert_eq!(store.upsert_routes(&routes).await.unwrap(), 2);
        assert_eq!(store.upsert_routes(&routes).await.unwrap(), 2);
        assert_eq!(store.get_stats().await.unwrap().routes, 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_row() {
        let store = store().await;
        store.upsert_routes(&[route("1", "STAR FERRY")]).await.unwrap();

        let mut changed = route("1", "TSIM SHA TSUI");
        changed.origin = "MEI FOO".to_string();
        changed.service_type = 2;
        store.upsert_routes(&[changed.clone()]).await.unwrap();

        assert_eq!(store.get_routes().await.unwrap(), vec![changed]);
    }

    #[tokio::test]
    async fn test_refresh_keeps_previously_seen_rows() {
        let store = store().await;
        store
            .upsert_routes(&[route("1", "STAR FERRY"), route("2", "CHEUNG SHA WAN")])
            .await
            .unwrap();
        store.upsert_routes(&[route("1", "STAR FERRY")]).await.unwrap();

        let ids: Vec<_> = store
            .get_routes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.route_id)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_out_of_bounds_stops_are_not_stored() {
        let store = store().await;
        let written = store
            .upsert_stops(&[stop("A", 22.3, 114.1), stop("B", 0.0, 0.0), stop("C", 22.4, 114.2)])
            .await
            .unwrap();

        assert_eq!(written, 2);
        let ids: Vec<_> = store
            .get_stops()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.stop_id)
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = store().await;
        let links = vec![
            link("1", "A", Direction::Outbound, 1),
            link("1", "B", Direction::Outbound, 2),
            link("1", "C", Direction::Outbound, -1),
        ];

        assert!(store.upsert_route_stop_links(&links).await.is_err());
        assert_eq!(store.get_stats().await.unwrap().route_stops, 0);
    }

    #[tokio::test]
    async fn test_links_ordered_by_direction_then_sequence() {
        let store = store().await;
        store
            .upsert_route_stop_links(&[
                link("1", "C", Direction::Inbound, 1),
                link("1", "B", Direction::Outbound, 2),
                link("1", "A", Direction::Outbound, 1),
                link("1", "D", Direction::Inbound, 2),
                link("2", "A", Direction::Outbound, 1),
            ])
            .await
            .unwrap();

        let order: Vec<_> = store
            .get_route_stop_links("1")
            .await
            .unwrap()
            .into_iter()
            .map(|l| (l.direction, l.stop_id))
            .collect();
        assert_eq!(
            order,
            vec![
                (Direction::Outbound, "A".to_string()),
                (Direction::Outbound, "B".to_string()),
                (Direction::Inbound, "C".to_string()),
                (Direction::Inbound, "D".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_route_yields_empty() {
        let store = store().await;
        assert!(store.get_route_stop_links("999").await.unwrap().is_empty());
        assert!(store.get_route("999").await.unwrap().is_none());
        assert!(store
            .get_route_path_stops("999", Direction::Outbound, 1)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_repeat_visit_in_one_direction_collapses() {
        // The composite key allows one visit per stop per variant; the later
        // sequence replaces the earlier one.
        let store = store().await;
        store
            .upsert_route_stop_links(&[
                link("L", "A", Direction::Outbound, 1),
                link("L", "B", Direction::Outbound, 2),
                link("L", "A", Direction::Outbound, 3),
            ])
            .await
            .unwrap();

        let links = store.get_route_stop_links("L").await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].stop_id, "A");
        assert_eq!(links[1].sequence, 3);
    }

    #[tokio::test]
    async fn test_path_stops_join_coordinates() {
        let store = store().await;
        store
            .upsert_stops(&[stop("A", 22.30, 114.10), stop("B", 22.31, 114.11)])
            .await
            .unwrap();
        store
            .upsert_route_stop_links(&[
                link("1", "B", Direction::Outbound, 2),
                link("1", "A", Direction::Outbound, 1),
                link("1", "Z", Direction::Outbound, 3),
            ])
            .await
            .unwrap();

        let path = store
            .get_route_path_stops("1", Direction::Outbound, 1)
            .await
            .unwrap();
        let coords: Vec<_> = path.iter().map(|p| p.coord).collect();
        assert_eq!(coords, vec![Coord::new(22.30, 114.10), Coord::new(22.31, 114.11)]);
    }

    #[tokio::test]
    async fn test_direction_stop_counts() {
        let store = store().await;
        store
            .upsert_route_stop_links(&[
                link("1", "A", Direction::Outbound, 1),
                link("1", "B", Direction::Outbound, 2),
                link("1", "A", Direction::Inbound, 1),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.get_direction_stop_counts("1").await.unwrap(),
            vec![(Direction::Outbound, 2), (Direction::Inbound, 1)]
        );
    }

    #[tokio::test]
    async fn test_staleness() {
        let store = store().await;
        assert!(store.is_stale(24).await.unwrap());

        store.upsert_routes(&[route("1", "STAR FERRY")]).await.unwrap();
        assert!(store.is_stale(24).await.unwrap(), "stops still empty");

        store.upsert_stops(&[stop("A", 22.3, 114.1)]).await.unwrap();
        assert!(!store.is_stale(24).await.unwrap());

        let later = Utc::now() + chrono::Duration::hours(25);
        assert!(store.is_stale_at(24, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_max_age_never_expires() {
        let store = store().await;
        store.upsert_routes(&[route("1", "STAR FERRY")]).await.unwrap();
        store.upsert_stops(&[stop("A", 22.3, 114.1)]).await.unwrap();

        assert!(!store.is_stale(9_000_000_000_000).await.unwrap());
        assert!(!store.is_stale(i64::MAX).await.unwrap());

        let later = Utc::now() + chrono::Duration::days(365 * 1000);
        assert!(!store.is_stale_at(i64::MAX, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_orphans_are_reported_not_pruned() {
        let store = store().await;
        store.upsert_routes(&[route("1", "STAR FERRY")]).await.unwrap();
        store.upsert_stops(&[stop("A", 22.3, 114.1)]).await.unwrap();
        store
            .upsert_route_stop_links(&[
                link("1", "A", Direction::Outbound, 1),
                link("1", "GHOST", Direction::Outbound, 2),
                link("9", "A", Direction::Inbound, 1),
            ])
            .await
            .unwrap();

        let report = store.validate_integrity(&IntegrityConfig::default()).await.unwrap();
        assert_eq!(report.orphaned_links.len(), 2);
        assert!(report.low_counts.is_empty());

        let ghost = &report.orphaned_links[0];
        assert_eq!(ghost.stop_id, "GHOST");
        assert!(ghost.missing_stop && !ghost.missing_route);

        let unknown_route = &report.orphaned_links[1];
        assert_eq!(unknown_route.route_id, "9");
        assert!(unknown_route.missing_route && !unknown_route.missing_stop);

        assert_eq!(store.get_stats().await.unwrap().route_stops, 3);
    }

    #[tokio::test]
    async fn test_low_counts_reported() {
        let store = store().await;
        let thresholds = IntegrityConfig {
            min_routes: 100,
            min_stops: 0,
            min_route_stops: 0,
        };
        store.upsert_routes(&[route("1", "STAR FERRY")]).await.unwrap();

        let report = store.validate_integrity(&thresholds).await.unwrap();
        assert_eq!(
            report.low_counts,
            vec![LowCount {
                entity: EntityType::Routes,
                count: 1,
                minimum: 100
            }]
        );
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_update_log_history_and_prune() {
        let store = store().await;
        let old = Utc::now() - chrono::Duration::days(40);
        store
            .log_update_at(EntityType::Routes, 5, UpdateStatus::Success, None, old)
            .await
            .unwrap();
        store
            .log_update(EntityType::Stops, 0, UpdateStatus::Error, Some("timeout"))
            .await
            .unwrap();

        let history = store.get_update_history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entity, EntityType::Stops);
        assert_eq!(history[0].status, UpdateStatus::Error);
        assert_eq!(history[0].error_message.as_deref(), Some("timeout"));

        assert_eq!(store.prune_update_log(30).await.unwrap(), 1);
        let history = store.get_update_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entity, EntityType::Stops);
    }

    #[tokio::test]
    async fn test_prune_with_huge_retention_keeps_everything() {
        let store = store().await;
        let old = Utc::now() - chrono::Duration::days(40);
        store
            .log_update_at(EntityType::Routes, 5, UpdateStatus::Success, None, old)
            .await
            .unwrap();

        assert_eq!(store.prune_update_log(u32::MAX).await.unwrap(), 0);
        assert_eq!(store.get_update_history(10).await.unwrap().len(), 1);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = Utc::now();
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(timestamp(a) < timestamp(b));
        assert_eq!(parse_timestamp(&timestamp(a)).unwrap().timestamp_micros(), a.timestamp_micros());
    }
}
