//! Pulls raw records from the upstream feed and drives the store upserts.
//!
//! Every attempt leaves one row in the update log, success or failure, with
//! the number of records the store actually applied. A failed or empty pull
//! leaves existing data untouched.

mod records;

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::FeedConfig;
use crate::model::{Direction, EntityType, RouteStopLink, UpdateStatus};
use crate::ordering::sort_routes;
use crate::services::feed_api::FeedApi;
use crate::store::NetworkStore;

const PROGRESS_EVERY: usize = 50;

/// Outcome of [`Ingestor::update_all`].
#[derive(Debug, Default, Serialize)]
pub struct UpdateSummary {
    pub routes: Option<usize>,
    pub stops: Option<usize>,
    pub route_stops: Option<usize>,
    pub failures: Vec<(EntityType, String)>,
}

impl UpdateSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, entity: EntityType, result: Result<usize>) {
        let slot = match entity {
            EntityType::Routes => &mut self.routes,
            EntityType::Stops => &mut self.stops,
            EntityType::RouteStops => &mut self.route_stops,
        };
        match result {
            Ok(n) => *slot = Some(n),
            Err(e) => self.failures.push((entity, format!("{e:#}"))),
        }
    }
}

/// One refresh at a time per entity type.
#[derive(Default)]
struct EntityLocks {
    routes: Mutex<()>,
    stops: Mutex<()>,
    route_stops: Mutex<()>,
}

impl EntityLocks {
    fn get(&self, entity: EntityType) -> &Mutex<()> {
        match entity {
            EntityType::Routes => &self.routes,
            EntityType::Stops => &self.stops,
            EntityType::RouteStops => &self.route_stops,
        }
    }
}

pub struct Ingestor<F> {
    feed: F,
    store: NetworkStore,
    config: FeedConfig,
    locks: EntityLocks,
}

impl<F: FeedApi> Ingestor<F> {
    pub fn new(feed: F, store: NetworkStore, config: FeedConfig) -> Self {
        Self {
            feed,
            store,
            config,
            locks: EntityLocks::default(),
        }
    }

    pub fn store(&self) -> &NetworkStore {
        &self.store
    }

    /// Writes the audit row for one attempt and passes the result through.
    async fn finish(&self, entity: EntityType, result: Result<usize>) -> Result<usize> {
        match result {
            Ok(count) => {
                self.store
                    .log_update(entity, count, UpdateStatus::Success, None)
                    .await
                    .context("Failed to record update")?;
                info!(entity = %entity, records = count, "Update complete");
                Ok(count)
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(entity = %entity, error = %message, "Update failed");
                if let Err(log_err) = self
                    .store
                    .log_update(entity, 0, UpdateStatus::Error, Some(&message))
                    .await
                {
                    error!(entity = %entity, error = %log_err, "Failed to record failed update");
                }
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn update_routes(&self) -> Result<usize> {
        let _guard = self.locks.get(EntityType::Routes).lock().await;
        let result = self.refresh_routes().await;
        self.finish(EntityType::Routes, result).await
    }

    async fn refresh_routes(&self) -> Result<usize> {
        let raw = self.feed.fetch_routes().await.context("Failed to fetch routes")?;
        if raw.is_empty() {
            bail!("No routes returned by feed");
        }

        // The list has one entry per bound and service type; the first one
        // per route id is the outbound regular service.
        let mut seen = HashSet::new();
        let routes = convert_all("route", raw, |r| r.into_route(&self.config.operator))
            .into_iter()
            .filter(|r| seen.insert(r.route_id.clone()))
            .collect::<Vec<_>>();
        if routes.is_empty() {
            bail!("No valid routes in feed response");
        }

        Ok(self.store.upsert_routes(&routes).await?)
    }

    #[tracing::instrument(skip_all)]
    pub async fn update_stops(&self) -> Result<usize> {
        let _guard = self.locks.get(EntityType::Stops).lock().await;
        let result = self.refresh_stops().await;
        self.finish(EntityType::Stops, result).await
    }

    async fn refresh_stops(&self) -> Result<usize> {
        let raw = self.feed.fetch_stops().await.context("Failed to fetch stops")?;
        if raw.is_empty() {
            bail!("No stops returned by feed");
        }

        let stops = convert_all("stop", raw, |s| s.into_stop(&self.config.operator));
        if stops.is_empty() {
            bail!("No valid stops in feed response");
        }

        Ok(self.store.upsert_stops(&stops).await?)
    }

    /// Walks the stored routes (in natural order, at most `max_routes` of
    /// them) and pulls the stop list of each for both bounds.
    #[tracing::instrument(skip_all, fields(max_routes = ?max_routes))]
    pub async fn update_route_stops(&self, max_routes: Option<usize>) -> Result<usize> {
        let _guard = self.locks.get(EntityType::RouteStops).lock().await;
        let result = self.refresh_route_stops(max_routes).await;
        self.finish(EntityType::RouteStops, result).await
    }

    async fn refresh_route_stops(&self, max_routes: Option<usize>) -> Result<usize> {
        let mut routes = self.store.get_routes().await?;
        if routes.is_empty() {
            bail!("No routes in database. Update routes first.");
        }
        sort_routes(&mut routes);
        if let Some(max) = max_routes {
            routes.truncate(max);
        }

        let total = routes.len();
        let delay = self.config.request_delay();
        let mut links: Vec<RouteStopLink> = Vec::new();
        let mut positions: HashMap<(String, String, Direction, i64), usize> = HashMap::new();
        let mut failed_calls = 0usize;

        for (i, route) in routes.iter().enumerate() {
            for direction in [Direction::Outbound, Direction::Inbound] {
                match self
                    .feed
                    .fetch_route_stops(&route.route_id, direction, route.service_type)
                    .await
                {
                    Ok(raw) => {
                        let converted = convert_all("route-stop", raw, |r| r.into_link(&route.route_id, direction));
                        for link in converted {
                            let key = (
                                link.route_id.clone(),
                                link.stop_id.clone(),
                                link.direction,
                                link.service_type,
                            );
                            // Last record for a key wins, like the upsert would.
                            match positions.get(&key) {
                                Some(&pos) => links[pos] = link,
                                None => {
                                    positions.insert(key, links.len());
                                    links.push(link);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        failed_calls += 1;
                        warn!(route_id = %route.route_id, %direction, error = %e, "Failed to fetch route stops");
                    }
                }

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                info!(processed = i + 1, total, links = links.len(), "Route-stop fetch progress");
            }
        }

        if links.is_empty() {
            return Err(anyhow!(
                "No route-stop links returned by feed ({} of {} calls failed)",
                failed_calls,
                total * 2
            ));
        }
        if failed_calls > 0 {
            warn!(failed_calls, total_calls = total * 2, "Some route-stop fetches failed");
        }

        Ok(self.store.upsert_route_stop_links(&links).await?)
    }

    /// Routes, stops, then route stops. A failure in one step is recorded in
    /// the summary and does not stop the others.
    pub async fn update_all(&self, max_routes: Option<usize>) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        summary.record(EntityType::Routes, self.update_routes().await);
        summary.record(EntityType::Stops, self.update_stops().await);
        summary.record(EntityType::RouteStops, self.update_route_stops(max_routes).await);
        summary
    }
}

/// Converts every raw record, logging and dropping the ones that fail.
fn convert_all<R, T, E: Display>(entity: &str, raw: Vec<R>, convert: impl Fn(R) -> Result<T, E>) -> Vec<T> {
    let total = raw.len();
    let mut rejected = 0usize;
    let out = raw
        .into_iter()
        .filter_map(|r| match convert(r) {
            Ok(v) => Some(v),
            Err(e) => {
                rejected += 1;
                warn!(entity, error = %e, "Rejected malformed record");
                None
            }
        })
        .collect::<Vec<_>>();
    if rejected > 0 {
        warn!(entity, rejected, total, "Dropped malformed records");
    }
    out
}
