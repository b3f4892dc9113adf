use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use super::{
    GeometryCache, Outcome, PathKey, Progress, ResolveOptions, Resolution, RoutingProvider,
    stitch, window_ranges,
};
use crate::config::RoutingConfig;
use crate::model::Coord;

pub struct GeometryResolver {
    provider: Arc<dyn RoutingProvider>,
    max_waypoints: usize,
    max_parallel: usize,
    deadline: Option<Duration>,
    cache: GeometryCache,
}

impl GeometryResolver {
    pub fn new(provider: Arc<dyn RoutingProvider>, config: &RoutingConfig) -> Self {
        Self {
            provider,
            max_waypoints: config.max_waypoints.max(2),
            max_parallel: config.max_parallel.max(1),
            deadline: config.deadline(),
            cache: GeometryCache::new(config.cache_ttl(), config.cache_max_entries),
        }
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    /// Resolves a route variant, reusing a cached result for the same stop list.
    ///
    /// Results cut short by the deadline are returned but not cached.
    pub async fn resolve_cached(
        &self,
        key: PathKey,
        waypoints: &[Coord],
        opts: ResolveOptions,
    ) -> Arc<Resolution> {
        if let Some(hit) = self.cache.get(&key) {
            debug!(route_id = %key.route_id, direction = %key.direction, "Geometry cache hit");
            if let Some(progress) = &opts.progress {
                let _ = progress.send(Progress {
                    completed: hit.total_windows,
                    total: hit.total_windows,
                });
            }
            return hit;
        }

        let resolution = Arc::new(self.resolve(waypoints, opts).await);
        if !resolution.timed_out {
            self.cache.insert(key, Arc::clone(&resolution));
        }
        resolution
    }

    /// Routes `waypoints` window by window and stitches the results.
    ///
    /// Never fails: windows the provider cannot route, and windows still
    /// outstanding when the deadline passes, are replaced by their own
    /// waypoints.
    #[tracing::instrument(skip_all, fields(waypoints = waypoints.len()))]
    pub async fn resolve(&self, waypoints: &[Coord], opts: ResolveOptions) -> Resolution {
        if waypoints.len() < 2 {
            return Resolution {
                path: waypoints.to_vec(),
                outcome: Outcome::FallbackOnly,
                routed_windows: 0,
                total_windows: 0,
                timed_out: false,
            };
        }

        let ranges = window_ranges(waypoints.len(), self.max_waypoints);
        let total = ranges.len();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();

        for (index, range) in ranges.iter().enumerate() {
            let window = waypoints[range.clone()].to_vec();
            let provider = Arc::clone(&self.provider);
            let sem = Arc::clone(&semaphore);
            let span = tracing::debug_span!("route_window", window = index, points = window.len());

            tasks.spawn(
                async move {
                    let _permit = sem.acquire().await;
                    (index, provider.route(&window).await)
                }
                .instrument(span),
            );
        }

        let deadline = opts.deadline.or(self.deadline).map(|d| Instant::now() + d);
        let mut routed: Vec<Option<Vec<Coord>>> = vec![None; total];
        let mut completed = 0;
        let mut timed_out = false;

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = next else {
                break;
            };

            completed += 1;
            match joined {
                Ok((index, Ok(path))) => routed[index] = Some(path),
                Ok((index, Err(e))) => {
                    warn!(window = index, error = %e, "Window routing failed, using direct path");
                }
                Err(e) => warn!(error = %e, "Window task did not finish"),
            }

            if let Some(progress) = &opts.progress {
                let _ = progress.send(Progress { completed, total });
            }
        }

        if timed_out {
            tasks.abort_all();
            warn!(completed, total, "Resolution deadline passed, abandoning outstanding windows");
        }

        let routed_windows = routed.iter().filter(|r| r.is_some()).count();
        let segments = ranges
            .into_iter()
            .zip(routed)
            .map(|(range, path)| path.unwrap_or_else(|| waypoints[range].to_vec()));
        let path = stitch(segments);

        let outcome = if routed_windows == total {
            Outcome::FullyRouted
        } else if routed_windows == 0 {
            Outcome::FallbackOnly
        } else {
            Outcome::PartiallyRouted
        };

        info!(
            routed_windows,
            total_windows = total,
            points = path.len(),
            ?outcome,
            "Resolved path geometry"
        );

        Resolution {
            path,
            outcome,
            routed_windows,
            total_windows: total,
            timed_out,
        }
    }
}
