//! CLI entry point for the transit snapshot tool.
//!
//! Provides subcommands for refreshing the local network snapshot from the
//! upstream feed, inspecting its health, browsing routes, and resolving the
//! road-following path of a route variant.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_snapshot::{
    catalog::RouteCatalog,
    config::Config,
    error::IntegrityError,
    fetch::BasicClient,
    geometry::{GeometryResolver, OsrmProvider, Outcome, PathKey, Progress, ResolveOptions},
    infra::kmb::KmbClient,
    ingest::Ingestor,
    model::Direction,
    output::{append_record, print_json, print_pretty, write_path_csv},
    store::NetworkStore,
};

#[derive(Parser)]
#[command(name = "transit_snapshot")]
#[command(about = "Maintain and query a local snapshot of a bus network", long_about = None)]
struct Cli {
    /// Path to a JSON config file
    #[arg(long, global = true, env = "TRANSIT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UpdateTarget {
    Routes,
    Stops,
    RouteStops,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the snapshot from the upstream feed
    Update {
        #[arg(value_enum)]
        target: UpdateTarget,

        /// Only fetch route stops for the first N routes (natural order)
        #[arg(long)]
        max_routes: Option<usize>,
    },
    /// Show record counts, last refresh times and staleness
    Status {
        /// CSV file to append the status snapshot to
        #[arg(long)]
        csv: Option<String>,
    },
    /// Report orphaned links and low record counts
    Validate,
    /// List routes in natural order
    Routes {
        /// Only routes whose id, origin or destination contains TERM
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Resolve the road-following path of a route variant
    Path {
        #[arg(value_name = "ROUTE")]
        route_id: String,

        /// O / I (or outbound / inbound)
        #[arg(short, long, default_value = "O", value_parser = parse_direction)]
        direction: Direction,

        #[arg(short = 't', long, default_value_t = 1)]
        service_type: i64,

        /// CSV file to write the path to
        #[arg(long)]
        csv: Option<String>,
    },
    /// Show recent update attempts
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Delete update log rows older than N days
    PruneLog {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

fn parse_direction(s: &str) -> Result<Direction, IntegrityError> {
    Direction::from_bound(s)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/transit_snapshot.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_snapshot.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Invalid config {path}"))?,
        None => {
            let config = Config::default();
            config.validate().context("Invalid default config")?;
            config
        }
    };

    let store = NetworkStore::open(&config.database.path, config.bounds)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;

    match cli.command {
        Commands::Update { target, max_routes } => {
            update(&config, store, target, max_routes).await?;
        }
        Commands::Status { csv } => {
            let stats = store.get_stats().await?;
            let stale = store.is_stale(config.staleness.max_age_hours).await?;
            print_json(&stats)?;
            if stale {
                warn!(
                    max_age_hours = config.staleness.max_age_hours,
                    "Data is stale; run `update all`"
                );
            } else {
                info!("Data is fresh");
            }
            if let Some(path) = csv {
                append_record(&path, &stats)?;
            }
        }
        Commands::Validate => {
            let report = store.validate_integrity(&config.integrity).await?;
            for orphan in &report.orphaned_links {
                warn!(
                    route_id = %orphan.route_id,
                    stop_id = %orphan.stop_id,
                    direction = %orphan.direction,
                    missing_route = orphan.missing_route,
                    missing_stop = orphan.missing_stop,
                    "Orphaned route-stop link"
                );
            }
            for low in &report.low_counts {
                warn!(entity = %low.entity, count = low.count, minimum = low.minimum, "Record count below threshold");
            }
            info!(
                orphaned_links = report.orphaned_links.len(),
                low_counts = report.low_counts.len(),
                clean = report.is_clean(),
                "Integrity check complete"
            );
        }
        Commands::Routes { search } => {
            let catalog = RouteCatalog::load(&store, &config.route_types).await?;
            let entries: Vec<_> = match &search {
                Some(term) => catalog.search(term),
                None => catalog.entries().iter().collect(),
            };
            for entry in &entries {
                info!(
                    route_id = %entry.route.route_id,
                    route_type = %entry.route_type,
                    origin = %entry.route.origin,
                    destination = %entry.route.destination,
                    "Route"
                );
            }
            info!(shown = entries.len(), total = catalog.len(), "Route list");
        }
        Commands::Path {
            route_id,
            direction,
            service_type,
            csv,
        } => {
            resolve_path(&config, &store, &route_id, direction, service_type, csv.as_deref()).await?;
        }
        Commands::History { limit } => {
            let history = store.get_update_history(limit).await?;
            for entry in &history {
                info!(
                    logged_at = %entry.logged_at,
                    entity = %entry.entity,
                    records = entry.records,
                    status = entry.status.as_str(),
                    error = entry.error_message.as_deref().unwrap_or(""),
                    "Update"
                );
            }
        }
        Commands::PruneLog { days } => {
            let deleted = store.prune_update_log(days).await?;
            info!(deleted, days, "Update log pruned");
        }
    }

    Ok(())
}

#[tracing::instrument(skip(config, store))]
async fn update(
    config: &Config,
    store: NetworkStore,
    target: UpdateTarget,
    max_routes: Option<usize>,
) -> Result<()> {
    let http_client = BasicClient::new()?;
    let feed = KmbClient::new(http_client, &config.feed);
    let ingestor = Ingestor::new(feed, store, config.feed.clone());

    match target {
        UpdateTarget::Routes => {
            ingestor.update_routes().await?;
        }
        UpdateTarget::Stops => {
            ingestor.update_stops().await?;
        }
        UpdateTarget::RouteStops => {
            ingestor.update_route_stops(max_routes).await?;
        }
        UpdateTarget::All => {
            let summary = ingestor.update_all(max_routes).await;
            print_json(&summary)?;
            if !summary.is_complete() {
                bail!("{} of 3 updates failed", summary.failures.len());
            }
        }
    }
    Ok(())
}

/// Resolves one route variant's path and reports how faithful it is.
#[tracing::instrument(skip(config, store, csv))]
async fn resolve_path(
    config: &Config,
    store: &NetworkStore,
    route_id: &str,
    direction: Direction,
    service_type: i64,
    csv: Option<&str>,
) -> Result<()> {
    let stops = store
        .get_route_path_stops(route_id, direction, service_type)
        .await?;
    if stops.is_empty() {
        warn!(route_id, %direction, service_type, "No stops for this route variant");
        return Ok(());
    }

    let provider = OsrmProvider::new(BasicClient::new()?, &config.routing);
    let resolver = GeometryResolver::new(Arc::new(provider), &config.routing);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Progress>();
    let progress_logger = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            info!(completed = p.completed, total = p.total, "Routing progress");
        }
    });

    let waypoints: Vec<_> = stops.iter().map(|s| s.coord).collect();
    let key = PathKey::for_stops(route_id, direction, &stops);
    let opts = ResolveOptions {
        progress: Some(tx),
        ..Default::default()
    };
    let resolution = resolver.resolve_cached(key, &waypoints, opts).await;
    progress_logger.await?;

    match resolution.outcome {
        Outcome::FullyRouted => {}
        Outcome::PartiallyRouted => warn!(
            routed = resolution.routed_windows,
            total = resolution.total_windows,
            "Some segments could not be routed; direct path used for them"
        ),
        Outcome::FallbackOnly => warn!("Routing unavailable; direct path used"),
    }
    if resolution.timed_out {
        warn!("Routing deadline expired before all segments finished");
    }

    info!(
        stops = stops.len(),
        points = resolution.path.len(),
        outcome = ?resolution.outcome,
        "Path resolved"
    );
    print_pretty(&resolution.path);

    if let Some(path) = csv {
        write_path_csv(path, &resolution.path)?;
        info!(path, "Path written");
    }
    Ok(())
}
