// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  swapi-proxy: SWAPI search/details proxy with query analytics
//
//  HTTP API:     axum on a multi-threaded tokio runtime
//  Analytics:    append-only query log → periodic aggregation → snapshot
//  Config:       YAML file + SWAPI_* env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swapi_api::ApiState;
use swapi_core::{AppConfig, Kind, UpstreamClient};
use swapi_observability::{ProxyMetrics, QueryLogger};
use swapi_resolver::EntityResolver;
use swapi_stats::{RecomputeTrigger, SnapshotStore, StatsAggregator};
use swapi_upstream::SwapiClient;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "swapi-proxy", version, about = "SWAPI search/details proxy with query analytics")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/swapi.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Run the HTTP API (default)
    #[default]
    Serve,
    /// Aggregate the query log once, write the snapshot, and exit
    Compute,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    // ── Config ──
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or_default() {
        Command::Compute => compute(&config),
        Command::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(config))
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config file");
    } else {
        info!(path = %path.display(), "No config file found, using defaults");
    }
    // Env overrides apply either way; a missing YAML file contributes nothing.
    AppConfig::load(path)
}

/// One synchronous aggregation run. Fails when the snapshot cannot be written.
fn compute(config: &AppConfig) -> anyhow::Result<()> {
    let store = SnapshotStore::new(&config.stats.snapshot_path);
    let snapshot = swapi_stats::compute_file(&config.query_log.path);
    store.write(&snapshot)?;
    info!(
        total_requests = snapshot.total_requests,
        top_queries = snapshot.top_queries.len(),
        average_duration_ms = snapshot.average_duration_ms,
        path = %store.path().display(),
        "Stats snapshot written"
    );
    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "swapi-proxy starting");

    let metrics = Arc::new(ProxyMetrics::new(config.metrics.enabled)?);

    // ── Upstream + resolver ──
    let upstream: Arc<dyn UpstreamClient> = Arc::new(SwapiClient::new(&config.upstream)?);
    let resolver = Arc::new(EntityResolver::new(
        Arc::clone(&upstream),
        &config.resolver,
        Arc::clone(&metrics),
    ));
    if config.resolver.warm_on_startup {
        for kind in Kind::ALL {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                resolver.warm(kind).await;
            });
        }
        info!("Resolver warm-up started");
    }

    // ── Analytics pipeline ──
    let query_log = Arc::new(QueryLogger::new(&config.query_log, Arc::clone(&metrics)));
    let snapshots = Arc::new(SnapshotStore::new(&config.stats.snapshot_path));
    let aggregator = Arc::new(StatsAggregator::new(
        &config.query_log.path,
        Arc::clone(&snapshots),
        Arc::clone(&metrics),
    ));
    let (trigger, _worker) = RecomputeTrigger::spawn(aggregator);
    let schedule = if config.stats.schedule_enabled {
        let interval = config.recompute_interval();
        info!(interval_secs = interval.as_secs(), "Stats recompute scheduled");
        Some(trigger.spawn_schedule(interval))
    } else {
        None
    };

    let state = Arc::new(ApiState {
        upstream,
        resolver,
        query_log: Arc::clone(&query_log),
        snapshots,
        trigger,
        metrics,
        metrics_path: config.metrics.path.clone(),
    });

    swapi_api::start(config.server.clone(), state, shutdown_signal()).await?;

    if let Some(schedule) = schedule {
        schedule.abort();
    }
    query_log.flush().await;

    info!("swapi-proxy stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::parse_from(["swapi-proxy"]);
        assert!(matches!(cli.command.unwrap_or_default(), Command::Serve));
        assert_eq!(cli.config, PathBuf::from("config/swapi.yaml"));
    }

    #[test]
    fn compute_subcommand_parses() {
        let cli = Cli::parse_from(["swapi-proxy", "--config", "/tmp/x.yaml", "compute"]);
        assert!(matches!(cli.command, Some(Command::Compute)));
        assert_eq!(cli.config, PathBuf::from("/tmp/x.yaml"));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/definitely/not/here.yaml")).unwrap();
        assert_eq!(config.server.addr, "0.0.0.0:8000");
    }

    #[test]
    fn compute_writes_snapshot_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.query_log.path = dir.path().join("queries.log");
        config.stats.snapshot_path = dir.path().join("out").join("stats.json");
        std::fs::write(
            &config.query_log.path,
            concat!(
                r#"{"timestamp":"2025-01-15T10:00:00.000Z","endpoint":"search","type":"people","query":"luke","duration_ms":100,"success":true}"#,
                "\n",
                r#"{"timestamp":"2025-01-15T10:05:00.000Z","endpoint":"search","type":"people","query":"Luke","duration_ms":200,"success":true}"#,
                "\n",
            ),
        )
        .unwrap();

        compute(&config).unwrap();

        let snapshot = SnapshotStore::new(&config.stats.snapshot_path)
            .read_latest()
            .unwrap();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.top_queries[0].query, "luke");
        assert_eq!(snapshot.most_popular_hour, Some(10));
    }
}
