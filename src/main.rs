use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cache;
mod config;
mod notifications;
mod playback;
mod scheduler;
mod server;
mod sqlite_persistence;
mod station_store;

use cache::{CacheBackend, MemoryCache};
use config::{AppConfig, CliConfig, FileConfig};
use notifications::{DebouncedDispatcher, DispatcherConfig, TracingSink};
use playback::{
    CheckpointCoordinator, CursorStore, ListenerCounter, PlaybackStateStore, RotationStack,
};
use scheduler::{
    create_scheduler, ListenerTieredPolicy, NullReactionContext, Selector, SqliteCreditLedger,
    SqliteEligibilitySource, StationScheduler,
};
use server::{run_metrics_server, run_server, ServerConfig, ServerState};
use station_store::{SqliteStationStore, StationStore};
use tokio_util::sync::CancellationToken;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite station database file.
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3100)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Station identifier (namespaces cache keys and durable rows).
    #[clap(long, default_value = "main")]
    pub station_id: String,

    /// Shared secret for privileged routes (start/clear). Omit to disable.
    #[clap(long)]
    pub admin_token: Option<String>,

    /// Track id played when no other candidate exists anywhere.
    #[clap(long)]
    pub generic_fallback_track: Option<String>,

    /// Optional TOML config file; its values override CLI flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(
        &CliConfig {
            db_path: cli_args.db_path.clone(),
            port: cli_args.port,
            metrics_port: cli_args.metrics_port,
            station_id: cli_args.station_id.clone(),
            admin_token: cli_args.admin_token.clone(),
            generic_fallback_track: cli_args.generic_fallback_track.clone(),
        },
        file_config,
    )?;

    info!("Opening station database at {:?}...", config.db_path);
    let store: Arc<dyn StationStore> = Arc::new(SqliteStationStore::new(&config.db_path)?);

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let cache: Arc<dyn CacheBackend> = Arc::new(MemoryCache::new());

    let state_store = Arc::new(PlaybackStateStore::new(
        cache.clone(),
        store.clone(),
        &config.station_id,
        config.now_playing_ttl,
        config.current_play_ttl,
    ));
    let checkpoint = CheckpointCoordinator::new(
        cache.clone(),
        store.clone(),
        &config.station_id,
        config.checkpoint_interval,
        config.playlist_cursor_ttl,
    );

    // Prime the fallback cursor from the durable checkpoint if the cache
    // copy did not survive the restart.
    let recovery_cursor_store = CursorStore::new(
        cache.clone(),
        &config.station_id,
        config.playlist_cursor_ttl,
    );
    match checkpoint.recover_cursor(&recovery_cursor_store) {
        Ok(true) => info!("Recovered playlist position from durable checkpoint"),
        Ok(false) => {}
        Err(e) => warn!("Playlist recovery failed (continuing fresh): {}", e),
    }

    let selector = Selector::new(
        Arc::new(SqliteEligibilitySource::new(
            store.clone(),
            config.min_paid_plays_for_rotation,
        )),
        Arc::new(ListenerTieredPolicy),
        RotationStack::new(cache.clone(), &config.station_id, config.rotation_stack_ttl),
        CursorStore::new(
            cache.clone(),
            &config.station_id,
            config.playlist_cursor_ttl,
        ),
        checkpoint,
        config.generic_fallback_track.clone(),
    );
    let dispatcher = Arc::new(DebouncedDispatcher::new(
        Arc::new(TracingSink),
        DispatcherConfig {
            up_next_debounce: config.up_next_debounce,
            artist_cooldown: config.artist_cooldown,
            artist_daily_cap: config.artist_daily_cap,
        },
    ));
    let listeners = Arc::new(ListenerCounter::new(cache.clone(), &config.station_id));

    let (station_scheduler, handle, command_rx) = create_scheduler(StationScheduler::new(
        state_store,
        selector,
        store.clone(),
        Arc::new(SqliteCreditLedger::new(store.clone())),
        dispatcher,
        Arc::new(NullReactionContext),
        listeners.clone(),
        &config.station_id,
        config.end_buffer,
    ));

    let shutdown = CancellationToken::new();

    let scheduler_task = tokio::spawn(station_scheduler.run(command_rx, shutdown.clone()));

    let metrics_shutdown = shutdown.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_port, metrics_shutdown).await {
            error!("Metrics server failed: {}", e);
        }
    });

    // Kick the station out of Idle; resuming an in-flight track is handled
    // by the loop itself from the recovered playback state.
    if let Err(e) = handle.start().await {
        warn!("Station did not start playing: {}", e);
    }

    let server_state = ServerState {
        config: ServerConfig {
            port: config.port,
            metrics_port: config.metrics_port,
            admin_token: config.admin_token.clone(),
        },
        start_time: Instant::now(),
        scheduler: handle,
        listeners,
    };

    let http_shutdown = shutdown.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = run_server(server_state, http_shutdown).await {
            error!("HTTP server failed: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down...");
    shutdown.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), scheduler_task).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), http_task).await;
    info!("Shutdown complete");

    Ok(())
}
