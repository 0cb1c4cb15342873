mod file_config;

pub use file_config::{FileConfig, NotificationsConfig};

use crate::playback::DEFAULT_CHECKPOINT_INTERVAL;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that participate in config resolution. Mirrors the flags
/// that can be overridden by the TOML file.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub station_id: String,
    pub admin_token: Option<String>,
    pub generic_fallback_track: Option<String>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub station_id: String,
    pub admin_token: Option<String>,
    pub generic_fallback_track: Option<String>,

    /// Transitions between durable position syncs.
    pub checkpoint_interval: u32,
    /// Subtracted from the natural end when deciding "still playing".
    pub end_buffer: Duration,

    pub now_playing_ttl: Duration,
    pub rotation_stack_ttl: Duration,
    pub playlist_cursor_ttl: Duration,
    pub current_play_ttl: Duration,

    pub min_paid_plays_for_rotation: Option<u32>,

    pub up_next_debounce: Duration,
    pub artist_cooldown: Duration,
    pub artist_daily_cap: u32,
}

impl AppConfig {
    /// Merge CLI arguments with an optional TOML file; file values win.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.db_path.clone());

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let checkpoint_interval = file
            .checkpoint_interval
            .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL);
        if checkpoint_interval == 0 {
            bail!("checkpoint_interval must be at least 1");
        }

        let notifications = file.notifications.unwrap_or_default();

        Ok(Self {
            db_path,
            port: file.port.unwrap_or(cli.port),
            metrics_port: file.metrics_port.unwrap_or(cli.metrics_port),
            station_id: file.station_id.unwrap_or_else(|| cli.station_id.clone()),
            admin_token: file.admin_token.or_else(|| cli.admin_token.clone()),
            generic_fallback_track: file
                .generic_fallback_track
                .or_else(|| cli.generic_fallback_track.clone()),
            checkpoint_interval,
            end_buffer: Duration::from_secs(file.end_buffer_secs.unwrap_or(2)),
            now_playing_ttl: Duration::from_secs(file.now_playing_ttl_secs.unwrap_or(600)),
            rotation_stack_ttl: Duration::from_secs(file.rotation_stack_ttl_secs.unwrap_or(3600)),
            playlist_cursor_ttl: Duration::from_secs(
                file.playlist_cursor_ttl_secs.unwrap_or(86400),
            ),
            current_play_ttl: Duration::from_secs(file.current_play_ttl_secs.unwrap_or(600)),
            min_paid_plays_for_rotation: file.min_paid_plays_for_rotation,
            up_next_debounce: Duration::from_secs(
                notifications.up_next_debounce_secs.unwrap_or(2),
            ),
            artist_cooldown: Duration::from_secs(
                notifications.artist_cooldown_mins.unwrap_or(30) * 60,
            ),
            artist_daily_cap: notifications.artist_daily_cap.unwrap_or(10),
        })
    }
}
