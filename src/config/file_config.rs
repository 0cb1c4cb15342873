//! TOML file configuration.
//!
//! Optional file layered over CLI arguments; file values win where present.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub station_id: Option<String>,
    pub admin_token: Option<String>,

    /// Last-resort track when every tier is empty.
    pub generic_fallback_track: Option<String>,

    pub checkpoint_interval: Option<u32>,
    pub end_buffer_secs: Option<u64>,

    pub now_playing_ttl_secs: Option<u64>,
    pub rotation_stack_ttl_secs: Option<u64>,
    pub playlist_cursor_ttl_secs: Option<u64>,
    pub current_play_ttl_secs: Option<u64>,

    /// Paid plays required before a track may enter free rotation.
    /// Absent means the gate is disabled.
    pub min_paid_plays_for_rotation: Option<u32>,

    pub notifications: Option<NotificationsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    pub up_next_debounce_secs: Option<u64>,
    pub artist_cooldown_mins: Option<u64>,
    pub artist_daily_cap: Option<u32>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path.as_ref()))
    }
}
