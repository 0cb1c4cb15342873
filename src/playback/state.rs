//! Playback state store.
//!
//! The single "now playing" record lives behind two backends: the cache is
//! the hot path, the durable store is the source of truth. Reads prefer the
//! cache and fall back to reconstructing from the durable row (re-resolving
//! the track duration from the catalog); writes always land durably and
//! additionally in the cache when it is reachable. Cache trouble downgrades
//! to durable-only mode and is warned once per outage.

use crate::cache::{CacheBackend, CacheKeys, CacheResult};
use crate::station_store::{NowPlayingRow, StationStore};
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fallback duration for tracks with missing metadata.
pub const DEFAULT_TRACK_DURATION_SECS: i64 = 180;

/// The authoritative "now playing" record.
///
/// Superseded, never mutated: every transition writes a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub track_id: String,
    /// Wall-clock start in unix milliseconds.
    pub started_at_ms: i64,
    pub duration_ms: u64,
    /// Numeric weight assigned at selection time.
    pub priority_score: f64,
    pub is_fallback_content: bool,
    pub is_admin_curated_fallback: bool,
    /// RFC 3339 start timestamp, kept for compatibility with the durable row.
    pub played_at: String,
}

impl PlaybackState {
    /// When this track stops counting as "still playing": natural end minus
    /// the jitter buffer.
    pub fn scheduled_end_ms(&self, buffer: Duration) -> i64 {
        self.started_at_ms + self.duration_ms as i64 - buffer.as_millis() as i64
    }

    pub fn is_still_playing(&self, now_ms: i64, buffer: Duration) -> bool {
        now_ms < self.scheduled_end_ms(buffer)
    }
}

/// The in-flight attributable play, finalized on the next transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPlayInfo {
    pub play_id: String,
    pub artist_id: String,
    /// RFC 3339.
    pub started_at: String,
}

pub struct PlaybackStateStore {
    cache: Arc<dyn CacheBackend>,
    store: Arc<dyn StationStore>,
    keys: CacheKeys,
    station_id: String,
    now_playing_ttl: Duration,
    current_play_ttl: Duration,
    cache_down: AtomicBool,
}

impl PlaybackStateStore {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        store: Arc<dyn StationStore>,
        station_id: impl Into<String>,
        now_playing_ttl: Duration,
        current_play_ttl: Duration,
    ) -> Self {
        let station_id = station_id.into();
        Self {
            cache,
            store,
            keys: CacheKeys::new(&station_id),
            station_id,
            now_playing_ttl,
            current_play_ttl,
            cache_down: AtomicBool::new(false),
        }
    }

    /// Track a cache call's outcome, warning once per outage and noting
    /// recovery. Returns the value for `Ok`, `None` for errors.
    fn track_cache<T>(&self, result: CacheResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                if self.cache_down.swap(false, Ordering::SeqCst) {
                    info!("Cache backend recovered, leaving durable-only mode");
                }
                Some(value)
            }
            Err(e) => {
                if !self.cache_down.swap(true, Ordering::SeqCst) {
                    warn!("Cache backend unavailable, degrading to durable-only mode: {e}");
                }
                crate::server::metrics::record_cache_outage();
                None
            }
        }
    }

    /// Whether the last cache interaction failed.
    pub fn cache_degraded(&self) -> bool {
        self.cache_down.load(Ordering::SeqCst)
    }

    /// Current playback state: cache first, durable reconstruction on miss
    /// or outage.
    pub fn get_current(&self) -> Result<Option<PlaybackState>> {
        if let Some(Some(json)) = self.track_cache(self.cache.get(&self.keys.now_playing())) {
            match serde_json::from_str::<PlaybackState>(&json) {
                Ok(state) => return Ok(Some(state)),
                Err(e) => {
                    debug!("Malformed cached playback state, reconstructing durably: {e}");
                }
            }
        }
        self.reconstruct_from_durable()
    }

    fn reconstruct_from_durable(&self) -> Result<Option<PlaybackState>> {
        let Some(row) = self.store.get_now_playing(&self.station_id)? else {
            return Ok(None);
        };
        let duration_secs = self
            .store
            .track_duration_secs(&row.track_id)?
            .unwrap_or(DEFAULT_TRACK_DURATION_SECS);

        Ok(Some(PlaybackState {
            track_id: row.track_id,
            started_at_ms: row.played_at.timestamp_millis(),
            duration_ms: (duration_secs.max(0) as u64) * 1000,
            priority_score: row.priority_score,
            is_fallback_content: row.is_fallback,
            is_admin_curated_fallback: row.is_admin_fallback,
            played_at: row.played_at.to_rfc3339(),
        }))
    }

    /// Write a new playback state. The durable write is authoritative and
    /// its failure surfaces; the cache write is best-effort.
    pub fn set_current(&self, state: &PlaybackState) -> Result<()> {
        let played_at = parse_rfc3339_or_ms(&state.played_at, state.started_at_ms);
        self.store.set_now_playing(&NowPlayingRow {
            station_id: self.station_id.clone(),
            track_id: state.track_id.clone(),
            played_at,
            priority_score: state.priority_score,
            is_fallback: state.is_fallback_content,
            is_admin_fallback: state.is_admin_curated_fallback,
        })?;

        let json = serde_json::to_string(state)?;
        self.track_cache(self.cache.set(
            &self.keys.now_playing(),
            &json,
            Some(self.now_playing_ttl),
        ));
        Ok(())
    }

    /// Remove the playback state entirely (station stop).
    pub fn clear_current(&self) -> Result<()> {
        self.store.clear_now_playing(&self.station_id)?;
        self.track_cache(self.cache.delete(&self.keys.now_playing()));
        Ok(())
    }

    // =========================================================================
    // Current play info
    // =========================================================================

    pub fn set_current_play(&self, info: &CurrentPlayInfo) -> Result<()> {
        let json = serde_json::to_string(info)?;
        self.track_cache(self.cache.set(
            &self.keys.current_play(),
            &json,
            Some(self.current_play_ttl),
        ));
        Ok(())
    }

    /// Read and clear the in-flight play info in one step, so finalization
    /// happens exactly once.
    pub fn take_current_play(&self) -> Option<CurrentPlayInfo> {
        let json = self
            .track_cache(self.cache.get(&self.keys.current_play()))
            .flatten()?;
        self.track_cache(self.cache.delete(&self.keys.current_play()));
        serde_json::from_str(&json).ok()
    }

    pub fn clear_current_play(&self) {
        self.track_cache(self.cache.delete(&self.keys.current_play()));
    }
}

fn parse_rfc3339_or_ms(s: &str, fallback_ms: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            Utc.timestamp_millis_opt(fallback_ms)
                .single()
                .unwrap_or_else(Utc::now)
        })
}
