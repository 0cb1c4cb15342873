//! Cache key namespace.
//!
//! Every cached concern gets its own key under the station's namespace so
//! that TTLs and invalidation stay independent per concern.

/// Key builder for a single station's cache entries.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    station_id: String,
}

impl CacheKeys {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
        }
    }

    /// The authoritative "now playing" record (JSON `PlaybackState`).
    pub fn now_playing(&self) -> String {
        format!("station:{}:now_playing", self.station_id)
    }

    /// Shared listener connection count.
    pub fn listener_count(&self) -> String {
        format!("station:{}:listeners", self.station_id)
    }

    /// The shuffled free-rotation FIFO.
    pub fn rotation_stack(&self) -> String {
        format!("station:{}:rotation_stack", self.station_id)
    }

    /// The fallback playlist cursor (JSON `PlaylistCursor`).
    pub fn playlist_cursor(&self) -> String {
        format!("station:{}:playlist_cursor", self.station_id)
    }

    /// Which playlist type is active (`free_rotation` / `paid`).
    pub fn playlist_type(&self) -> String {
        format!("station:{}:playlist_type", self.station_id)
    }

    /// Read position in the fallback playlist.
    pub fn fallback_position(&self) -> String {
        format!("station:{}:fallback_position", self.station_id)
    }

    /// Transitions since the last durable position sync.
    pub fn sync_counter(&self) -> String {
        format!("station:{}:songs_since_checkpoint", self.station_id)
    }

    /// The in-flight attributable play (JSON `CurrentPlayInfo`).
    pub fn current_play(&self) -> String {
        format!("station:{}:current_play", self.station_id)
    }
}
