//! Continuous-loop playlist cursor.
//!
//! A pointer over an ordered track list used to drive repeating playback
//! sequences (the admin-curated fallback playlist). The cursor itself never
//! reshuffles: when an advance wraps past the end, `loop_count` increments,
//! the index resets, and the caller is expected to supply a fresh shuffle
//! seed and order before the next write. Cached with a bounded lifetime that
//! refreshes on every write, so a crashed scheduler cannot freeze the
//! continuation point forever.

use crate::cache::{CacheBackend, CacheKeys, CacheResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistCursor {
    pub shuffle_seed: u64,
    pub track_ids: Vec<String>,
    pub current_index: usize,
    pub loop_count: u64,
    /// RFC 3339; refreshed on every write.
    pub last_updated: String,
}

impl PlaylistCursor {
    pub fn new(track_ids: Vec<String>, shuffle_seed: u64) -> Self {
        Self {
            shuffle_seed,
            track_ids,
            current_index: 0,
            loop_count: 0,
            last_updated: Utc::now().to_rfc3339(),
        }
    }

    /// The track the cursor currently points at.
    pub fn current_track(&self) -> Option<&str> {
        self.track_ids.get(self.current_index).map(|s| s.as_str())
    }

    /// Move to the next position. Returns `(new_index, looped)`, or `None`
    /// when the cursor has no tracks. Wrapping resets the index to 0 and
    /// increments `loop_count`.
    pub fn advance(&mut self) -> Option<(usize, bool)> {
        if self.track_ids.is_empty() {
            return None;
        }
        let next = self.current_index + 1;
        if next >= self.track_ids.len() {
            self.current_index = 0;
            self.loop_count += 1;
            Some((0, true))
        } else {
            self.current_index = next;
            Some((next, false))
        }
    }

    /// The track an advance would land on, and whether it would wrap.
    pub fn peek_next(&self) -> Option<(&str, bool)> {
        if self.track_ids.is_empty() {
            return None;
        }
        let next = self.current_index + 1;
        if next >= self.track_ids.len() {
            Some((self.track_ids[0].as_str(), true))
        } else {
            Some((self.track_ids[next].as_str(), false))
        }
    }
}

pub struct CursorStore {
    cache: Arc<dyn CacheBackend>,
    keys: CacheKeys,
    ttl: Duration,
}

impl CursorStore {
    pub fn new(cache: Arc<dyn CacheBackend>, station_id: &str, ttl: Duration) -> Self {
        Self {
            cache,
            keys: CacheKeys::new(station_id),
            ttl,
        }
    }

    pub fn get(&self) -> CacheResult<Option<PlaylistCursor>> {
        let Some(json) = self.cache.get(&self.keys.playlist_cursor())? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(e) => {
                debug!("Malformed cached playlist cursor, treating as absent: {e}");
                Ok(None)
            }
        }
    }

    pub fn set(&self, cursor: &PlaylistCursor) -> CacheResult<()> {
        let mut cursor = cursor.clone();
        cursor.last_updated = Utc::now().to_rfc3339();
        let json = serde_json::to_string(&cursor).expect("cursor serializes");
        self.cache
            .set(&self.keys.playlist_cursor(), &json, Some(self.ttl))
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.cache.delete(&self.keys.playlist_cursor())
    }
}
