//! Checkpoint coordination for rotation/cursor state.
//!
//! Every transition updates the cache-backed read position immediately (the
//! fast path) and bumps a cache-held counter; once the counter reaches the
//! configured interval the position is synced to the durable store and the
//! counter resets. Full stack contents are written durably only when their
//! fingerprint changes, so position-only movement never rewrites the stack.
//! With the cache unreachable, every transition syncs durably instead of
//! batching.

use crate::cache::{CacheBackend, CacheKeys};
use crate::station_store::{PlaylistPersistState, StationStore};
use anyhow::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of transitions between durable position syncs.
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 5;

/// Fingerprint of a stack's content, independent of read position.
pub fn stack_hash(track_ids: &[String]) -> String {
    let mut hasher = Sha256::new();
    for id in track_ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub struct CheckpointCoordinator {
    cache: Arc<dyn CacheBackend>,
    store: Arc<dyn StationStore>,
    keys: CacheKeys,
    station_id: String,
    interval: u32,
    position_ttl: Duration,
}

impl CheckpointCoordinator {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        store: Arc<dyn StationStore>,
        station_id: impl Into<String>,
        interval: u32,
        position_ttl: Duration,
    ) -> Self {
        let station_id = station_id.into();
        Self {
            cache,
            store,
            keys: CacheKeys::new(&station_id),
            station_id,
            interval: interval.max(1),
            position_ttl,
        }
    }

    /// Record a new read position. Returns `true` when this call also synced
    /// the position durably (interval reached, or cache unavailable).
    pub fn checkpoint_position(&self, position: i64) -> Result<bool> {
        let cache_write = self.cache.set(
            &self.keys.fallback_position(),
            &position.to_string(),
            Some(self.position_ttl),
        );

        if cache_write.is_err() {
            // No cache to batch with: correctness over throughput.
            self.sync_durable(position)?;
            return Ok(true);
        }

        match self.cache.incr(&self.keys.sync_counter()) {
            Ok(count) if count >= self.interval as i64 => {
                self.sync_durable(position)?;
                // Reset only after a successful sync so a failed one retries
                // on the next transition.
                if let Err(e) = self.cache.delete(&self.keys.sync_counter()) {
                    debug!("Failed to reset checkpoint counter: {e}");
                }
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) => {
                debug!("Checkpoint counter unavailable, syncing durably: {e}");
                self.sync_durable(position)?;
                Ok(true)
            }
        }
    }

    /// Sync the position durably right now, bypassing the interval.
    pub fn force_sync_position(&self, position: i64) -> Result<()> {
        self.sync_durable(position)?;
        let _ = self.cache.set(
            &self.keys.fallback_position(),
            &position.to_string(),
            Some(self.position_ttl),
        );
        let _ = self.cache.delete(&self.keys.sync_counter());
        Ok(())
    }

    fn sync_durable(&self, position: i64) -> Result<()> {
        self.store
            .update_fallback_position(&self.station_id, position)?;
        crate::server::metrics::record_checkpoint("position");
        Ok(())
    }

    /// Write the full stack contents durably, skipped when the content
    /// fingerprint is unchanged. Returns `true` when a write happened.
    pub fn save_full_state(&self, state: &PlaylistPersistState) -> Result<bool> {
        let hash = stack_hash(&state.fallback_stack);
        let existing = self.store.get_playlist_state(&self.station_id)?;

        if existing.as_ref().and_then(|s| s.stack_version_hash.as_deref()) == Some(hash.as_str()) {
            debug!("Stack content unchanged, skipping full checkpoint");
            return Ok(false);
        }

        let mut state = state.clone();
        state.station_id = self.station_id.clone();
        state.stack_version_hash = Some(hash);
        state.last_checkpoint_at = Some(Utc::now());
        // Track when the active playlist type last flipped.
        state.last_switched_at = match &existing {
            Some(previous) if previous.playlist_type == state.playlist_type => {
                previous.last_switched_at
            }
            _ => Some(Utc::now()),
        };
        self.store.save_playlist_state(&state)?;
        // Keep the cached playlist-type marker in step with the durable row.
        let _ = self.cache.set(
            &self.keys.playlist_type(),
            state.playlist_type.as_str(),
            Some(self.position_ttl),
        );
        crate::server::metrics::record_checkpoint("full_state");
        Ok(true)
    }

    /// Recover the durable rotation/cursor state (startup path).
    pub fn load_full_state(&self) -> Result<Option<PlaylistPersistState>> {
        self.store.get_playlist_state(&self.station_id)
    }

    /// Checkpoint-path wrapper that downgrades durable failures to a warning;
    /// playback never stalls on checkpoint bookkeeping.
    pub fn checkpoint_position_best_effort(&self, position: i64) {
        if let Err(e) = self.checkpoint_position(position) {
            warn!("Durable position checkpoint failed (continuing): {e}");
        }
    }

    /// Startup recovery: prime the cache-backed cursor from the durable
    /// checkpoint when the cache copy is gone. Returns `true` when a cursor
    /// was recovered. Staleness is bounded by the checkpoint interval.
    pub fn recover_cursor(&self, cursor_store: &super::CursorStore) -> Result<bool> {
        let Some(persisted) = self.load_full_state()? else {
            return Ok(false);
        };
        if persisted.fallback_stack.is_empty() {
            return Ok(false);
        }
        if matches!(cursor_store.get(), Ok(Some(_))) {
            // Cache copy survived, nothing to recover.
            return Ok(false);
        }

        let max_index = persisted.fallback_stack.len() as i64 - 1;
        let mut cursor = super::PlaylistCursor::new(persisted.fallback_stack, 0);
        cursor.current_index = persisted.fallback_position.clamp(0, max_index) as usize;
        cursor_store
            .set(&cursor)
            .map_err(|e| anyhow::anyhow!("cursor prime failed: {e}"))?;
        debug!(
            position = cursor.current_index,
            tracks = cursor.track_ids.len(),
            "Recovered fallback playlist from durable checkpoint"
        );
        Ok(true)
    }
}
