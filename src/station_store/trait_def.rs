//! StationStore trait definition.
//!
//! The durable backend of record: the cache may answer faster, but every
//! question here has an authoritative answer in SQLite. Implementations are
//! synchronous; async callers wrap them where it matters.

use super::{
    DebitOutcome, NowPlayingRow, PlaylistPersistState, SelectionDecision, TrackRow,
};
use anyhow::Result;

pub trait StationStore: Send + Sync {
    // =========================================================================
    // Now playing
    // =========================================================================

    /// Get the durable now-playing row, if any.
    fn get_now_playing(&self, station_id: &str) -> Result<Option<NowPlayingRow>>;

    /// Replace the now-playing row (last writer wins).
    fn set_now_playing(&self, row: &NowPlayingRow) -> Result<()>;

    /// Remove the now-playing row (station stop).
    fn clear_now_playing(&self, station_id: &str) -> Result<()>;

    // =========================================================================
    // Playlist persistence
    // =========================================================================

    /// Load the durable rotation/cursor state for a station.
    fn get_playlist_state(&self, station_id: &str) -> Result<Option<PlaylistPersistState>>;

    /// Write the full playlist state, stack content included.
    fn save_playlist_state(&self, state: &PlaylistPersistState) -> Result<()>;

    /// Update only the read position (and the checkpoint timestamp) without
    /// rewriting the stack content.
    fn update_fallback_position(&self, station_id: &str, position: i64) -> Result<()>;

    // =========================================================================
    // Selection log
    // =========================================================================

    /// Append one decision row. Returns the assigned row id.
    fn append_selection(&self, decision: &SelectionDecision) -> Result<i64>;

    /// Most recent decisions, newest first.
    fn recent_selections(&self, station_id: &str, limit: usize) -> Result<Vec<SelectionDecision>>;

    // =========================================================================
    // Play reporting
    // =========================================================================

    /// Record that a track finished or was skipped. Returns the report id.
    fn record_play_report(&self, station_id: &str, track_id: &str, was_skipped: bool)
        -> Result<i64>;

    /// Bump a track's play counter (finalize time). Paid-play counters are
    /// bumped by `debit_credits` inside the debit transaction.
    fn increment_play_count(&self, track_id: &str) -> Result<()>;

    /// Consume one trial play.
    fn increment_trial_used(&self, track_id: &str) -> Result<()>;

    // =========================================================================
    // Track catalog
    // =========================================================================

    fn insert_track(&self, track: &TrackRow) -> Result<()>;

    fn get_track(&self, track_id: &str) -> Result<Option<TrackRow>>;

    /// Duration lookup used when reconstructing playback state durably.
    fn track_duration_secs(&self, track_id: &str) -> Result<Option<i64>>;

    /// Tracks whose artist holds a positive credit balance, paired with that
    /// balance.
    fn credit_funded_tracks(&self) -> Result<Vec<(TrackRow, i64)>>;

    /// Tracks still within their trial allowance.
    fn trial_tracks(&self) -> Result<Vec<TrackRow>>;

    /// Ids of tracks the artist opted into rotation and an admin approved.
    /// `min_paid_plays` optionally gates entry on paid-play history.
    fn approved_rotation_track_ids(&self, min_paid_plays: Option<u32>) -> Result<Vec<String>>;

    /// Ids of administrator-curated fallback tracks.
    fn admin_fallback_track_ids(&self) -> Result<Vec<String>>;

    // =========================================================================
    // Credits
    // =========================================================================

    fn credit_balance(&self, artist_id: &str) -> Result<i64>;

    fn set_credit_balance(&self, artist_id: &str, units: i64) -> Result<()>;

    /// Debit `units` from an artist's balance for a play. Idempotent per
    /// `play_id`: a repeated call for the same play succeeds without
    /// charging again. Insufficient balance returns `success == false` and
    /// leaves the balance untouched.
    fn debit_credits(
        &self,
        play_id: &str,
        artist_id: &str,
        track_id: &str,
        units: i64,
    ) -> Result<DebitOutcome>;
}
