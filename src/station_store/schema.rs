//! SQLite schema for the station database.
//!
//! Holds the track catalog with its eligibility flags, artist credit
//! balances, the single authoritative now-playing row, the durable playlist
//! state, and the append-only selection log.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - catalog, credits, playback state, selection log
// =============================================================================

const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", SqlType::Text, is_primary_key = true),
        sqlite_column!("artist_id", SqlType::Text, non_null = true),
        sqlite_column!("title", SqlType::Text, non_null = true),
        sqlite_column!("duration_secs", SqlType::Integer),
        sqlite_column!("rotation_opt_in", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("rotation_approved", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("is_admin_fallback", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("play_count", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("paid_play_count", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("trial_plays_allowed", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("trial_plays_used", SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[
        ("idx_tracks_artist", "artist_id"),
        ("idx_tracks_rotation", "rotation_opt_in, rotation_approved"),
    ],
};

const ARTIST_CREDITS_TABLE_V1: Table = Table {
    name: "artist_credits",
    columns: &[
        sqlite_column!("artist_id", SqlType::Text, is_primary_key = true),
        sqlite_column!("balance_units", SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
};

/// One row per successful debit, keyed by play id so a retried debit for the
/// same play is a no-op instead of a double charge.
const CREDIT_DEBITS_TABLE_V1: Table = Table {
    name: "credit_debits",
    columns: &[
        sqlite_column!("play_id", SqlType::Text, is_primary_key = true),
        sqlite_column!("artist_id", SqlType::Text, non_null = true),
        sqlite_column!("track_id", SqlType::Text, non_null = true),
        sqlite_column!("units", SqlType::Integer, non_null = true),
        sqlite_column!("debited_at", SqlType::Text, non_null = true),
    ],
    indices: &[("idx_credit_debits_artist", "artist_id")],
};

/// The single authoritative now-playing row per station.
const NOW_PLAYING_TABLE_V1: Table = Table {
    name: "now_playing",
    columns: &[
        sqlite_column!("station_id", SqlType::Text, is_primary_key = true),
        sqlite_column!("track_id", SqlType::Text, non_null = true),
        sqlite_column!("played_at", SqlType::Text, non_null = true),
        sqlite_column!("priority_score", SqlType::Real, non_null = true, default_value = Some("0")),
        sqlite_column!("is_fallback", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("is_admin_fallback", SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[],
};

const PLAYLIST_STATE_TABLE_V1: Table = Table {
    name: "playlist_state",
    columns: &[
        sqlite_column!("station_id", SqlType::Text, is_primary_key = true),
        sqlite_column!("playlist_type", SqlType::Text, non_null = true),
        sqlite_column!("fallback_stack", SqlType::Text, non_null = true),
        sqlite_column!("fallback_position", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("stack_version_hash", SqlType::Text),
        sqlite_column!("last_switched_at", SqlType::Text),
        sqlite_column!("last_checkpoint_at", SqlType::Text),
    ],
    indices: &[],
};

const SELECTION_LOG_TABLE_V1: Table = Table {
    name: "selection_log",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("station_id", SqlType::Text, non_null = true),
        sqlite_column!("track_id", SqlType::Text, non_null = true),
        sqlite_column!("selected_at", SqlType::Text, non_null = true),
        sqlite_column!("reason", SqlType::Text, non_null = true),
        sqlite_column!("tier", SqlType::Text),
        sqlite_column!("listener_count", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("weight_score", SqlType::Real, non_null = true, default_value = Some("0")),
        sqlite_column!("candidate_count", SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("shuffle_seed", SqlType::Integer),
    ],
    indices: &[
        ("idx_selection_log_station_time", "station_id, selected_at DESC"),
        ("idx_selection_log_reason", "reason"),
    ],
};

// =============================================================================
// Version 2 - play reports
// =============================================================================

const PLAY_REPORTS_TABLE_V2: Table = Table {
    name: "play_reports",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        sqlite_column!("station_id", SqlType::Text, non_null = true),
        sqlite_column!("track_id", SqlType::Text, non_null = true),
        sqlite_column!("reported_at", SqlType::Text, non_null = true),
        sqlite_column!("was_skipped", SqlType::Integer, non_null = true, default_value = Some("0")),
    ],
    indices: &[("idx_play_reports_track", "track_id, reported_at DESC")],
};

/// Migration from version 1 to version 2: add the play_reports table.
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE play_reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            reported_at TEXT NOT NULL,
            was_skipped INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_play_reports_track ON play_reports(track_id, reported_at DESC)",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Versioned schema definition
// =============================================================================

/// All versioned schemas for the station database.
///
/// Version 1: track catalog, credits, now playing, playlist state, selection log
/// Version 2: play reports
pub const STATION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            TRACKS_TABLE_V1,
            ARTIST_CREDITS_TABLE_V1,
            CREDIT_DEBITS_TABLE_V1,
            NOW_PLAYING_TABLE_V1,
            PLAYLIST_STATE_TABLE_V1,
            SELECTION_LOG_TABLE_V1,
        ],
        migration: None, // Initial version has no migration
    },
    VersionedSchema {
        version: 2,
        tables: &[
            TRACKS_TABLE_V1,
            ARTIST_CREDITS_TABLE_V1,
            CREDIT_DEBITS_TABLE_V1,
            NOW_PLAYING_TABLE_V1,
            PLAYLIST_STATE_TABLE_V1,
            SELECTION_LOG_TABLE_V1,
            PLAY_REPORTS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
];
