use super::models::{
    DebitOutcome, NowPlayingRow, PlaylistPersistState, PlaylistType, SelectionDecision,
    SelectionReason, TrackRow,
};
use super::schema::STATION_VERSIONED_SCHEMAS;
use super::StationStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteStationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStationStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open station database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        if is_new_db {
            // Fresh database - create with latest schema
            info!("Creating new station database at {:?}", path);
            STATION_VERSIONED_SCHEMAS.last().unwrap().create(&conn)?;
        } else {
            // Existing database - check version and migrate if needed
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;

            if db_version < 1 {
                anyhow::bail!(
                    "Station database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let current_schema_version = STATION_VERSIONED_SCHEMAS.last().unwrap().version as i64;

            let version_index = STATION_VERSIONED_SCHEMAS
                .iter()
                .position(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown station database version {}", db_version))?;
            STATION_VERSIONED_SCHEMAS[version_index]
                .validate(&conn)
                .with_context(|| {
                    format!(
                        "Station database schema validation failed for version {}",
                        db_version
                    )
                })?;

            if db_version < current_schema_version {
                info!(
                    "Migrating station database from version {} to {}",
                    db_version, current_schema_version
                );
                Self::migrate_if_needed(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest = from_version;
        for schema in STATION_VERSIONED_SCHEMAS.iter() {
            if schema.version > from_version {
                if let Some(migration_fn) = schema.migration {
                    migration_fn(&tx).with_context(|| {
                        format!("Failed to run migration to version {}", schema.version)
                    })?;
                }
                latest = schema.version;
            }
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<TrackRow> {
        Ok(TrackRow {
            id: row.get("id")?,
            artist_id: row.get("artist_id")?,
            title: row.get("title")?,
            duration_secs: row.get("duration_secs")?,
            rotation_opt_in: row.get::<_, i64>("rotation_opt_in")? != 0,
            rotation_approved: row.get::<_, i64>("rotation_approved")? != 0,
            is_admin_fallback: row.get::<_, i64>("is_admin_fallback")? != 0,
            play_count: row.get("play_count")?,
            paid_play_count: row.get("paid_play_count")?,
            trial_plays_allowed: row.get("trial_plays_allowed")?,
            trial_plays_used: row.get("trial_plays_used")?,
        })
    }

    fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<SelectionDecision> {
        let reason_str: String = row.get("reason")?;
        let selected_at_str: String = row.get("selected_at")?;

        Ok(SelectionDecision {
            id: row.get("id")?,
            station_id: row.get("station_id")?,
            track_id: row.get("track_id")?,
            selected_at: Self::parse_datetime(&selected_at_str),
            reason: SelectionReason::parse(&reason_str)
                .unwrap_or(SelectionReason::GenericFallback),
            tier: row.get("tier")?,
            listener_count: row.get("listener_count")?,
            weight_score: row.get("weight_score")?,
            candidate_count: row.get("candidate_count")?,
            shuffle_seed: row.get("shuffle_seed")?,
        })
    }

    const TRACK_COLUMNS: &'static str = "id, artist_id, title, duration_secs, rotation_opt_in, \
         rotation_approved, is_admin_fallback, play_count, paid_play_count, \
         trial_plays_allowed, trial_plays_used";
}

impl StationStore for SqliteStationStore {
    fn get_now_playing(&self, station_id: &str) -> Result<Option<NowPlayingRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT station_id, track_id, played_at, priority_score, is_fallback, is_admin_fallback
             FROM now_playing WHERE station_id = ?1",
        )?;

        let row = stmt
            .query_row(params![station_id], |row| {
                let played_at_str: String = row.get("played_at")?;
                Ok(NowPlayingRow {
                    station_id: row.get("station_id")?,
                    track_id: row.get("track_id")?,
                    played_at: Self::parse_datetime(&played_at_str),
                    priority_score: row.get("priority_score")?,
                    is_fallback: row.get::<_, i64>("is_fallback")? != 0,
                    is_admin_fallback: row.get::<_, i64>("is_admin_fallback")? != 0,
                })
            })
            .optional()?;

        Ok(row)
    }

    fn set_now_playing(&self, row: &NowPlayingRow) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let played_at = Self::format_datetime(&row.played_at);

        conn.execute(
            "INSERT INTO now_playing (station_id, track_id, played_at, priority_score, is_fallback, is_admin_fallback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(station_id) DO UPDATE SET
                track_id = ?2, played_at = ?3, priority_score = ?4,
                is_fallback = ?5, is_admin_fallback = ?6",
            params![
                row.station_id,
                row.track_id,
                played_at,
                row.priority_score,
                row.is_fallback as i64,
                row.is_admin_fallback as i64,
            ],
        )?;

        Ok(())
    }

    fn clear_now_playing(&self, station_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM now_playing WHERE station_id = ?1",
            params![station_id],
        )?;
        Ok(())
    }

    fn get_playlist_state(&self, station_id: &str) -> Result<Option<PlaylistPersistState>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT station_id, playlist_type, fallback_stack, fallback_position,
                    stack_version_hash, last_switched_at, last_checkpoint_at
             FROM playlist_state WHERE station_id = ?1",
        )?;

        let state = stmt
            .query_row(params![station_id], |row| {
                let playlist_type_str: String = row.get("playlist_type")?;
                let stack_json: String = row.get("fallback_stack")?;
                let last_switched: Option<String> = row.get("last_switched_at")?;
                let last_checkpoint: Option<String> = row.get("last_checkpoint_at")?;

                Ok(PlaylistPersistState {
                    station_id: row.get("station_id")?,
                    playlist_type: PlaylistType::parse(&playlist_type_str)
                        .unwrap_or(PlaylistType::FreeRotation),
                    fallback_stack: serde_json::from_str(&stack_json).unwrap_or_default(),
                    fallback_position: row.get("fallback_position")?,
                    stack_version_hash: row.get("stack_version_hash")?,
                    last_switched_at: last_switched.as_deref().map(Self::parse_datetime),
                    last_checkpoint_at: last_checkpoint.as_deref().map(Self::parse_datetime),
                })
            })
            .optional()?;

        Ok(state)
    }

    fn save_playlist_state(&self, state: &PlaylistPersistState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let stack_json = serde_json::to_string(&state.fallback_stack)?;
        let last_switched = state.last_switched_at.as_ref().map(Self::format_datetime);
        let last_checkpoint = state.last_checkpoint_at.as_ref().map(Self::format_datetime);

        conn.execute(
            "INSERT INTO playlist_state (station_id, playlist_type, fallback_stack, fallback_position,
                                         stack_version_hash, last_switched_at, last_checkpoint_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(station_id) DO UPDATE SET
                playlist_type = ?2, fallback_stack = ?3, fallback_position = ?4,
                stack_version_hash = ?5, last_switched_at = ?6, last_checkpoint_at = ?7",
            params![
                state.station_id,
                state.playlist_type.as_str(),
                stack_json,
                state.fallback_position,
                state.stack_version_hash,
                last_switched,
                last_checkpoint,
            ],
        )?;

        Ok(())
    }

    fn update_fallback_position(&self, station_id: &str, position: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "UPDATE playlist_state SET fallback_position = ?1, last_checkpoint_at = ?2
             WHERE station_id = ?3",
            params![position, now, station_id],
        )?;

        Ok(())
    }

    fn append_selection(&self, decision: &SelectionDecision) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let selected_at = Self::format_datetime(&decision.selected_at);

        conn.execute(
            "INSERT INTO selection_log (station_id, track_id, selected_at, reason, tier,
                                        listener_count, weight_score, candidate_count, shuffle_seed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                decision.station_id,
                decision.track_id,
                selected_at,
                decision.reason.as_str(),
                decision.tier,
                decision.listener_count,
                decision.weight_score,
                decision.candidate_count,
                decision.shuffle_seed,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn recent_selections(&self, station_id: &str, limit: usize) -> Result<Vec<SelectionDecision>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, station_id, track_id, selected_at, reason, tier,
                    listener_count, weight_score, candidate_count, shuffle_seed
             FROM selection_log
             WHERE station_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let decisions = stmt
            .query_map(params![station_id, limit as i64], Self::row_to_decision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(decisions)
    }

    fn record_play_report(
        &self,
        station_id: &str,
        track_id: &str,
        was_skipped: bool,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Self::format_datetime(&Utc::now());

        conn.execute(
            "INSERT INTO play_reports (station_id, track_id, reported_at, was_skipped)
             VALUES (?1, ?2, ?3, ?4)",
            params![station_id, track_id, now, was_skipped as i64],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn increment_play_count(&self, track_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET play_count = play_count + 1 WHERE id = ?1",
            params![track_id],
        )?;
        Ok(())
    }

    fn increment_trial_used(&self, track_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET trial_plays_used = trial_plays_used + 1 WHERE id = ?1",
            params![track_id],
        )?;
        Ok(())
    }

    fn insert_track(&self, track: &TrackRow) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tracks (id, artist_id, title, duration_secs, rotation_opt_in,
                                 rotation_approved, is_admin_fallback, play_count, paid_play_count,
                                 trial_plays_allowed, trial_plays_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                track.id,
                track.artist_id,
                track.title,
                track.duration_secs,
                track.rotation_opt_in as i64,
                track.rotation_approved as i64,
                track.is_admin_fallback as i64,
                track.play_count,
                track.paid_play_count,
                track.trial_plays_allowed,
                track.trial_plays_used,
            ],
        )?;
        Ok(())
    }

    fn get_track(&self, track_id: &str) -> Result<Option<TrackRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracks WHERE id = ?1",
            Self::TRACK_COLUMNS
        ))?;

        let track = stmt
            .query_row(params![track_id], Self::row_to_track)
            .optional()?;

        Ok(track)
    }

    fn track_duration_secs(&self, track_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let duration: Option<Option<i64>> = conn
            .query_row(
                "SELECT duration_secs FROM tracks WHERE id = ?1",
                params![track_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(duration.flatten())
    }

    fn credit_funded_tracks(&self) -> Result<Vec<(TrackRow, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, c.balance_units AS balance_units
             FROM tracks t JOIN artist_credits c ON c.artist_id = t.artist_id
             WHERE c.balance_units > 0",
            Self::TRACK_COLUMNS
                .split(", ")
                .map(|c| format!("t.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;

        let tracks = stmt
            .query_map([], |row| {
                let track = Self::row_to_track(row)?;
                let balance: i64 = row.get("balance_units")?;
                Ok((track, balance))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tracks)
    }

    fn trial_tracks(&self) -> Result<Vec<TrackRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tracks WHERE trial_plays_used < trial_plays_allowed",
            Self::TRACK_COLUMNS
        ))?;

        let tracks = stmt
            .query_map([], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tracks)
    }

    fn approved_rotation_track_ids(&self, min_paid_plays: Option<u32>) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let ids = match min_paid_plays {
            Some(min) => {
                let mut stmt = conn.prepare(
                    "SELECT id FROM tracks
                     WHERE rotation_opt_in = 1 AND rotation_approved = 1 AND paid_play_count >= ?1
                     ORDER BY id",
                )?;
                let ids = stmt
                    .query_map(params![min as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                ids
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id FROM tracks
                     WHERE rotation_opt_in = 1 AND rotation_approved = 1
                     ORDER BY id",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                ids
            }
        };

        Ok(ids)
    }

    fn admin_fallback_track_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id FROM tracks WHERE is_admin_fallback = 1 ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn credit_balance(&self, artist_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let balance: Option<i64> = conn
            .query_row(
                "SELECT balance_units FROM artist_credits WHERE artist_id = ?1",
                params![artist_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(balance.unwrap_or(0))
    }

    fn set_credit_balance(&self, artist_id: &str, units: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artist_credits (artist_id, balance_units)
             VALUES (?1, ?2)
             ON CONFLICT(artist_id) DO UPDATE SET balance_units = ?2",
            params![artist_id, units],
        )?;
        Ok(())
    }

    fn debit_credits(
        &self,
        play_id: &str,
        artist_id: &str,
        track_id: &str,
        units: i64,
    ) -> Result<DebitOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let balance: i64 = tx
            .query_row(
                "SELECT balance_units FROM artist_credits WHERE artist_id = ?1",
                params![artist_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        // Idempotence: a retried debit for a play we already charged succeeds
        // without charging again.
        let already_debited: bool = tx
            .query_row(
                "SELECT 1 FROM credit_debits WHERE play_id = ?1",
                params![play_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if already_debited {
            tx.commit()?;
            return Ok(DebitOutcome {
                success: true,
                balance_before: balance,
                balance_after: balance,
            });
        }

        if balance < units {
            tx.commit()?;
            return Ok(DebitOutcome {
                success: false,
                balance_before: balance,
                balance_after: balance,
            });
        }

        let after = balance - units;
        tx.execute(
            "UPDATE artist_credits SET balance_units = ?1 WHERE artist_id = ?2",
            params![after, artist_id],
        )?;
        let now = Self::format_datetime(&Utc::now());
        tx.execute(
            "INSERT INTO credit_debits (play_id, artist_id, track_id, units, debited_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![play_id, artist_id, track_id, units, now],
        )?;
        // The paid-play counter moves with the charge, not with finalize.
        tx.execute(
            "UPDATE tracks SET paid_play_count = paid_play_count + 1 WHERE id = ?1",
            params![track_id],
        )?;
        tx.commit()?;

        Ok(DebitOutcome {
            success: true,
            balance_before: balance,
            balance_after: after,
        })
    }
}
