use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Selection decisions
// =============================================================================

/// Why a track was chosen for air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Funded by the artist's purchased credit balance.
    CreditFunded,
    /// Played under the artist's free introductory allowance.
    Trial,
    /// Drawn from the artist-opt-in, admin-approved free rotation pool.
    ArtistOptIn,
    /// Administrator-curated fallback content.
    AdminFallback,
    /// Last-resort default track when nothing else is eligible.
    GenericFallback,
}

impl SelectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionReason::CreditFunded => "credit_funded",
            SelectionReason::Trial => "trial",
            SelectionReason::ArtistOptIn => "artist_opt_in",
            SelectionReason::AdminFallback => "admin_fallback",
            SelectionReason::GenericFallback => "generic_fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit_funded" => Some(SelectionReason::CreditFunded),
            "trial" => Some(SelectionReason::Trial),
            "artist_opt_in" => Some(SelectionReason::ArtistOptIn),
            "admin_fallback" => Some(SelectionReason::AdminFallback),
            "generic_fallback" => Some(SelectionReason::GenericFallback),
            _ => None,
        }
    }

    /// Whether this reason represents artist-owned content whose play should
    /// be attributed back to the artist.
    pub fn is_attributable(&self) -> bool {
        matches!(
            self,
            SelectionReason::CreditFunded | SelectionReason::Trial | SelectionReason::ArtistOptIn
        )
    }
}

/// One appended audit row per transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionDecision {
    /// Assigned by the store on append; 0 until then.
    pub id: i64,
    pub station_id: String,
    pub track_id: String,
    pub selected_at: DateTime<Utc>,
    pub reason: SelectionReason,
    /// Descriptive tier label computed by the selection policy.
    pub tier: Option<String>,
    pub listener_count: i64,
    pub weight_score: f64,
    pub candidate_count: i64,
    pub shuffle_seed: Option<i64>,
}

// =============================================================================
// Playlist persistence
// =============================================================================

/// Which playlist drives the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistType {
    FreeRotation,
    Paid,
}

impl PlaylistType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistType::FreeRotation => "free_rotation",
            PlaylistType::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free_rotation" => Some(PlaylistType::FreeRotation),
            "paid" => Some(PlaylistType::Paid),
            _ => None,
        }
    }
}

/// Durable counterpart of the rotation stack and fallback cursor.
///
/// One logical row per station. The stack content is stored as a JSON array
/// of track ids; `stack_version_hash` fingerprints that content so full
/// rewrites can be skipped when only the read position moved.
#[derive(Debug, Clone)]
pub struct PlaylistPersistState {
    pub station_id: String,
    pub playlist_type: PlaylistType,
    pub fallback_stack: Vec<String>,
    pub fallback_position: i64,
    pub stack_version_hash: Option<String>,
    pub last_switched_at: Option<DateTime<Utc>>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Now playing
// =============================================================================

/// The minimal durable record of what is on air.
///
/// Duration is not stored here; reconstruction resolves it from the track
/// catalog so the durable row never drifts from track metadata.
#[derive(Debug, Clone)]
pub struct NowPlayingRow {
    pub station_id: String,
    pub track_id: String,
    pub played_at: DateTime<Utc>,
    pub priority_score: f64,
    pub is_fallback: bool,
    pub is_admin_fallback: bool,
}

// =============================================================================
// Track catalog
// =============================================================================

/// A playable track with the eligibility flags selection cares about.
#[derive(Debug, Clone)]
pub struct TrackRow {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    /// Missing metadata duration is tolerated; callers substitute a default.
    pub duration_secs: Option<i64>,
    pub rotation_opt_in: bool,
    pub rotation_approved: bool,
    pub is_admin_fallback: bool,
    pub play_count: i64,
    pub paid_play_count: i64,
    pub trial_plays_allowed: i64,
    pub trial_plays_used: i64,
}

impl TrackRow {
    /// Remaining free introductory plays.
    pub fn trial_plays_remaining(&self) -> i64 {
        (self.trial_plays_allowed - self.trial_plays_used).max(0)
    }
}

// =============================================================================
// Credits
// =============================================================================

/// Result of a credit debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebitOutcome {
    pub success: bool,
    pub balance_before: i64,
    pub balance_after: i64,
}
