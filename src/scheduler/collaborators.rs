//! Collaborator ports consumed by the scheduler.
//!
//! Narrow contracts: the scheduler never reaches for backend clients
//! directly. Failures behind any of these ports are caught and logged at
//! the call site; none of them may prevent a transition from completing.

use crate::station_store::{DebitOutcome, StationStore, TrackRow};
use anyhow::Result;
use std::sync::Arc;

// =============================================================================
// Credit / trial ledger
// =============================================================================

/// Debits credit units for a funded play.
///
/// Must be idempotent per `play_id`: the scheduler may retry a debit for
/// the same transition.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait CreditLedger: Send + Sync {
    fn debit(
        &self,
        artist_id: &str,
        track_id: &str,
        play_id: &str,
        units: i64,
    ) -> Result<DebitOutcome>;
}

/// Ledger backed by the station database's credit tables.
pub struct SqliteCreditLedger {
    store: Arc<dyn StationStore>,
}

impl SqliteCreditLedger {
    pub fn new(store: Arc<dyn StationStore>) -> Self {
        Self { store }
    }
}

impl CreditLedger for SqliteCreditLedger {
    fn debit(
        &self,
        artist_id: &str,
        track_id: &str,
        play_id: &str,
        units: i64,
    ) -> Result<DebitOutcome> {
        self.store.debit_credits(play_id, artist_id, track_id, units)
    }
}

// =============================================================================
// Reaction / chat context
// =============================================================================

/// Keys reaction aggregation off "what's playing now".
pub trait ReactionContext: Send + Sync {
    fn set_current_track(&self, track_id: &str) -> Result<()>;
}

/// No-op context for deployments without a reaction aggregator.
pub struct NullReactionContext;

impl ReactionContext for NullReactionContext {
    fn set_current_track(&self, _track_id: &str) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Eligibility source
// =============================================================================

/// Read-only candidate pools for each selection tier.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait EligibilitySource: Send + Sync {
    /// Tracks whose artist holds a positive credit balance, with the balance.
    fn paid_candidates(&self) -> Result<Vec<(TrackRow, i64)>>;

    /// Tracks still inside their trial allowance.
    fn trial_candidates(&self) -> Result<Vec<TrackRow>>;

    /// Opt-in, admin-approved free rotation pool.
    fn rotation_pool(&self) -> Result<Vec<String>>;

    /// Administrator-curated fallback pool.
    fn admin_fallback_pool(&self) -> Result<Vec<String>>;

    /// Track metadata lookup.
    fn track(&self, track_id: &str) -> Result<Option<TrackRow>>;
}

/// Eligibility queries against the station database.
pub struct SqliteEligibilitySource {
    store: Arc<dyn StationStore>,
    /// Optional gate: minimum paid plays before a track enters free
    /// rotation. `None` disables the check.
    min_paid_plays: Option<u32>,
}

impl SqliteEligibilitySource {
    pub fn new(store: Arc<dyn StationStore>, min_paid_plays: Option<u32>) -> Self {
        Self {
            store,
            min_paid_plays,
        }
    }
}

impl EligibilitySource for SqliteEligibilitySource {
    fn paid_candidates(&self) -> Result<Vec<(TrackRow, i64)>> {
        self.store.credit_funded_tracks()
    }

    fn trial_candidates(&self) -> Result<Vec<TrackRow>> {
        self.store.trial_tracks()
    }

    fn rotation_pool(&self) -> Result<Vec<String>> {
        self.store.approved_rotation_track_ids(self.min_paid_plays)
    }

    fn admin_fallback_pool(&self) -> Result<Vec<String>> {
        self.store.admin_fallback_track_ids()
    }

    fn track(&self, track_id: &str) -> Result<Option<TrackRow>> {
        self.store.get_track(track_id)
    }
}
