//! Station scheduler.
//!
//! Orchestrates every transition: closes out the previous play, selects the
//! next track through the tiered policy, writes the authoritative playback
//! state, appends the decision log entry, and notifies collaborators.

mod collaborators;
mod credits;
mod scheduler;
mod selection;

pub use collaborators::{
    CreditLedger, EligibilitySource, NullReactionContext, ReactionContext, SqliteCreditLedger,
    SqliteEligibilitySource,
};
pub use credits::credits_required;
pub use scheduler::{
    create_scheduler, SchedulerCommand, SchedulerHandle, StationPhase, StationScheduler,
};
pub use selection::{
    Candidate, ListenerTieredPolicy, NextPreview, Selection, SelectionPolicy, Selector,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Fatal configuration error: every tier came up empty, including the
    /// generic fallback. The scheduler stops rather than spinning.
    #[error("no eligible track in any selection tier; configure at least one fallback track")]
    NoEligibleCandidate,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SchedulerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::NoEligibleCandidate)
    }
}
