//! Durable station storage.
//!
//! SQLite-backed source of truth for the now-playing record, the playlist
//! persistence row, the append-only selection log, play reports, and the
//! track/credit tables that back eligibility queries.

mod models;
mod schema;
mod sqlite_station_store;
mod trait_def;

pub use models::{
    DebitOutcome, NowPlayingRow, PlaylistPersistState, PlaylistType, SelectionDecision,
    SelectionReason, TrackRow,
};
pub use sqlite_station_store::SqliteStationStore;
pub use trait_def::StationStore;
