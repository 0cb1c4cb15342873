//! Playback state, rotation and checkpointing.

mod checkpoint;
mod cursor;
mod listeners;
mod rotation;
mod state;

pub use checkpoint::{stack_hash, CheckpointCoordinator, DEFAULT_CHECKPOINT_INTERVAL};
pub use cursor::{CursorStore, PlaylistCursor};
pub use listeners::ListenerCounter;
pub use rotation::{shuffled, RotationStack};
pub use state::{
    CurrentPlayInfo, PlaybackState, PlaybackStateStore, DEFAULT_TRACK_DURATION_SECS,
};
