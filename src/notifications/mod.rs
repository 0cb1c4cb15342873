//! Listener and artist notifications.

mod dispatcher;

pub use dispatcher::{
    DebouncedDispatcher, DispatcherConfig, NotificationDispatcher, NotificationSink,
    StationNotification, TracingSink,
};
