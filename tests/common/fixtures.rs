//! Shared fixtures for station integration tests.

use airwave_station_server::cache::{CacheBackend, MemoryCache, OutageCache};
use airwave_station_server::notifications::{
    DebouncedDispatcher, DispatcherConfig, NotificationSink, StationNotification,
};
use airwave_station_server::playback::{
    CheckpointCoordinator, CursorStore, ListenerCounter, PlaybackStateStore, RotationStack,
};
use airwave_station_server::scheduler::{
    create_scheduler, ListenerTieredPolicy, NullReactionContext, SchedulerCommand,
    SchedulerHandle, Selector, SqliteCreditLedger, SqliteEligibilitySource, StationScheduler,
};
use airwave_station_server::station_store::{SqliteStationStore, StationStore, TrackRow};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const CHECKPOINT_INTERVAL: u32 = 5;

/// Sink that records every delivered notification for assertions.
pub struct RecordingSink {
    delivered: Mutex<Vec<StationNotification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
        })
    }

    pub fn delivered(&self) -> Vec<StationNotification> {
        self.delivered.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: StationNotification) {
        self.delivered.lock().unwrap().push(notification);
    }
}

/// A fully wired station over a real SQLite file and an outage-capable cache.
pub struct Station {
    pub scheduler: Arc<StationScheduler>,
    pub handle: SchedulerHandle,
    pub command_rx: Option<mpsc::Receiver<SchedulerCommand>>,
    pub store: Arc<SqliteStationStore>,
    pub cache: Arc<OutageCache>,
    pub listeners: Arc<ListenerCounter>,
    pub sink: Arc<RecordingSink>,
}

/// Build a station against `db_path`. A fresh cache per call simulates a
/// process restart (the durable file carries the state across).
pub fn build_station(db_path: &Path, generic_fallback: Option<&str>) -> Station {
    let store = Arc::new(SqliteStationStore::new(db_path).unwrap());
    let cache = Arc::new(OutageCache::new(Arc::new(MemoryCache::new())));
    build_station_with_cache(store, cache, generic_fallback)
}

pub fn build_station_with_cache(
    store: Arc<SqliteStationStore>,
    cache: Arc<OutageCache>,
    generic_fallback: Option<&str>,
) -> Station {
    let sink = RecordingSink::new();
    let cache_dyn: Arc<dyn CacheBackend> = cache.clone();

    let state_store = Arc::new(PlaybackStateStore::new(
        cache_dyn.clone(),
        store.clone(),
        "main",
        Duration::from_secs(600),
        Duration::from_secs(600),
    ));
    let checkpoint = CheckpointCoordinator::new(
        cache_dyn.clone(),
        store.clone(),
        "main",
        CHECKPOINT_INTERVAL,
        Duration::from_secs(86400),
    );

    // Startup recovery, as the binary does it.
    let cursor_store = CursorStore::new(cache_dyn.clone(), "main", Duration::from_secs(86400));
    let _ = checkpoint.recover_cursor(&cursor_store);

    let selector = Selector::new(
        Arc::new(SqliteEligibilitySource::new(store.clone(), None)),
        Arc::new(ListenerTieredPolicy),
        RotationStack::new(cache_dyn.clone(), "main", Duration::from_secs(3600)),
        cursor_store,
        checkpoint,
        generic_fallback.map(|s| s.to_string()),
    );
    let dispatcher = Arc::new(DebouncedDispatcher::new(
        sink.clone(),
        DispatcherConfig {
            up_next_debounce: Duration::from_millis(5),
            artist_cooldown: Duration::from_millis(0),
            artist_daily_cap: 10_000,
        },
    ));
    let listeners = Arc::new(ListenerCounter::new(cache_dyn.clone(), "main"));

    let (scheduler, handle, command_rx) = create_scheduler(StationScheduler::new(
        state_store,
        selector,
        store.clone(),
        Arc::new(SqliteCreditLedger::new(store.clone())),
        dispatcher,
        Arc::new(NullReactionContext),
        listeners.clone(),
        "main",
        Duration::from_millis(200),
    ));

    Station {
        scheduler,
        handle,
        command_rx: Some(command_rx),
        store,
        cache,
        listeners,
        sink,
    }
}

pub fn track(id: &str, artist: &str, duration_secs: i64) -> TrackRow {
    TrackRow {
        id: id.to_string(),
        artist_id: artist.to_string(),
        title: format!("Title {}", id),
        duration_secs: Some(duration_secs),
        rotation_opt_in: false,
        rotation_approved: false,
        is_admin_fallback: false,
        play_count: 0,
        paid_play_count: 0,
        trial_plays_allowed: 0,
        trial_plays_used: 0,
    }
}

pub fn seed_admin_fallback(store: &SqliteStationStore, ids: &[&str]) {
    for id in ids {
        let mut t = track(id, "station", 120);
        t.is_admin_fallback = true;
        store.insert_track(&t).unwrap();
    }
}

pub fn seed_rotation(store: &SqliteStationStore, ids: &[&str]) {
    for id in ids {
        let mut t = track(id, "opted-in", 120);
        t.rotation_opt_in = true;
        t.rotation_approved = true;
        store.insert_track(&t).unwrap();
    }
}
