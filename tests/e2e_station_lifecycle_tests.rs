//! End-to-end station lifecycle tests: full tier walk, skip handling,
//! cache outage degradation, restart recovery, and checkpoint batching,
//! all against a real SQLite file and the in-process cache.

mod common;

use common::fixtures::{
    build_station, build_station_with_cache, seed_admin_fallback, seed_rotation, track,
};
use airwave_station_server::cache::OutageCache;
use airwave_station_server::cache::MemoryCache;
use airwave_station_server::station_store::{SelectionReason, SqliteStationStore, StationStore};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_tiers_drain_in_priority_order() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("station.db");
    let station = build_station(&db_path, Some("filler"));

    // One paid play's worth of credits (60s track -> 12 units), one trial
    // play, no rotation pool, one admin fallback track.
    station
        .store
        .insert_track(&track("paid-song", "funded-artist", 60))
        .unwrap();
    station.store.set_credit_balance("funded-artist", 12).unwrap();

    let mut trial = track("trial-song", "new-artist", 60);
    trial.trial_plays_allowed = 1;
    station.store.insert_track(&trial).unwrap();

    seed_admin_fallback(&station.store, &["house-mix"]);

    let mut reasons = Vec::new();
    for _ in 0..4 {
        station.scheduler.transition().await.unwrap();
        let decision = &station.store.recent_selections("main", 1).unwrap()[0];
        reasons.push((decision.track_id.clone(), decision.reason));
    }

    assert_eq!(
        reasons[0],
        ("paid-song".to_string(), SelectionReason::CreditFunded)
    );
    assert_eq!(reasons[1], ("trial-song".to_string(), SelectionReason::Trial));
    // Funding exhausted: the curated fallback carries the station.
    assert_eq!(
        reasons[2],
        ("house-mix".to_string(), SelectionReason::AdminFallback)
    );
    assert_eq!(
        reasons[3],
        ("house-mix".to_string(), SelectionReason::AdminFallback)
    );

    // Credits are spent to zero, never negative.
    assert_eq!(station.store.credit_balance("funded-artist").unwrap(), 0);

    // Every transition announced itself to listeners.
    let live_count = station
        .sink
        .delivered()
        .iter()
        .filter(|n| {
            matches!(
                n,
                airwave_station_server::notifications::StationNotification::NowLive { .. }
            )
        })
        .count();
    assert_eq!(live_count, 4);
}

#[tokio::test]
async fn test_rotation_pool_drains_once_per_lap() {
    let temp = TempDir::new().unwrap();
    let station = build_station(&temp.path().join("station.db"), None);
    seed_rotation(&station.store, &["r1", "r2", "r3"]);

    let mut first_lap = Vec::new();
    for _ in 0..3 {
        let state = station.scheduler.transition().await.unwrap();
        first_lap.push(state.track_id);
    }
    first_lap.sort();
    assert_eq!(first_lap, vec!["r1", "r2", "r3"]);

    // The stack refills and keeps serving.
    let state = station.scheduler.transition().await.unwrap();
    assert!(["r1", "r2", "r3"].contains(&state.track_id.as_str()));
}

#[tokio::test]
async fn test_skip_advances_and_finalizes_once() {
    let temp = TempDir::new().unwrap();
    let station = build_station(&temp.path().join("station.db"), None);

    let mut trial = track("trial-song", "artist", 300);
    trial.trial_plays_allowed = 10;
    station.store.insert_track(&trial).unwrap();

    station.scheduler.transition().await.unwrap();
    station.scheduler.report_play("trial-song", true).await.unwrap();

    // Skipped play finalized exactly once.
    let loaded = station.store.get_track("trial-song").unwrap().unwrap();
    assert_eq!(loaded.play_count, 1);
    // The station moved on to a new play of the only candidate.
    assert_eq!(loaded.trial_plays_used, 2);
    assert!(station.scheduler.current_track().unwrap().is_some());
}

#[tokio::test]
async fn test_cache_outage_degrades_but_station_keeps_playing() {
    let temp = TempDir::new().unwrap();
    let station = build_station(&temp.path().join("station.db"), None);
    seed_admin_fallback(&station.store, &["house-mix", "late-set"]);

    let before = station.scheduler.transition().await.unwrap();

    // Total cache outage: reads reconstruct durably, transitions continue.
    station.cache.set_down(true);

    let reconstructed = station.scheduler.current_track().unwrap().unwrap();
    assert_eq!(reconstructed.track_id, before.track_id);
    assert_eq!(reconstructed.duration_ms, 120_000);

    let next = station.scheduler.transition().await.unwrap();
    assert!(["house-mix", "late-set"].contains(&next.track_id.as_str()));

    // Listener counting is disabled, not broken.
    assert_eq!(station.listeners.increment(), 0);
    assert_eq!(station.listeners.current(), 0);

    // Recovery: cache-backed paths resume.
    station.cache.set_down(false);
    assert_eq!(station.listeners.increment(), 1);
    station.scheduler.transition().await.unwrap();
}

#[tokio::test]
async fn test_restart_recovers_playback_and_cursor_position() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("station.db");

    let playing_before;
    {
        let station = build_station(&db_path, None);
        seed_admin_fallback(&station.store, &["f1", "f2", "f3"]);
        // A few fallback transitions move the cursor and checkpoint it.
        for _ in 0..3 {
            station.scheduler.transition().await.unwrap();
        }
        playing_before = station.scheduler.current_track().unwrap().unwrap();
    }

    // "Restart": same durable file, empty cache.
    let station = build_station(&db_path, None);

    // The in-flight track survives via the durable now-playing row.
    let resumed = station.scheduler.current_track().unwrap().unwrap();
    assert_eq!(resumed.track_id, playing_before.track_id);
    assert_eq!(resumed.started_at_ms, playing_before.started_at_ms);

    // The fallback playlist continues instead of starting over: the full
    // lap after restart still covers every track exactly once per lap.
    let mut seen = Vec::new();
    for _ in 0..3 {
        let state = station.scheduler.transition().await.unwrap();
        seen.push(state.track_id);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3, "a lap after recovery covers the whole playlist");
}

#[tokio::test]
async fn test_checkpoint_batches_durable_position_writes() {
    let temp = TempDir::new().unwrap();
    let station = build_station(&temp.path().join("station.db"), None);
    seed_admin_fallback(&station.store, &["f1", "f2", "f3", "f4"]);

    // The first transition builds the cursor and writes the full stack.
    station.scheduler.transition().await.unwrap();
    let initial = station
        .store
        .get_playlist_state("main")
        .unwrap()
        .unwrap();

    // The next few advances move only the cache-backed position.
    station.scheduler.transition().await.unwrap();
    station.scheduler.transition().await.unwrap();
    let durable = station.store.get_playlist_state("main").unwrap().unwrap();
    assert_eq!(durable.fallback_position, initial.fallback_position);

    // Enough transitions to cross the interval force a durable sync.
    for _ in 0..4 {
        station.scheduler.transition().await.unwrap();
    }
    let synced = station.store.get_playlist_state("main").unwrap().unwrap();
    assert_ne!(synced.fallback_position, initial.fallback_position);
}

#[tokio::test]
async fn test_decision_log_captures_context() {
    let temp = TempDir::new().unwrap();
    let station = build_station(&temp.path().join("station.db"), None);

    station
        .store
        .insert_track(&track("paid-song", "artist", 100))
        .unwrap();
    station.store.set_credit_balance("artist", 1000).unwrap();

    // A dozen connected listeners put the station in the "normal" tier.
    for _ in 0..12 {
        station.listeners.increment();
    }

    station.scheduler.transition().await.unwrap();

    let decision = &station.store.recent_selections("main", 1).unwrap()[0];
    assert_eq!(decision.reason, SelectionReason::CreditFunded);
    assert_eq!(decision.listener_count, 12);
    assert_eq!(decision.tier.as_deref(), Some("normal"));
    assert_eq!(decision.candidate_count, 1);
    assert!(decision.weight_score > 0.0);
    assert!(decision.shuffle_seed.is_some());
}

#[tokio::test]
async fn test_clear_then_start_cycles_through_idle() {
    let temp = TempDir::new().unwrap();
    let station = build_station(&temp.path().join("station.db"), Some("filler"));

    station.scheduler.transition().await.unwrap();
    station.scheduler.clear_station().await.unwrap();
    assert!(station.scheduler.current_track().unwrap().is_none());

    // Start again from Idle.
    let state = station.scheduler.transition().await.unwrap();
    assert_eq!(state.track_id, "filler");
}

#[tokio::test]
async fn test_loop_serves_commands_from_the_handle() {
    let temp = TempDir::new().unwrap();
    let mut station = build_station(&temp.path().join("station.db"), Some("filler"));
    seed_admin_fallback(&station.store, &["house-mix"]);

    let rx = station.command_rx.take().unwrap();
    let shutdown = tokio_util::sync::CancellationToken::new();
    let loop_task = tokio::spawn(Arc::clone(&station.scheduler).run(rx, shutdown.clone()));

    station.handle.start().await.unwrap();
    let playing = station.handle.current_track().unwrap().unwrap();
    assert_eq!(playing.track_id, "house-mix");

    // Skip through the handle, then clear back to idle.
    station.handle.report_play("house-mix", true).await.unwrap();
    assert!(station.handle.current_track().unwrap().is_some());

    station.handle.clear_queue().await.unwrap();
    assert!(station.handle.current_track().unwrap().is_none());

    shutdown.cancel();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), loop_task).await;
}

#[tokio::test]
async fn test_same_cache_shared_across_processes_sees_same_state() {
    // Two "processes" over the same durable file and the same cache: one
    // writes transitions, the other reads.
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("station.db");

    let store = Arc::new(SqliteStationStore::new(&db_path).unwrap());
    let cache = Arc::new(OutageCache::new(Arc::new(MemoryCache::new())));
    let writer = build_station_with_cache(store.clone(), cache.clone(), Some("filler"));

    let reader_store = Arc::new(SqliteStationStore::new(&db_path).unwrap());
    let reader = build_station_with_cache(reader_store, cache, Some("filler"));

    let written = writer.scheduler.transition().await.unwrap();
    let read = reader.scheduler.current_track().unwrap().unwrap();
    assert_eq!(read, written);
}
