use super::collaborators::{CreditLedger, ReactionContext};
use super::credits::credits_required;
use super::selection::{NextPreview, Selection, Selector};
use super::SchedulerError;
use crate::notifications::NotificationDispatcher;
use crate::playback::{
    CurrentPlayInfo, ListenerCounter, PlaybackState, PlaybackStateStore,
    DEFAULT_TRACK_DURATION_SECS,
};
use crate::server::metrics;
use crate::station_store::{SelectionDecision, SelectionReason, StationStore};
use chrono::Utc;
use rand::Rng;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle of a transition, surfaced for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationPhase {
    /// No playback state present (startup or explicit clear).
    Idle,
    Selecting,
    Playing,
    Finalizing,
}

impl StationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationPhase::Idle => "idle",
            StationPhase::Selecting => "selecting",
            StationPhase::Playing => "playing",
            StationPhase::Finalizing => "finalizing",
        }
    }
}

/// Commands the HTTP surface sends into the scheduler loop.
pub enum SchedulerCommand {
    /// Kick a station out of Idle (startup or after a clear).
    Start {
        respond: oneshot::Sender<Result<(), SchedulerError>>,
    },
    ReportPlay {
        track_id: String,
        was_skipped: bool,
        respond: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Privileged reset: drop all queued state and go Idle.
    ClearQueue {
        respond: oneshot::Sender<Result<(), SchedulerError>>,
    },
}

pub struct StationScheduler {
    state_store: Arc<PlaybackStateStore>,
    selector: Selector,
    store: Arc<dyn StationStore>,
    ledger: Arc<dyn CreditLedger>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    reactions: Arc<dyn ReactionContext>,
    listeners: Arc<ListenerCounter>,
    station_id: String,
    /// Subtracted from the natural end when deciding "still playing".
    buffer: Duration,
    phase: Mutex<StationPhase>,
    /// started_at_ms of the play an up-next announcement went out for.
    up_next_sent_for: Mutex<Option<i64>>,
}

impl StationScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state_store: Arc<PlaybackStateStore>,
        selector: Selector,
        store: Arc<dyn StationStore>,
        ledger: Arc<dyn CreditLedger>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        reactions: Arc<dyn ReactionContext>,
        listeners: Arc<ListenerCounter>,
        station_id: impl Into<String>,
        buffer: Duration,
    ) -> Self {
        Self {
            state_store,
            selector,
            store,
            ledger,
            dispatcher,
            reactions,
            listeners,
            station_id: station_id.into(),
            buffer,
            phase: Mutex::new(StationPhase::Idle),
            up_next_sent_for: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> StationPhase {
        *self.phase.lock().unwrap()
    }

    fn set_phase(&self, phase: StationPhase) {
        *self.phase.lock().unwrap() = phase;
    }

    // =========================================================================
    // Read paths (never block on the transition loop)
    // =========================================================================

    pub fn current_track(&self) -> Result<Option<PlaybackState>, SchedulerError> {
        Ok(self.state_store.get_current()?)
    }

    pub fn next_preview(&self) -> Option<NextPreview> {
        let listener_count = self.listeners.current();
        let seed: u64 = rand::rng().random();
        self.selector.preview_next(listener_count, seed)
    }

    pub fn upcoming_queue(&self, limit: usize) -> Vec<(String, SelectionReason)> {
        self.selector.upcoming_queue(limit)
    }

    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<SelectionDecision>, SchedulerError> {
        Ok(self.store.recent_selections(&self.station_id, limit)?)
    }

    // =========================================================================
    // Transition
    // =========================================================================

    /// Run one full transition: finalize the previous play, select and fund
    /// a candidate, write the new state, log the decision, and notify.
    pub async fn transition(&self) -> Result<PlaybackState, SchedulerError> {
        self.set_phase(StationPhase::Finalizing);
        self.finalize_current_play().await;

        self.set_phase(StationPhase::Selecting);
        let selection_started = Instant::now();
        let listener_count = self.listeners.current();
        let seed: u64 = rand::rng().random();
        let play_id = Uuid::new_v4().to_string();

        let selection = self.select_funded(listener_count, seed, &play_id).await?;

        let now = Utc::now();
        let duration_secs = selection
            .track
            .duration_secs
            .unwrap_or(DEFAULT_TRACK_DURATION_SECS)
            .max(1) as u64;

        let state = PlaybackState {
            track_id: selection.track.id.clone(),
            started_at_ms: now.timestamp_millis(),
            duration_ms: duration_secs * 1000,
            priority_score: selection.weight_score,
            is_fallback_content: matches!(
                selection.reason,
                SelectionReason::AdminFallback | SelectionReason::GenericFallback
            ),
            is_admin_curated_fallback: selection.reason == SelectionReason::AdminFallback,
            played_at: now.to_rfc3339(),
        };

        // The authoritative write: its failure means playback state cannot
        // be guaranteed anywhere, so it surfaces.
        self.state_store.set_current(&state)?;

        // Audit bookkeeping never blocks playback.
        let decision = SelectionDecision {
            id: 0,
            station_id: self.station_id.clone(),
            track_id: selection.track.id.clone(),
            selected_at: now,
            reason: selection.reason,
            tier: selection.tier.clone(),
            listener_count: listener_count as i64,
            weight_score: selection.weight_score,
            candidate_count: selection.candidate_count as i64,
            shuffle_seed: Some(selection.shuffle_seed as i64),
        };
        if let Err(e) = self.store.append_selection(&decision) {
            warn!("Decision log append failed (playback continues): {e}");
        }

        if selection.reason.is_attributable() {
            let info = CurrentPlayInfo {
                play_id,
                artist_id: selection.track.artist_id.clone(),
                started_at: now.to_rfc3339(),
            };
            if let Err(e) = self.state_store.set_current_play(&info) {
                warn!("Current play info write failed: {e}");
            }
        }

        if let Err(e) = self.reactions.set_current_track(&selection.track.id) {
            warn!("Reaction context update failed: {e}");
        }
        self.dispatcher.announce_live(&selection.track).await;

        *self.up_next_sent_for.lock().unwrap() = None;
        metrics::record_transition(selection.reason.as_str());
        metrics::observe_selection_duration(selection_started.elapsed());

        info!(
            track_id = %selection.track.id,
            reason = selection.reason.as_str(),
            listeners = listener_count,
            "Now playing"
        );

        self.set_phase(StationPhase::Playing);
        Ok(state)
    }

    /// Selection plus the funding step for the top tiers. A failed or
    /// refused debit falls through to the tier below instead of crashing.
    async fn select_funded(
        &self,
        listener_count: u64,
        seed: u64,
        play_id: &str,
    ) -> Result<Selection, SchedulerError> {
        let mut allow_paid = true;
        let mut allow_trial = true;
        loop {
            let selection = self
                .selector
                .select_next(listener_count, seed, allow_paid, allow_trial)?;

            match selection.reason {
                SelectionReason::CreditFunded => {
                    let duration = selection
                        .track
                        .duration_secs
                        .unwrap_or(DEFAULT_TRACK_DURATION_SECS)
                        .max(1) as u64;
                    let units = credits_required(duration) as i64;
                    match self.ledger.debit(
                        &selection.track.artist_id,
                        &selection.track.id,
                        play_id,
                        units,
                    ) {
                        Ok(outcome) if outcome.success => {
                            debug!(
                                track_id = %selection.track.id,
                                units,
                                balance_after = outcome.balance_after,
                                "Debited credits for paid play"
                            );
                            return Ok(selection);
                        }
                        Ok(_) => {
                            warn!(
                                track_id = %selection.track.id,
                                "Debit refused (insufficient balance), falling to next tier"
                            );
                            allow_paid = false;
                        }
                        Err(e) => {
                            warn!("Ledger debit failed, falling to next tier: {e}");
                            allow_paid = false;
                        }
                    }
                }
                SelectionReason::Trial => {
                    match self.store.increment_trial_used(&selection.track.id) {
                        Ok(()) => return Ok(selection),
                        Err(e) => {
                            warn!("Trial allowance update failed, falling to next tier: {e}");
                            allow_trial = false;
                        }
                    }
                }
                _ => return Ok(selection),
            }
        }
    }

    /// Close out the in-flight attributable play exactly once: bump the
    /// play counter and send the artist-facing signal.
    async fn finalize_current_play(&self) {
        let Some(info) = self.state_store.take_current_play() else {
            return;
        };

        // The play being closed is the record about to be superseded.
        let track = self
            .state_store
            .get_current()
            .ok()
            .flatten()
            .and_then(|state| self.store.get_track(&state.track_id).ok().flatten());

        let Some(track) = track else {
            debug!(play_id = %info.play_id, "No current track to finalize against");
            return;
        };

        if let Err(e) = self.store.increment_play_count(&track.id) {
            warn!("Play count update failed: {e}");
        }
        self.dispatcher
            .notify_artist_played(&info.artist_id, &track)
            .await;
        debug!(play_id = %info.play_id, track_id = %track.id, "Finalized play");
    }

    /// External report that a track finished or was skipped.
    ///
    /// Finalizes any pending play info exactly once; a skip does not
    /// re-charge credits (debits are keyed by play id at selection time).
    pub async fn report_play(
        &self,
        track_id: &str,
        was_skipped: bool,
    ) -> Result<(), SchedulerError> {
        if let Err(e) = self
            .store
            .record_play_report(&self.station_id, track_id, was_skipped)
        {
            warn!("Play report persist failed: {e}");
        }
        metrics::record_play_report(if was_skipped { "skipped" } else { "completed" });

        let is_current = self
            .current_track()?
            .map(|state| state.track_id == track_id)
            .unwrap_or(false);

        self.finalize_current_play().await;

        if is_current {
            self.transition().await?;
        }
        Ok(())
    }

    /// Privileged reset: finalize, drop queued state, clear playback. The
    /// station sits in Idle until a Start command.
    pub async fn clear_station(&self) -> Result<(), SchedulerError> {
        self.finalize_current_play().await;
        self.selector.clear_queues();
        self.state_store.clear_current()?;
        self.state_store.clear_current_play();
        self.set_phase(StationPhase::Idle);
        info!("Station queue cleared, now idle");
        Ok(())
    }

    // =========================================================================
    // Transition loop
    // =========================================================================

    /// Drive transitions until shutdown. At most one process runs this loop
    /// per station; concurrent writers would race last-writer-wins (a
    /// leader lease around this loop is the extension point for
    /// multi-instance deployments).
    pub async fn run(
        self: Arc<Self>,
        mut commands: mpsc::Receiver<SchedulerCommand>,
        shutdown: CancellationToken,
    ) {
        info!(station_id = %self.station_id, "Station scheduler loop started");

        loop {
            let sleep_duration = match self.drive_due_work().await {
                Ok(duration) => duration,
                Err(e) if e.is_fatal() => {
                    error!("Scheduler stopping: {e}");
                    break;
                }
                Err(e) => {
                    error!("Transition failed, retrying shortly: {e}");
                    Duration::from_secs(5)
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(sleep_duration) => {}
                Some(cmd) = commands.recv() => {
                    if self.handle_command(cmd).await.is_break() {
                        break;
                    }
                }
            }
        }

        info!("Station scheduler loop stopped");
    }

    /// Perform whatever is due right now and return how long to sleep.
    async fn drive_due_work(&self) -> Result<Duration, SchedulerError> {
        let Some(state) = self.current_track()? else {
            self.set_phase(StationPhase::Idle);
            // Idle: nothing to do until a command arrives.
            return Ok(Duration::from_secs(3600));
        };
        // Covers the restart-resume path, where no transition set the phase.
        self.set_phase(StationPhase::Playing);

        let now_ms = Utc::now().timestamp_millis();
        let transition_at = state.scheduled_end_ms(self.buffer);
        // Up-next goes out one buffer period ahead of the transition point.
        let up_next_at = transition_at - self.buffer.as_millis() as i64;

        if now_ms >= transition_at {
            self.transition().await?;
            return Ok(Duration::from_millis(0));
        }

        if now_ms >= up_next_at {
            self.maybe_send_up_next(&state).await;
            return Ok(Duration::from_millis(
                (transition_at - now_ms).max(1) as u64
            ));
        }

        Ok(Duration::from_millis((up_next_at - now_ms).max(1) as u64))
    }

    async fn maybe_send_up_next(&self, state: &PlaybackState) {
        {
            let mut sent = self.up_next_sent_for.lock().unwrap();
            if *sent == Some(state.started_at_ms) {
                return;
            }
            *sent = Some(state.started_at_ms);
        }

        let listener_count = self.listeners.current();
        let seed: u64 = rand::rng().random();
        if let Some(preview) = self.selector.preview_next(listener_count, seed) {
            let now_ms = Utc::now().timestamp_millis();
            let seconds_until =
                ((state.scheduled_end_ms(self.buffer) - now_ms).max(0) / 1000) as u64;
            self.dispatcher
                .schedule_up_next(&preview.track, seconds_until)
                .await;
        }
    }

    async fn handle_command(&self, cmd: SchedulerCommand) -> ControlFlow<()> {
        match cmd {
            SchedulerCommand::Start { respond } => {
                let result = if self.current_track().ok().flatten().is_none() {
                    self.transition().await.map(|_| ())
                } else {
                    Ok(())
                };
                let fatal = result.as_ref().err().map(|e| e.is_fatal()).unwrap_or(false);
                let _ = respond.send(result);
                if fatal {
                    error!("Scheduler stopping: no eligible candidate on start");
                    return ControlFlow::Break(());
                }
            }
            SchedulerCommand::ReportPlay {
                track_id,
                was_skipped,
                respond,
            } => {
                let result = self.report_play(&track_id, was_skipped).await;
                let fatal = result.as_ref().err().map(|e| e.is_fatal()).unwrap_or(false);
                let _ = respond.send(result);
                if fatal {
                    error!("Scheduler stopping: no eligible candidate after report");
                    return ControlFlow::Break(());
                }
            }
            SchedulerCommand::ClearQueue { respond } => {
                let _ = respond.send(self.clear_station().await);
            }
        }
        ControlFlow::Continue(())
    }
}

/// Cloneable handle pairing direct read access with loop-routed writes.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
    scheduler: Arc<StationScheduler>,
}

impl SchedulerHandle {
    pub fn current_track(&self) -> Result<Option<PlaybackState>, SchedulerError> {
        self.scheduler.current_track()
    }

    pub fn next_preview(&self) -> Option<NextPreview> {
        self.scheduler.next_preview()
    }

    pub fn upcoming_queue(&self, limit: usize) -> Vec<(String, SelectionReason)> {
        self.scheduler.upcoming_queue(limit)
    }

    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<SelectionDecision>, SchedulerError> {
        self.scheduler.recent_decisions(limit)
    }

    pub fn phase(&self) -> StationPhase {
        self.scheduler.phase()
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        let (respond, rx) = oneshot::channel();
        self.send(SchedulerCommand::Start { respond }, rx).await
    }

    pub async fn report_play(
        &self,
        track_id: &str,
        was_skipped: bool,
    ) -> Result<(), SchedulerError> {
        let (respond, rx) = oneshot::channel();
        self.send(
            SchedulerCommand::ReportPlay {
                track_id: track_id.to_string(),
                was_skipped,
                respond,
            },
            rx,
        )
        .await
    }

    pub async fn clear_queue(&self) -> Result<(), SchedulerError> {
        let (respond, rx) = oneshot::channel();
        self.send(SchedulerCommand::ClearQueue { respond }, rx).await
    }

    async fn send(
        &self,
        cmd: SchedulerCommand,
        rx: oneshot::Receiver<Result<(), SchedulerError>>,
    ) -> Result<(), SchedulerError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("scheduler loop is not running"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("scheduler loop dropped the request"))?
    }
}

/// Wire up a scheduler and its handle. The receiver goes to
/// [`StationScheduler::run`].
pub fn create_scheduler(
    scheduler: StationScheduler,
) -> (
    Arc<StationScheduler>,
    SchedulerHandle,
    mpsc::Receiver<SchedulerCommand>,
) {
    let (tx, rx) = mpsc::channel(64);
    let scheduler = Arc::new(scheduler);
    let handle = SchedulerHandle {
        tx,
        scheduler: Arc::clone(&scheduler),
    };
    (scheduler, handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::notifications::{
        DebouncedDispatcher, DispatcherConfig, NotificationSink, StationNotification,
    };
    use crate::playback::{CheckpointCoordinator, CursorStore, RotationStack};
    use crate::scheduler::{
        ListenerTieredPolicy, NullReactionContext, SqliteCreditLedger, SqliteEligibilitySource,
    };
    use crate::station_store::{DebitOutcome, SqliteStationStore, TrackRow};
    use anyhow::Result as AnyResult;
    use tempfile::TempDir;

    struct RecordingSink {
        delivered: Mutex<Vec<StationNotification>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
            })
        }
        fn delivered(&self) -> Vec<StationNotification> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn deliver(&self, notification: StationNotification) {
            self.delivered.lock().unwrap().push(notification);
        }
    }

    struct FailingLedger;

    impl CreditLedger for FailingLedger {
        fn debit(&self, _: &str, _: &str, _: &str, _: i64) -> AnyResult<DebitOutcome> {
            anyhow::bail!("ledger offline")
        }
    }

    struct Fixture {
        scheduler: Arc<StationScheduler>,
        handle: SchedulerHandle,
        rx: Option<mpsc::Receiver<SchedulerCommand>>,
        store: Arc<SqliteStationStore>,
        sink: Arc<RecordingSink>,
        _temp_dir: TempDir,
    }

    fn fixture_with_ledger(ledger: Option<Arc<dyn CreditLedger>>) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStationStore::new(temp_dir.path().join("station.db")).unwrap());
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let sink = RecordingSink::new();

        let state_store = Arc::new(PlaybackStateStore::new(
            cache.clone(),
            store.clone(),
            "main",
            Duration::from_secs(600),
            Duration::from_secs(600),
        ));
        let selector = Selector::new(
            Arc::new(SqliteEligibilitySource::new(store.clone(), None)),
            Arc::new(ListenerTieredPolicy),
            RotationStack::new(cache.clone(), "main", Duration::from_secs(3600)),
            CursorStore::new(cache.clone(), "main", Duration::from_secs(86400)),
            CheckpointCoordinator::new(
                cache.clone(),
                store.clone(),
                "main",
                5,
                Duration::from_secs(86400),
            ),
            Some("filler".to_string()),
        );
        let dispatcher = Arc::new(DebouncedDispatcher::new(
            sink.clone(),
            DispatcherConfig {
                up_next_debounce: Duration::from_millis(5),
                artist_cooldown: Duration::from_millis(0),
                artist_daily_cap: 1000,
            },
        ));
        let ledger = ledger.unwrap_or_else(|| Arc::new(SqliteCreditLedger::new(store.clone())));

        let scheduler = StationScheduler::new(
            state_store,
            selector,
            store.clone(),
            ledger,
            dispatcher,
            Arc::new(NullReactionContext),
            Arc::new(ListenerCounter::new(cache.clone(), "main")),
            "main",
            Duration::from_millis(300),
        );
        let (scheduler, handle, rx) = create_scheduler(scheduler);

        Fixture {
            scheduler,
            handle,
            rx: Some(rx),
            store,
            sink,
            _temp_dir: temp_dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_ledger(None)
    }

    fn track(id: &str, artist: &str, duration: i64) -> TrackRow {
        TrackRow {
            id: id.to_string(),
            artist_id: artist.to_string(),
            title: format!("Title {}", id),
            duration_secs: Some(duration),
            rotation_opt_in: false,
            rotation_approved: false,
            is_admin_fallback: false,
            play_count: 0,
            paid_play_count: 0,
            trial_plays_allowed: 0,
            trial_plays_used: 0,
        }
    }

    #[tokio::test]
    async fn test_transition_writes_state_decision_and_debit() {
        let f = fixture();
        f.store.insert_track(&track("paid-1", "artist", 180)).unwrap();
        f.store.set_credit_balance("artist", 100).unwrap();

        let state = f.scheduler.transition().await.unwrap();
        assert_eq!(state.track_id, "paid-1");
        assert_eq!(state.duration_ms, 180_000);
        assert!(!state.is_fallback_content);

        // 180s costs 36 units.
        assert_eq!(f.store.credit_balance("artist").unwrap(), 64);

        let decisions = f.store.recent_selections("main", 10).unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].reason, SelectionReason::CreditFunded);
        assert!(decisions[0].shuffle_seed.is_some());

        // Live announcement went out.
        assert!(f
            .sink
            .delivered()
            .iter()
            .any(|n| matches!(n, StationNotification::NowLive { track_id, .. } if track_id == "paid-1")));

        assert_eq!(f.scheduler.phase(), StationPhase::Playing);
    }

    #[tokio::test]
    async fn test_ledger_failure_falls_through_to_lower_tier() {
        let f = fixture_with_ledger(Some(Arc::new(FailingLedger)));
        f.store.insert_track(&track("paid-1", "artist", 100)).unwrap();
        f.store.set_credit_balance("artist", 1000).unwrap();

        let mut trial = track("trial-1", "newcomer", 100);
        trial.trial_plays_allowed = 5;
        f.store.insert_track(&trial).unwrap();

        let state = f.scheduler.transition().await.unwrap();
        assert_eq!(state.track_id, "trial-1");

        let decisions = f.store.recent_selections("main", 1).unwrap();
        assert_eq!(decisions[0].reason, SelectionReason::Trial);
    }

    #[tokio::test]
    async fn test_trial_play_consumes_allowance() {
        let f = fixture();
        let mut trial = track("trial-1", "newcomer", 100);
        trial.trial_plays_allowed = 2;
        f.store.insert_track(&trial).unwrap();

        f.scheduler.transition().await.unwrap();
        let loaded = f.store.get_track("trial-1").unwrap().unwrap();
        assert_eq!(loaded.trial_plays_used, 1);
    }

    #[tokio::test]
    async fn test_skip_finalizes_exactly_once() {
        let f = fixture();
        let mut trial = track("trial-1", "newcomer", 100);
        trial.trial_plays_allowed = 10;
        f.store.insert_track(&trial).unwrap();

        // First transition starts an attributable play.
        f.scheduler.transition().await.unwrap();

        // Skip: finalizes (play count 1) and transitions to the next track.
        f.scheduler.report_play("trial-1", true).await.unwrap();
        let after_skip = f.store.get_track("trial-1").unwrap().unwrap();
        assert_eq!(after_skip.play_count, 1);

        // The following natural transition finalizes only the play the skip
        // started, never the skipped one a second time.
        f.scheduler.transition().await.unwrap();
        let final_counts = f.store.get_track("trial-1").unwrap().unwrap();
        assert_eq!(final_counts.play_count, 2);
    }

    #[tokio::test]
    async fn test_skip_does_not_double_charge_credits() {
        let f = fixture();
        f.store.insert_track(&track("paid-1", "artist", 100)).unwrap();
        f.store.set_credit_balance("artist", 100).unwrap();

        f.scheduler.transition().await.unwrap();
        // 100s -> 20 units.
        assert_eq!(f.store.credit_balance("artist").unwrap(), 80);

        f.scheduler.report_play("paid-1", true).await.unwrap();
        // The skip itself charged nothing beyond the next play's own debit.
        let balance = f.store.credit_balance("artist").unwrap();
        assert_eq!(balance, 60); // one more 20-unit play started, no re-charge
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_eligible() {
        let f = fixture();
        let state = f.scheduler.transition().await.unwrap();
        assert_eq!(state.track_id, "filler");
        assert!(state.is_fallback_content);
        // Missing metadata duration defaults to 180s.
        assert_eq!(state.duration_ms, 180_000);
    }

    #[tokio::test]
    async fn test_clear_station_goes_idle() {
        let f = fixture();
        f.store.insert_track(&track("paid-1", "artist", 100)).unwrap();
        f.store.set_credit_balance("artist", 100).unwrap();

        f.scheduler.transition().await.unwrap();
        assert!(f.scheduler.current_track().unwrap().is_some());

        f.scheduler.clear_station().await.unwrap();
        assert!(f.scheduler.current_track().unwrap().is_none());
        assert_eq!(f.scheduler.phase(), StationPhase::Idle);
    }

    #[tokio::test]
    async fn test_get_current_idempotent_between_transitions() {
        let f = fixture();
        f.store.insert_track(&track("paid-1", "artist", 100)).unwrap();
        f.store.set_credit_balance("artist", 100).unwrap();

        f.scheduler.transition().await.unwrap();
        let a = f.scheduler.current_track().unwrap().unwrap();
        let b = f.scheduler.current_track().unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_run_loop_transitions_and_announces_up_next() {
        let f = fixture();
        // Two short tracks so the loop has to transition naturally.
        let mut t1 = track("short-1", "artist", 1);
        t1.trial_plays_allowed = 100;
        f.store.insert_track(&t1).unwrap();
        let mut t2 = track("short-2", "artist", 1);
        t2.trial_plays_allowed = 100;
        f.store.insert_track(&t2).unwrap();

        let mut f = f;
        let rx = f.rx.take().unwrap();
        let shutdown = CancellationToken::new();
        let loop_handle = tokio::spawn(Arc::clone(&f.scheduler).run(rx, shutdown.clone()));

        // Kick out of idle, then let the loop run a couple of track lengths.
        f.handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), loop_handle).await;

        let decisions = f.store.recent_selections("main", 50).unwrap();
        assert!(
            decisions.len() >= 2,
            "expected multiple transitions, got {}",
            decisions.len()
        );

        let delivered = f.sink.delivered();
        assert!(delivered
            .iter()
            .any(|n| matches!(n, StationNotification::UpNext { .. })));
        assert!(delivered
            .iter()
            .any(|n| matches!(n, StationNotification::NowLive { .. })));
    }

    #[tokio::test]
    async fn test_no_candidate_is_fatal_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStationStore::new(temp_dir.path().join("station.db")).unwrap());
        let cache: Arc<MemoryCache> = Arc::new(MemoryCache::new());
        let sink = RecordingSink::new();

        let state_store = Arc::new(PlaybackStateStore::new(
            cache.clone(),
            store.clone(),
            "main",
            Duration::from_secs(600),
            Duration::from_secs(600),
        ));
        let selector = Selector::new(
            Arc::new(SqliteEligibilitySource::new(store.clone(), None)),
            Arc::new(ListenerTieredPolicy),
            RotationStack::new(cache.clone(), "main", Duration::from_secs(3600)),
            CursorStore::new(cache.clone(), "main", Duration::from_secs(86400)),
            CheckpointCoordinator::new(
                cache.clone(),
                store.clone(),
                "main",
                5,
                Duration::from_secs(86400),
            ),
            None, // no generic fallback configured
        );
        let dispatcher = Arc::new(DebouncedDispatcher::new(
            sink,
            DispatcherConfig::default(),
        ));

        let scheduler = StationScheduler::new(
            state_store,
            selector,
            store.clone(),
            Arc::new(SqliteCreditLedger::new(store.clone())),
            dispatcher,
            Arc::new(NullReactionContext),
            Arc::new(ListenerCounter::new(cache.clone(), "main")),
            "main",
            Duration::from_millis(300),
        );

        let err = scheduler.transition().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
