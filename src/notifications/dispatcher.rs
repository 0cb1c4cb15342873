//! Notification dispatch with debounce and spam controls.
//!
//! The scheduler announces "up next" ahead of a transition and "now live"
//! at the moment of it, plus an artist-facing signal when a play finalizes.
//! Delivery transport is behind [`NotificationSink`]; this layer owns the
//! scheduling semantics: up-next tasks are debounced with cancel-on-replace
//! per artist, and artist-facing messages respect a per-artist cooldown and
//! a daily cap.

use crate::station_store::TrackRow;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A notification leaving the station core.
#[derive(Debug, Clone, PartialEq)]
pub enum StationNotification {
    UpNext {
        artist_id: String,
        track_id: String,
        title: String,
        seconds_until_play: u64,
    },
    NowLive {
        artist_id: String,
        track_id: String,
        title: String,
    },
    SongWasPlayed {
        artist_id: String,
        track_id: String,
        title: String,
    },
}

/// Delivery transport. Implementations own retries and fan-out; failures
/// must be swallowed and logged there, never bubbled into the scheduler.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: StationNotification);
}

/// Sink that just logs. The default for deployments without a push channel.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, notification: StationNotification) {
        info!("Notification: {:?}", notification);
    }
}

/// Scheduler-facing dispatch contract.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Announce that a track will play soon. Debounced: a later call for
    /// the same artist cancels an earlier pending one.
    async fn schedule_up_next(&self, track: &TrackRow, seconds_until_play: u64);

    /// Announce the track now on air.
    async fn announce_live(&self, track: &TrackRow);

    /// Tell an artist their song just played (finalize time).
    async fn notify_artist_played(&self, artist_id: &str, track: &TrackRow);
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long an up-next announcement is held before delivery; a
    /// replacement within this window cancels it.
    pub up_next_debounce: Duration,
    /// Minimum spacing between artist-facing notifications per artist.
    pub artist_cooldown: Duration,
    /// Maximum artist-facing notifications per artist per UTC day.
    pub artist_daily_cap: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            up_next_debounce: Duration::from_secs(2),
            artist_cooldown: Duration::from_secs(30 * 60),
            artist_daily_cap: 10,
        }
    }
}

#[derive(Debug, Clone)]
struct ArtistBudget {
    last_sent: Instant,
    day: NaiveDate,
    sent_today: u32,
}

pub struct DebouncedDispatcher {
    sink: Arc<dyn NotificationSink>,
    config: DispatcherConfig,
    pending_up_next: Mutex<HashMap<String, JoinHandle<()>>>,
    budgets: Arc<Mutex<HashMap<String, ArtistBudget>>>,
}

impl DebouncedDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>, config: DispatcherConfig) -> Self {
        Self {
            sink,
            config,
            pending_up_next: Mutex::new(HashMap::new()),
            budgets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check and consume one unit of the artist's notification budget.
    fn budget_allows(
        budgets: &Mutex<HashMap<String, ArtistBudget>>,
        config: &DispatcherConfig,
        artist_id: &str,
    ) -> bool {
        let mut budgets = budgets.lock().unwrap();
        let now = Instant::now();
        let today = Utc::now().date_naive();

        match budgets.get_mut(artist_id) {
            Some(budget) => {
                if budget.day != today {
                    budget.day = today;
                    budget.sent_today = 0;
                }
                if budget.sent_today >= config.artist_daily_cap {
                    debug!("Daily notification cap reached for artist {artist_id}");
                    return false;
                }
                if now.duration_since(budget.last_sent) < config.artist_cooldown {
                    debug!("Notification cooldown active for artist {artist_id}");
                    return false;
                }
                budget.last_sent = now;
                budget.sent_today += 1;
                true
            }
            None => {
                budgets.insert(
                    artist_id.to_string(),
                    ArtistBudget {
                        last_sent: now,
                        day: today,
                        sent_today: 1,
                    },
                );
                true
            }
        }
    }
}

#[async_trait]
impl NotificationDispatcher for DebouncedDispatcher {
    async fn schedule_up_next(&self, track: &TrackRow, seconds_until_play: u64) {
        let notification = StationNotification::UpNext {
            artist_id: track.artist_id.clone(),
            track_id: track.id.clone(),
            title: track.title.clone(),
            seconds_until_play,
        };

        let sink = Arc::clone(&self.sink);
        let budgets = Arc::clone(&self.budgets);
        let config = self.config.clone();
        let artist_id = track.artist_id.clone();
        let debounce = self.config.up_next_debounce;

        let mut pending = self.pending_up_next.lock().unwrap();
        // Cancel-on-replace: a newer announcement for this artist supersedes
        // any still-pending one.
        if let Some(previous) = pending.remove(&artist_id) {
            previous.abort();
        }
        let artist_for_task = artist_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if Self::budget_allows(&budgets, &config, &artist_for_task) {
                sink.deliver(notification);
            }
        });
        pending.insert(artist_id, handle);
    }

    async fn announce_live(&self, track: &TrackRow) {
        // Listener-facing: no artist budget applies.
        self.sink.deliver(StationNotification::NowLive {
            artist_id: track.artist_id.clone(),
            track_id: track.id.clone(),
            title: track.title.clone(),
        });
    }

    async fn notify_artist_played(&self, artist_id: &str, track: &TrackRow) {
        if Self::budget_allows(&self.budgets, &self.config, artist_id) {
            self.sink.deliver(StationNotification::SongWasPlayed {
                artist_id: artist_id.to_string(),
                track_id: track.id.clone(),
                title: track.title.clone(),
            });
        }
    }
}
