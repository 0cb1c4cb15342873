use axum::extract::FromRef;

use crate::playback::ListenerCounter;
use crate::scheduler::SchedulerHandle;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedListenerCounter = Arc<ListenerCounter>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub scheduler: SchedulerHandle,
    pub listeners: GuardedListenerCounter,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for SchedulerHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler.clone()
    }
}

impl FromRef<ServerState> for GuardedListenerCounter {
    fn from_ref(input: &ServerState) -> Self {
        input.listeners.clone()
    }
}
