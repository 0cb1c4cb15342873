//! HTTP surface.
//!
//! Thin pass-throughs to the scheduler contract plus listener
//! connect/disconnect reporting and health. No business logic lives here.

pub mod metrics;
mod state;

pub use state::ServerState;

use crate::scheduler::{SchedulerError, SchedulerHandle};
use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use state::GuardedListenerCounter;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub metrics_port: u16,
    /// Shared secret for privileged routes. `None` disables them.
    pub admin_token: Option<String>,
}

fn scheduler_error_response(e: SchedulerError) -> Response {
    error!("Request failed: {e}");
    let status = if e.is_fatal() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, e.to_string()).into_response()
}

fn require_admin(config: &ServerConfig, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = config.admin_token.as_deref() else {
        return Err(StatusCode::FORBIDDEN.into_response());
    };
    let provided = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided == expected {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN.into_response())
    }
}

// =============================================================================
// Station routes
// =============================================================================

async fn get_current_track(State(scheduler): State<SchedulerHandle>) -> Response {
    match scheduler.current_track() {
        Ok(state) => Json(state).into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

#[derive(Serialize)]
struct NextPreviewResponse {
    track_id: String,
    artist_id: String,
    title: String,
    reason: &'static str,
}

async fn get_next_track(State(scheduler): State<SchedulerHandle>) -> Response {
    let preview = scheduler.next_preview().map(|p| NextPreviewResponse {
        track_id: p.track.id,
        artist_id: p.track.artist_id,
        title: p.track.title,
        reason: p.reason.as_str(),
    });
    Json(preview).into_response()
}

#[derive(Deserialize)]
struct QueueParams {
    #[serde(default = "default_queue_limit")]
    limit: usize,
}

fn default_queue_limit() -> usize {
    20
}

#[derive(Serialize)]
struct QueueEntry {
    track_id: String,
    reason: &'static str,
}

async fn get_upcoming_queue(
    State(scheduler): State<SchedulerHandle>,
    Query(params): Query<QueueParams>,
) -> Response {
    let queue: Vec<QueueEntry> = scheduler
        .upcoming_queue(params.limit.min(200))
        .into_iter()
        .map(|(track_id, reason)| QueueEntry {
            track_id,
            reason: reason.as_str(),
        })
        .collect();
    Json(queue).into_response()
}

#[derive(Deserialize)]
struct ReportPlayRequest {
    track_id: String,
    #[serde(default)]
    was_skipped: bool,
}

async fn post_report_play(
    State(scheduler): State<SchedulerHandle>,
    Json(request): Json<ReportPlayRequest>,
) -> Response {
    match scheduler
        .report_play(&request.track_id, request.was_skipped)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

async fn get_selection_history(
    State(scheduler): State<SchedulerHandle>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match scheduler.recent_decisions(params.limit.min(500)) {
        Ok(decisions) => Json(decisions).into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

async fn post_start(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state.config, &headers) {
        return response;
    }
    match state.scheduler.start().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

async fn post_clear_queue(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state.config, &headers) {
        return response;
    }
    match state.scheduler.clear_queue().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => scheduler_error_response(e),
    }
}

// =============================================================================
// Listener routes
// =============================================================================

#[derive(Serialize)]
struct ListenerCountResponse {
    listeners: u64,
}

async fn post_listener_connect(State(listeners): State<GuardedListenerCounter>) -> Response {
    Json(ListenerCountResponse {
        listeners: listeners.increment(),
    })
    .into_response()
}

async fn post_listener_disconnect(State(listeners): State<GuardedListenerCounter>) -> Response {
    Json(ListenerCountResponse {
        listeners: listeners.decrement(),
    })
    .into_response()
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    phase: &'static str,
    uptime_secs: u64,
    listeners: u64,
}

async fn get_health(State(state): State<ServerState>) -> Response {
    Json(HealthResponse {
        status: "ok",
        phase: state.scheduler.phase().as_str(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        listeners: state.listeners.current(),
    })
    .into_response()
}

// =============================================================================
// Assembly
// =============================================================================

pub fn make_app(state: ServerState) -> Router {
    let station_routes: Router = Router::new()
        .route("/current", get(get_current_track))
        .route("/next", get(get_next_track))
        .route("/queue", get(get_upcoming_queue))
        .route("/history", get(get_selection_history))
        .route("/report-play", post(post_report_play))
        .route("/start", post(post_start))
        .route("/clear", post(post_clear_queue))
        .with_state(state.clone());

    let listener_routes: Router = Router::new()
        .route("/connect", post(post_listener_connect))
        .route("/disconnect", post(post_listener_disconnect))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(get_health))
        .with_state(state)
        .nest("/v1/station", station_routes)
        .nest("/v1/listeners", listener_routes)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Separate listener for Prometheus scraping.
pub async fn run_metrics_server(metrics_port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics::metrics_handler));

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port)).await?;
    info!("Metrics server listening on port {}", metrics_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
