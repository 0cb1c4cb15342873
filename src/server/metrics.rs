use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Airwave metrics
const PREFIX: &str = "airwave";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Transition Metrics
    pub static ref TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_transitions_total"), "Track transitions by selection reason"),
        &["reason"]
    ).expect("Failed to create transitions_total metric");

    pub static ref SELECTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_selection_duration_seconds"),
            "Time spent selecting and funding the next track"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0])
    ).expect("Failed to create selection_duration_seconds metric");

    // Listener Metrics
    pub static ref LISTENERS_CONNECTED: Gauge = Gauge::new(
        format!("{PREFIX}_listeners_connected"),
        "Currently connected listeners"
    ).expect("Failed to create listeners_connected metric");

    // Degradation Metrics
    pub static ref CACHE_OUTAGE_EVENTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_cache_outage_events_total"),
        "Cache backend calls that failed and degraded to durable-only mode"
    ).expect("Failed to create cache_outage_events_total metric");

    // Checkpoint Metrics
    pub static ref CHECKPOINT_WRITES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_checkpoint_writes_total"), "Durable checkpoint writes by kind"),
        &["kind"]
    ).expect("Failed to create checkpoint_writes_total metric");

    // Play Reporting Metrics
    pub static ref PLAY_REPORTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_play_reports_total"), "Play reports by outcome"),
        &["outcome"]
    ).expect("Failed to create play_reports_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(TRANSITIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SELECTION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(LISTENERS_CONNECTED.clone()));
    let _ = REGISTRY.register(Box::new(CACHE_OUTAGE_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CHECKPOINT_WRITES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PLAY_REPORTS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_transition(reason: &str) {
    TRANSITIONS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_selection_duration(duration: Duration) {
    SELECTION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_listener_count(count: u64) {
    LISTENERS_CONNECTED.set(count as f64);
}

pub fn record_cache_outage() {
    CACHE_OUTAGE_EVENTS_TOTAL.inc();
}

pub fn record_checkpoint(kind: &str) {
    CHECKPOINT_WRITES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_play_report(outcome: &str) {
    PLAY_REPORTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Handler for the metrics scrape endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
