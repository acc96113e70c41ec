use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // Query metrics
    pub static ref QUERIES_TOTAL: IntCounter = register_int_counter!(
        "datasource_queries_total",
        "Total number of queries received"
    ).unwrap();

    pub static ref QUERY_FAILURES: IntCounterVec = register_int_counter_vec!(
        "datasource_query_failures_total",
        "Total number of failed queries by error kind",
        &["kind"]
    ).unwrap();

    pub static ref FRAMES_TOTAL: IntCounter = register_int_counter!(
        "datasource_frames_total",
        "Total number of frames returned"
    ).unwrap();

    // Backend metrics
    pub static ref BACKEND_REQUEST_DURATION: Histogram = register_histogram!(
        "datasource_backend_request_duration_seconds",
        "Backend request duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref HEALTH_CHECKS: IntCounterVec = register_int_counter_vec!(
        "datasource_health_checks_total",
        "Total number of health checks by outcome",
        &["status"]
    ).unwrap();
}

pub fn init_metrics() {
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&QUERY_FAILURES);
    lazy_static::initialize(&FRAMES_TOTAL);
    lazy_static::initialize(&BACKEND_REQUEST_DURATION);
    lazy_static::initialize(&HEALTH_CHECKS);
}

/// Observes the lifetime of one backend call.
pub struct BackendTimer {
    start: Instant,
}

impl BackendTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for BackendTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackendTimer {
    fn drop(&mut self) {
        BACKEND_REQUEST_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_query() {
    QUERIES_TOTAL.inc();
}

pub fn record_query_failure(kind: &str) {
    QUERY_FAILURES.with_label_values(&[kind]).inc();
}

pub fn record_frames(count: usize) {
    FRAMES_TOTAL.inc_by(count as u64);
}

pub fn record_health_check(ok: bool) {
    HEALTH_CHECKS
        .with_label_values(&[if ok { "ok" } else { "error" }])
        .inc();
}

/// Renders the default registry in the Prometheus text format.
pub fn gather() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
