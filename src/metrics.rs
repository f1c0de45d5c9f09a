use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref REQUEST_COUNTER: IntCounterVec = register_int_counter_vec_with_registry!(
        "http_requests_total",
        "Total number of HTTP requests received",
        &["endpoint"],
        REGISTRY
    ).unwrap();

    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["endpoint"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
        REGISTRY
    ).unwrap();

    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "graphql_query_duration_seconds",
        "Round trip time of backend GraphQL queries",
        &["operation"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0],
        REGISTRY
    ).unwrap();

    pub static ref PROJECTED_ROWS: IntCounterVec = register_int_counter_vec_with_registry!(
        "projected_rows_total",
        "Result rows fed through projection",
        &["operation"],
        REGISTRY
    ).unwrap();
}

/// Times an HTTP request from construction until drop.
pub struct RequestTimer {
    endpoint: &'static str,
    start: Instant,
}

impl RequestTimer {
    pub fn new(endpoint: &'static str) -> Self {
        REQUEST_COUNTER.with_label_values(&[endpoint]).inc();
        Self {
            endpoint,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        REQUEST_DURATION
            .with_label_values(&[self.endpoint])
            .observe(duration);
    }
}

/// Observes the query round trip when the returned timer drops.
pub fn start_query_timer(operation: &str) -> prometheus::HistogramTimer {
    QUERY_DURATION.with_label_values(&[operation]).start_timer()
}

pub fn record_projected_rows(operation: &str, rows: usize) {
    PROJECTED_ROWS
        .with_label_values(&[operation])
        .inc_by(rows as u64);
}

/// Text exposition of every registered metric.
pub fn gather() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
