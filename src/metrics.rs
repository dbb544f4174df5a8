use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // Backend metrics
    pub static ref BACKEND_QUERIES: IntCounter = register_int_counter!(
        "report_backend_queries_total",
        "Total number of time series queries issued to the backend"
    ).unwrap();

    pub static ref BACKEND_QUERY_FAILURES: IntCounter = register_int_counter!(
        "report_backend_query_failures_total",
        "Total number of failed backend queries"
    ).unwrap();

    pub static ref BACKEND_QUERY_DURATION: Histogram = register_histogram!(
        "report_backend_query_duration_seconds",
        "Backend query duration in seconds",
        vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Reshape metrics
    pub static ref SERIES_RECEIVED: IntCounter = register_int_counter!(
        "report_series_received_total",
        "Total number of time series returned by the backend"
    ).unwrap();

    pub static ref POINTS: IntCounterVec = register_int_counter_vec!(
        "report_points_total",
        "Points seen while reshaping, by outcome",
        &["outcome"]
    ).unwrap();

    // Output metrics
    pub static ref FILES_WRITTEN: IntCounter = register_int_counter!(
        "report_files_written_total",
        "Total number of output files written"
    ).unwrap();
}

/// Observes backend query latency when dropped.
pub struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    pub fn new() -> Self {
        BACKEND_QUERIES.inc();
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for QueryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        BACKEND_QUERY_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_query_failure() {
    BACKEND_QUERY_FAILURES.inc();
}

pub fn record_series(count: usize) {
    SERIES_RECEIVED.inc_by(count as u64);
}

pub fn record_points(retained: usize, dropped: usize) {
    POINTS.with_label_values(&["retained"]).inc_by(retained as u64);
    POINTS.with_label_values(&["dropped"]).inc_by(dropped as u64);
}

pub fn record_file_written() {
    FILES_WRITTEN.inc();
}

/// Current state of the default registry in text exposition format.
pub fn render_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return format!("# failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
