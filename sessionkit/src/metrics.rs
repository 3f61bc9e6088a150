use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "session_query_duration_seconds",
        "Session query duration in seconds",
        &["operation", "status"]
    ).unwrap();

    pub static ref CONNECT_DURATION: HistogramVec = register_histogram_vec!(
        "session_connect_duration_seconds",
        "Time spent opening a driver session",
        &["status"]
    ).unwrap();

    pub static ref PROBE_COUNTER: IntCounterVec = register_int_counter_vec!(
        "session_probe_total",
        "Liveness probes by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref RECONNECT_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "session_reconnect_attempts_total",
        "Reconnection attempts made by supervisors",
        &["status"]
    ).unwrap();

    pub static ref HANDLE_SWAPS: IntCounter = register_int_counter!(
        "session_handle_swaps_total",
        "Connection handles replaced after a failed probe"
    ).unwrap();

    pub static ref SUPERVISOR_EXITS: IntCounterVec = register_int_counter_vec!(
        "session_supervisor_exits_total",
        "Supervisor terminations by reason",
        &["reason"]
    ).unwrap();
}

fn status(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

pub fn record_query(operation: &str, success: bool, duration: f64) {
    QUERY_DURATION
        .with_label_values(&[operation, status(success)])
        .observe(duration);
}

pub fn record_connect(success: bool, duration: f64) {
    CONNECT_DURATION
        .with_label_values(&[status(success)])
        .observe(duration);
}

pub fn record_probe(outcome: &str) {
    PROBE_COUNTER.with_label_values(&[outcome]).inc();
}

pub fn record_reconnect(success: bool) {
    RECONNECT_ATTEMPTS.with_label_values(&[status(success)]).inc();
}

pub fn record_supervisor_exit(reason: &str) {
    SUPERVISOR_EXITS.with_label_values(&[reason]).inc();
}
