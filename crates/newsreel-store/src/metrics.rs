//! Store metrics.

/// Metric names emitted by this crate.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "newsreel_store_requests_total";
    pub const REQUEST_LATENCY_MS: &str = "newsreel_store_request_latency_ms";
    pub const RETRIES_TOTAL: &str = "newsreel_store_retries_total";
    pub const CAS_LOST_TOTAL: &str = "newsreel_store_cas_lost_total";
}

/// Record one backend request with its outcome.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    metrics::counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        names::REQUEST_LATENCY_MS,
        "operation" => operation.to_string()
    )
    .record(latency_ms);
}

/// Record one retry attempt.
pub fn record_retry(operation: &str) {
    metrics::counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Record a lost claim race (normal skip, not an error).
pub fn record_cas_lost() {
    metrics::counter!(names::CAS_LOST_TOTAL).increment(1);
}
