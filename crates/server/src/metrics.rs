//! Prometheus metrics for observability.
//!
//! The server owns the registry. It adds HTTP request metrics and a few
//! gauges refreshed on scrape to the counters exported by the core crate.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::error;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "issuetree_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("issuetree_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "issuetree_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Sync Engine Metrics (collected dynamically)
// =============================================================================

/// Ticket numbers that currently hold or wait on an update lock.
pub static UPDATE_LOCKS_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "issuetree_update_locks_tracked",
        "Ticket numbers with a live per-ticket update lock",
    )
    .unwrap()
});

/// Stored automation records.
pub static AUTOMATION_RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "issuetree_automation_records",
        "Tickets with a stored automation record",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let server_metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(UPDATE_LOCKS_TRACKED.clone()),
        Box::new(AUTOMATION_RECORDS.clone()),
    ];

    // Core metrics (hierarchy, enhancer, automation, tracker calls)
    for metric in server_metrics
        .into_iter()
        .chain(issuetree_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            error!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Refresh the gauges that mirror application state.
///
/// Called right before encoding on every scrape.
pub fn collect_dynamic_metrics(state: &AppState) {
    UPDATE_LOCKS_TRACKED.set(state.hierarchy().serializer().tracked() as i64);

    match state.automation().record_count() {
        Ok(count) => AUTOMATION_RECORDS.set(count as i64),
        Err(e) => error!("Failed to count automation records: {}", e),
    }
}

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (ticket and comment numbers become `{id}`).
pub fn normalize_path(path: &str) -> String {
    // Adjacent numeric segments share a slash, so one pass can miss every
    // second one.
    let once = NUMERIC_SEGMENT.replace_all(path, "/{id}$1");
    NUMERIC_SEGMENT.replace_all(&once, "/{id}$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/tickets/12345";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}");
    }

    #[test]
    fn test_normalize_path_numeric_middle() {
        let path = "/api/v1/tickets/42/automation";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}/automation");
    }

    #[test]
    fn test_normalize_path_adjacent_numbers() {
        let path = "/api/v1/tickets/4/5/6";
        assert_eq!(normalize_path(path), "/api/v1/tickets/{id}/{id}/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1/v2x"), "/api/v1/v2x");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("issuetree_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_and_server_metrics() {
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        UPDATE_LOCKS_TRACKED.set(0);
        AUTOMATION_RECORDS.set(0);
        issuetree_core::metrics::BACKLINK_WRITES
            .with_label_values(&["written"])
            .inc();

        let output = encode_metrics();

        assert!(output.contains("issuetree_http_request_duration_seconds"));
        assert!(output.contains("issuetree_http_requests_in_flight"));
        assert!(output.contains("issuetree_update_locks_tracked"));
        assert!(output.contains("issuetree_automation_records"));
        assert!(output.contains("issuetree_backlink_writes_total"));
    }
}
