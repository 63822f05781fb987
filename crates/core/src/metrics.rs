//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Hierarchy synchronization (back-link writes, reference enhancement)
//! - Automation state machine (status transitions)
//! - Tracker gateway (request counts and latency)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Hierarchy Metrics
// =============================================================================

/// Back-link and child-registration writes by result.
pub static BACKLINK_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "issuetree_backlink_writes_total",
            "Parent/child back-link writes performed during fan-out",
        ),
        &["result"], // "written", "unchanged", "failed"
    )
    .unwrap()
});

/// Bare references processed by the enhancer.
pub static REFERENCES_ENHANCED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "issuetree_references_enhanced_total",
            "Bare task-list references rewritten with titled links",
        ),
        &["result"], // "enhanced", "unresolved"
    )
    .unwrap()
});

// =============================================================================
// Automation Metrics
// =============================================================================

/// Automation status transitions by target status.
pub static AUTOMATION_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "issuetree_automation_transitions_total",
            "Automation status transitions",
        ),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Tracker Gateway Metrics
// =============================================================================

/// Tracker requests by operation and result.
pub static GATEWAY_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("issuetree_gateway_requests_total", "Tracker API requests"),
        &["operation", "result"],
    )
    .unwrap()
});

/// Tracker request duration in seconds.
pub static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "issuetree_gateway_request_duration_seconds",
            "Duration of tracker API requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Hierarchy
        Box::new(BACKLINK_WRITES.clone()),
        Box::new(REFERENCES_ENHANCED.clone()),
        // Automation
        Box::new(AUTOMATION_TRANSITIONS.clone()),
        // Tracker
        Box::new(GATEWAY_REQUESTS.clone()),
        Box::new(GATEWAY_REQUEST_DURATION.clone()),
    ]
}
