//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Linking Metrics
    pub static ref OAUTH_CALLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moa_oauth_callbacks_total", "Total number of OAuth callbacks handled"),
        &["platform", "outcome"]
    ).expect("metric can be created");
    pub static ref HOST_REGISTRATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moa_host_registrations_total", "Total number of Mastodon app registrations attempted"),
        &["outcome"]
    ).expect("metric can be created");

    // Bridge Metrics
    pub static ref BRIDGE_SAVES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moa_bridge_saves_total", "Total number of bridge settings saves"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref BRIDGE_DELETES_TOTAL: IntCounter = IntCounter::new(
        "moa_bridge_deletes_total",
        "Total number of bridges removed"
    ).expect("metric can be created");
    pub static ref CURSOR_FALLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moa_cursor_fallbacks_total", "Cursors initialized to 0 because the latest post could not be fetched"),
        &["platform"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("moa_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(OAUTH_CALLBACKS_TOTAL.clone()))
        .expect("OAUTH_CALLBACKS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HOST_REGISTRATIONS_TOTAL.clone()))
        .expect("HOST_REGISTRATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(BRIDGE_SAVES_TOTAL.clone()))
        .expect("BRIDGE_SAVES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(BRIDGE_DELETES_TOTAL.clone()))
        .expect("BRIDGE_DELETES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CURSOR_FALLBACKS_TOTAL.clone()))
        .expect("CURSOR_FALLBACKS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Record the outcome of an OAuth callback
pub fn observe_oauth_callback(platform: &str, outcome: &str) {
    OAUTH_CALLBACKS_TOTAL
        .with_label_values(&[platform, outcome])
        .inc();
}
