//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Login Metrics
    pub static ref LOGINS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_logins_total", "Total number of OAuth callbacks by outcome"),
        &["provider", "outcome"]
    ).expect("metric can be created");
    pub static ref USERS_CREATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_users_created_total", "Total number of users created on first login"),
        &["provider"]
    ).expect("metric can be created");
    pub static ref USERS_TOTAL: IntGauge = IntGauge::new(
        "authgate_users_total",
        "Total number of known users"
    ).expect("metric can be created");

    // Session Metrics
    pub static ref SESSIONS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "authgate_sessions_created_total",
        "Total number of sessions issued"
    ).expect("metric can be created");
    pub static ref SESSIONS_PURGED_TOTAL: IntCounter = IntCounter::new(
        "authgate_sessions_purged_total",
        "Total number of expired sessions removed by cleanup"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authgate_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(LOGINS_TOTAL.clone()))
            .expect("LOGINS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(USERS_CREATED_TOTAL.clone()))
            .expect("USERS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(USERS_TOTAL.clone()))
            .expect("USERS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_CREATED_TOTAL.clone()))
            .expect("SESSIONS_CREATED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SESSIONS_PURGED_TOTAL.clone()))
            .expect("SESSIONS_PURGED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Record the outcome of a provider callback.
pub fn observe_login(provider: &str, outcome: &str) {
    LOGINS_TOTAL.with_label_values(&[provider, outcome]).inc();
}
