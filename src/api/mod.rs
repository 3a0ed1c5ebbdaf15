//! API layer
//!
//! HTTP handlers for:
//! - Liveness greeting
//! - Current user lookup
//! - Metrics (Prometheus)

pub mod metrics;
mod user;

pub use metrics::metrics_router;
pub use user::user_router;
