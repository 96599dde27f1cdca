//! Metrics collection and exposition.
//!
//! # Metrics
//! - `upload_guard_rejections_total` (counter): rejected requests by `reason`
//! - `upload_guard_downloads_allowed_total` (counter): requests within quota
//! - `upload_guard_rate_limit_tracked_clients` (gauge): clients holding a window
//! - `upload_guard_rate_limit_evicted_total` (counter): records dropped by the sweep
//!
//! Recording is a no-op until a recorder is installed, so the guards can be
//! used without the Prometheus exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_rejection(reason: &'static str) {
    counter!("upload_guard_rejections_total", "reason" => reason).increment(1);
}

pub fn record_download_allowed() {
    counter!("upload_guard_downloads_allowed_total").increment(1);
}

pub fn record_rate_limit_sweep(evicted: usize, remaining: usize) {
    counter!("upload_guard_rate_limit_evicted_total").increment(evicted as u64);
    gauge!("upload_guard_rate_limit_tracked_clients").set(remaining as f64);
}
