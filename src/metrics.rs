use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::config::MetricsConfig;

pub const FETCH_ATTEMPTS: &str = "pricesage_fetch_attempts_total";
pub const FETCH_RESULTS: &str = "pricesage_fetch_results_total";
pub const FETCH_DURATION: &str = "pricesage_fetch_duration_seconds";
pub const PRODUCT_OUTCOMES: &str = "pricesage_product_outcomes_total";
pub const NOTIFICATIONS: &str = "pricesage_notifications_total";
pub const CYCLE_DURATION: &str = "pricesage_cycle_duration_seconds";

/// Install the Prometheus exporter when enabled. Without it the macros below
/// are no-ops.
pub fn init(config: &MetricsConfig) -> Result<(), BuildError> {
    if !config.enabled {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(FETCH_ATTEMPTS, "HTTP requests issued for product pages");
    describe_counter!(FETCH_RESULTS, "Completed fetches by result");
    describe_histogram!(FETCH_DURATION, "Time spent fetching one product, retries included");
    describe_counter!(PRODUCT_OUTCOMES, "Per-product run cycle outcomes");
    describe_counter!(NOTIFICATIONS, "Notification deliveries by channel and status");
    describe_histogram!(CYCLE_DURATION, "Duration of a full run cycle");

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

pub fn record_fetch_attempt(site: &'static str) {
    counter!(FETCH_ATTEMPTS, "site" => site).increment(1);
}

pub fn record_fetch_result(site: &'static str, result: &'static str, elapsed: Duration) {
    counter!(FETCH_RESULTS, "site" => site, "result" => result).increment(1);
    histogram!(FETCH_DURATION, "site" => site).record(elapsed.as_secs_f64());
}

pub fn record_product_outcome(outcome: &'static str) {
    counter!(PRODUCT_OUTCOMES, "outcome" => outcome).increment(1);
}

pub fn record_notification(channel: &'static str, status: &'static str) {
    counter!(NOTIFICATIONS, "channel" => channel, "status" => status).increment(1);
}

pub fn record_cycle(elapsed: Duration) {
    histogram!(CYCLE_DURATION).record(elapsed.as_secs_f64());
}
