//! Prometheus metrics for commerce-service.
//!
//! Domain counters live in the default `prometheus` registry; HTTP request
//! metrics go through the `metrics` facade recorded by
//! `service_core::middleware::metrics`. `/metrics` renders both.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "commerce_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Orders requested, by payment mode and outcome
pub static ORDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("commerce_orders_total", "Razorpay orders by mode and outcome"),
        &["mode", "outcome"]
    )
    .expect("Failed to register ORDERS_TOTAL")
});

/// Captured payments applied to the ledger
pub static CAPTURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "commerce_payment_captures_total",
            "Payment captures by source and outcome"
        ),
        &["source", "outcome"]
    )
    .expect("Failed to register CAPTURES_TOTAL")
});

/// Cancellations by resulting subscription status
pub static CANCELLATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "commerce_cancellations_total",
            "Cancellations by resulting subscription status"
        ),
        &["status"]
    )
    .expect("Failed to register CANCELLATIONS_TOTAL")
});

/// Webhook deliveries by event and outcome
pub static WEBHOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "commerce_webhook_events_total",
            "Razorpay webhook deliveries by event and outcome"
        ),
        &["event", "outcome"]
    )
    .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
});

/// Install the `metrics` recorder and register domain metrics. Safe to call twice.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
        }
    }

    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ORDERS_TOTAL);
    Lazy::force(&CAPTURES_TOTAL);
    Lazy::force(&CANCELLATIONS_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    output.push_str(&String::from_utf8_lossy(&buffer));
    output
}

pub fn record_order(mode: &str, outcome: &str) {
    ORDERS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

pub fn record_capture(source: &str, outcome: &str) {
    CAPTURES_TOTAL.with_label_values(&[source, outcome]).inc();
}

pub fn record_cancellation(status: &str) {
    CANCELLATIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_webhook(event: &str, outcome: &str) {
    WEBHOOK_EVENTS_TOTAL.with_label_values(&[event, outcome]).inc();
}
