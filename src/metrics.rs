// Self-observability metrics
// Counters describing the ingestion pipeline itself, registered in the
// process-wide default registry
//
// Numan Thabit 2025 Nov

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

pub static BATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingress_stats_batches_total",
        "telemetry batches received by outcome",
        &["outcome"]
    )
    .expect("register ingress_stats_batches_total")
});

pub static EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingress_stats_events_total",
        "telemetry events by outcome",
        &["outcome"]
    )
    .expect("register ingress_stats_events_total")
});

pub static OBSERVATION_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingress_stats_observation_errors_total",
        "observations skipped because the series could not be resolved",
        &["family"]
    )
    .expect("register ingress_stats_observation_errors_total")
});

pub static REAPED_SERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingress_stats_reaped_series_total",
        "series deleted for removed ingresses",
        &["family"]
    )
    .expect("register ingress_stats_reaped_series_total")
});

/// Registers every self-metric up front so a name clash fails at boot.
pub fn init() {
    Lazy::force(&BATCHES);
    Lazy::force(&EVENTS);
    Lazy::force(&OBSERVATION_ERRORS);
    Lazy::force(&REAPED_SERIES);
}
