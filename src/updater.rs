// Applies decoded request events to the metric registry
//
// Numan Thabit 2025 Nov

use crate::event::{measured, RequestEvent};
use crate::metrics::OBSERVATION_ERRORS;
use crate::registry::{
    MetricRegistry, BYTES_SENT, REQUESTS, REQUEST_DURATION, REQUEST_SIZE, RESPONSE_DURATION,
    RESPONSE_SIZE, UPSTREAM_LATENCY,
};
use prometheus::HistogramVec;
use std::collections::HashMap;
use tracing::warn;

/// Records one event. A series that cannot be resolved skips only that
/// observation; the remaining families are still updated.
pub fn record(registry: &MetricRegistry, ev: &RequestEvent) {
    let request_labels: HashMap<&str, &str> = HashMap::from([
        ("host", ev.host.as_str()),
        ("status", ev.status.as_str()),
        ("path", ev.path.as_str()),
        ("namespace", ev.namespace.as_str()),
        ("ingress", ev.ingress.as_str()),
        ("service", ev.service.as_str()),
    ]);

    let collector_labels: HashMap<&str, &str> = HashMap::from([
        ("namespace", ev.namespace.as_str()),
        ("ingress", ev.ingress.as_str()),
        ("status", ev.status.as_str()),
    ]);

    let latency_labels: HashMap<&str, &str> = HashMap::from([
        ("namespace", ev.namespace.as_str()),
        ("ingress", ev.ingress.as_str()),
        ("service", ev.service.as_str()),
    ]);

    match registry.requests().get_metric_with(&collector_labels) {
        Ok(counter) => counter.inc(),
        Err(err) => skipped(REQUESTS, &err),
    }

    if let Some(latency) = measured(ev.upstream_latency) {
        match registry.upstream_latency().get_metric_with(&latency_labels) {
            Ok(summary) => summary.observe(latency),
            Err(err) => skipped(UPSTREAM_LATENCY, &err),
        }
    }

    if let Some(v) = measured(ev.request_time) {
        observe(registry.request_time(), REQUEST_DURATION, &request_labels, v);
    }

    if let Some(v) = measured(ev.request_length) {
        observe(registry.request_length(), REQUEST_SIZE, &request_labels, v);
    }

    if let Some(v) = measured(ev.upstream_response_time) {
        observe(registry.response_time(), RESPONSE_DURATION, &request_labels, v);
    }

    // client-facing bytes and upstream response size share the same source
    if let Some(v) = measured(ev.response_length) {
        observe(registry.bytes_sent(), BYTES_SENT, &request_labels, v);
        observe(registry.response_length(), RESPONSE_SIZE, &request_labels, v);
    }
}

fn observe(vec: &HistogramVec, family: &str, labels: &HashMap<&str, &str>, value: f64) {
    match vec.get_metric_with(labels) {
        Ok(histogram) => histogram.observe(value),
        Err(err) => skipped(family, &err),
    }
}

fn skipped(family: &str, err: &prometheus::Error) {
    warn!(family = family, error = %err, "error fetching metric series; observation skipped");
    OBSERVATION_ERRORS.with_label_values(&[family]).inc();
}
