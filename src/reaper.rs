// Stale series reaper
// Deletes every series belonging to ingresses that no longer exist. Live
// series are discovered by reading back the registry's own exposition.
//
// Numan Thabit 2025 Nov

use crate::event::route_key;
use crate::metrics::REAPED_SERIES;
use crate::registry::{FamilyHandle, MetricRegistry};
use prometheus::proto::MetricFamily;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    /// Series deleted
    pub removed: usize,
    /// Matching series that were already gone when deleted
    pub missing: usize,
}

/// Removes series for `ingresses` (`namespace/name`) using a fresh snapshot.
pub fn remove_metrics(registry: &MetricRegistry, ingresses: &[String]) -> ReapReport {
    if ingresses.is_empty() {
        return ReapReport::default();
    }
    remove_from_snapshot(registry, &registry.gather(), ingresses)
}

/// Removes series for `ingresses` found in `snapshot`, e.g. the output of an
/// exposition registry's `gather()`.
pub fn remove_from_snapshot(
    registry: &MetricRegistry,
    snapshot: &[MetricFamily],
    ingresses: &[String],
) -> ReapReport {
    let to_remove: HashSet<&str> = ingresses.iter().map(String::as_str).collect();
    let mut report = ReapReport::default();
    if to_remove.is_empty() {
        return report;
    }

    debug!(ingresses = ?ingresses, "removing ingresses from metrics");
    for mf in snapshot {
        let name = mf.get_name();
        let Some(family) = registry.deletable(name) else {
            continue;
        };

        for m in mf.get_metric() {
            let mut labels: HashMap<&str, &str> = m
                .get_label()
                .iter()
                .map(|pair| (pair.get_name(), pair.get_value()))
                .collect();
            strip_constants(&mut labels, family);

            let key = match (labels.get("namespace"), labels.get("ingress")) {
                (Some(ns), Some(ing)) => route_key(ns, ing),
                _ => continue,
            };
            if !to_remove.contains(key.as_str()) {
                continue;
            }

            debug!(family = name, kind = ?family.kind(), ingress = %key, "removing metric series");
            match family.remove(&labels) {
                Ok(()) => {
                    report.removed += 1;
                    REAPED_SERIES.with_label_values(&[name]).inc();
                }
                Err(err) => {
                    report.missing += 1;
                    debug!(
                        family = name,
                        ingress = %key,
                        labels = ?labels,
                        error = %err,
                        "metric series not removed"
                    );
                }
            }
        }
    }
    report
}

/// Leaves only the variable labels the family's series are keyed on.
fn strip_constants(labels: &mut HashMap<&str, &str>, family: &FamilyHandle) {
    for name in family.const_label_names() {
        labels.remove(name);
    }
}
