// Metric registry for proxy request telemetry
// Owns every labeled family the collector exposes and the name -> family
// table the reaper dispatches deletions through
//
// Numan Thabit 2025 Nov

use crate::config::AppConfig;
use crate::errors::Result;
use crate::summary::SummaryVec;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    exponential_buckets, linear_buckets, CounterVec, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Full per-request label shape.
pub const REQUEST_LABELS: &[&str] = &["host", "status", "path", "namespace", "ingress", "service"];
/// Labels of the per-ingress request counter.
pub const REQUESTS_LABELS: &[&str] = &["namespace", "ingress", "status"];
/// Labels of the per-ingress upstream latency summary.
pub const LATENCY_LABELS: &[&str] = &["namespace", "ingress", "service"];
/// Labels fixed at startup and attached to every family.
pub const CONSTANT_LABELS: &[&str] = &["controller_namespace", "controller_class", "controller_pod"];

pub const REQUEST_DURATION: &str = "request_duration_seconds";
pub const REQUEST_SIZE: &str = "request_size";
pub const RESPONSE_DURATION: &str = "response_duration_seconds";
pub const RESPONSE_SIZE: &str = "response_size";
pub const BYTES_SENT: &str = "bytes_sent";
pub const REQUESTS: &str = "requests";
pub const UPSTREAM_LATENCY: &str = "ingress_upstream_latency_seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyKind {
    Counter,
    Histogram,
    Summary,
}

/// A registered family tagged with its kind.
#[derive(Clone)]
pub enum FamilyHandle {
    Counter(CounterVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl FamilyHandle {
    pub fn kind(&self) -> FamilyKind {
        match self {
            FamilyHandle::Counter(_) => FamilyKind::Counter,
            FamilyHandle::Histogram(_) => FamilyKind::Histogram,
            FamilyHandle::Summary(_) => FamilyKind::Summary,
        }
    }

    /// Deletes exactly the series identified by `labels` (variable labels only).
    pub fn remove(&self, labels: &HashMap<&str, &str>) -> prometheus::Result<()> {
        match self {
            FamilyHandle::Counter(c) => c.remove(labels),
            FamilyHandle::Histogram(h) => h.remove(labels),
            FamilyHandle::Summary(s) => s.remove(labels),
        }
    }

    /// Exposed name of the family.
    pub fn fq_name(&self) -> &str {
        self.desc().into_iter().next().map_or("", |d| d.fq_name.as_str())
    }

    /// Names of the labels fixed on every series of the family.
    pub fn const_label_names(&self) -> Vec<&str> {
        self.desc()
            .into_iter()
            .flat_map(|d| d.const_label_pairs.iter().map(|pair| pair.get_name()))
            .collect()
    }

    fn desc(&self) -> Vec<&Desc> {
        match self {
            FamilyHandle::Counter(c) => c.desc(),
            FamilyHandle::Histogram(h) => h.desc(),
            FamilyHandle::Summary(s) => s.desc(),
        }
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self {
            FamilyHandle::Counter(c) => c.collect(),
            FamilyHandle::Histogram(h) => h.collect(),
            FamilyHandle::Summary(s) => s.collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub namespace: String,
    pub const_labels: HashMap<String, String>,
    pub summary_max_samples: usize,
    pub reap_request_counter: bool,
}

impl From<&AppConfig> for RegistryOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            namespace: cfg.metrics_namespace.clone(),
            const_labels: cfg.controller_labels(),
            summary_max_samples: cfg.summary_max_samples,
            reap_request_counter: cfg.reap_request_counter,
        }
    }
}

#[derive(Clone)]
pub struct MetricRegistry {
    request_time: HistogramVec,
    request_length: HistogramVec,
    response_time: HistogramVec,
    response_length: HistogramVec,
    bytes_sent: HistogramVec,
    requests: CounterVec,
    upstream_latency: SummaryVec,
    /// Exposed name -> family, for families eligible for per-ingress deletion
    deletable: Arc<HashMap<String, FamilyHandle>>,
    /// Every family, in exposition order
    families: Arc<Vec<FamilyHandle>>,
}

impl MetricRegistry {
    pub fn new(opts: &RegistryOptions) -> Result<Self> {
        let histogram = |name: &str, help: &str, buckets: Option<Vec<f64>>| {
            let mut hopts = HistogramOpts::new(name, help)
                .namespace(opts.namespace.clone())
                .const_labels(opts.const_labels.clone());
            if let Some(buckets) = buckets {
                hopts = hopts.buckets(buckets);
            }
            HistogramVec::new(hopts, REQUEST_LABELS)
        };

        let request_time = histogram(
            REQUEST_DURATION,
            "The request processing time in seconds",
            None,
        )?;
        let request_length = histogram(
            REQUEST_SIZE,
            "The request length (including request line, header, and request body)",
            // 10 buckets, each 10 bytes wide
            Some(linear_buckets(10.0, 10.0, 10)?),
        )?;
        let response_time = histogram(
            RESPONSE_DURATION,
            "The time spent on receiving the response from the upstream server",
            None,
        )?;
        let response_length = histogram(
            RESPONSE_SIZE,
            "The response length (including request line, header, and request body)",
            None,
        )?;
        let bytes_sent = histogram(
            BYTES_SENT,
            "The number of bytes sent to a client",
            // 7 buckets, exponential factor of 10
            Some(exponential_buckets(10.0, 10.0, 7)?),
        )?;

        let requests = CounterVec::new(
            Opts::new(REQUESTS, "The total number of client requests")
                .namespace(opts.namespace.clone())
                .const_labels(opts.const_labels.clone()),
            REQUESTS_LABELS,
        )?;

        let upstream_latency = SummaryVec::new(
            Opts::new(UPSTREAM_LATENCY, "Upstream service latency per Ingress")
                .namespace(opts.namespace.clone())
                .const_labels(opts.const_labels.clone()),
            LATENCY_LABELS,
            opts.summary_max_samples,
        )?;

        // keyed on the exposed name, which drops the prefix when the namespace is empty
        let mut candidates = vec![
            FamilyHandle::Histogram(request_time.clone()),
            FamilyHandle::Histogram(request_length.clone()),
            FamilyHandle::Histogram(response_time.clone()),
            FamilyHandle::Histogram(response_length.clone()),
            FamilyHandle::Histogram(bytes_sent.clone()),
            FamilyHandle::Summary(upstream_latency.clone()),
        ];
        if opts.reap_request_counter {
            candidates.push(FamilyHandle::Counter(requests.clone()));
        }
        let deletable: HashMap<String, FamilyHandle> = candidates
            .into_iter()
            .map(|family| (family.fq_name().to_string(), family))
            .collect();

        let families = vec![
            FamilyHandle::Histogram(request_time.clone()),
            FamilyHandle::Histogram(request_length.clone()),
            FamilyHandle::Counter(requests.clone()),
            FamilyHandle::Summary(upstream_latency.clone()),
            FamilyHandle::Histogram(response_time.clone()),
            FamilyHandle::Histogram(response_length.clone()),
            FamilyHandle::Histogram(bytes_sent.clone()),
        ];

        Ok(Self {
            request_time,
            request_length,
            response_time,
            response_length,
            bytes_sent,
            requests,
            upstream_latency,
            deletable: Arc::new(deletable),
            families: Arc::new(families),
        })
    }

    pub fn request_time(&self) -> &HistogramVec {
        &self.request_time
    }

    pub fn request_length(&self) -> &HistogramVec {
        &self.request_length
    }

    pub fn response_time(&self) -> &HistogramVec {
        &self.response_time
    }

    pub fn response_length(&self) -> &HistogramVec {
        &self.response_length
    }

    pub fn bytes_sent(&self) -> &HistogramVec {
        &self.bytes_sent
    }

    pub fn requests(&self) -> &CounterVec {
        &self.requests
    }

    pub fn upstream_latency(&self) -> &SummaryVec {
        &self.upstream_latency
    }

    /// Looks up a deletable family by its exposed (fully qualified) name.
    pub fn deletable(&self, fq_name: &str) -> Option<&FamilyHandle> {
        self.deletable.get(fq_name)
    }

    /// Snapshot of live series, read back through the collection path.
    /// Families without series are omitted.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let mut mfs: Vec<MetricFamily> = self
            .collect()
            .into_iter()
            .filter(|mf| !mf.get_metric().is_empty())
            .collect();
        mfs.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        mfs
    }

    /// Registers every family with an exposition registry.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.clone()))?;
        Ok(())
    }
}

impl Collector for MetricRegistry {
    fn desc(&self) -> Vec<&Desc> {
        self.families.iter().flat_map(|f| f.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families.iter().flat_map(|f| f.collect()).collect()
    }
}
