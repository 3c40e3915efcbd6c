// Summary vector collector
// The prometheus crate ships counters, gauges and histograms only; upstream
// latency is exposed as a summary, so this module provides a labeled summary
// family that plugs into the same Collector machinery.
//
// Numan Thabit 2025 Nov

use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType, Quantile};
use prometheus::{Error as PromError, Opts, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

/// Quantiles reported for every series.
pub const DEFAULT_QUANTILES: &[f64] = &[0.5, 0.9, 0.99];

#[derive(Debug)]
struct SummaryCore {
    count: u64,
    sum: f64,
    /// Most recent observations, oldest first
    window: VecDeque<f64>,
    max_samples: usize,
}

impl SummaryCore {
    fn new(max_samples: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            window: VecDeque::with_capacity(max_samples.min(1024)),
            max_samples,
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.window.push_back(value);
        while self.window.len() > self.max_samples {
            self.window.pop_front();
        }
    }

    fn quantiles(&self, objectives: &[f64]) -> Vec<(f64, f64)> {
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        objectives
            .iter()
            .map(|&q| (q, rank(&sorted, q)))
            .collect()
    }
}

/// Nearest-rank quantile; NaN when there is nothing to rank.
fn rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let n = sorted.len();
    let idx = ((q * n as f64).ceil() as usize).saturating_sub(1).min(n - 1);
    sorted[idx]
}

/// One series of a [`SummaryVec`].
#[derive(Debug, Clone)]
pub struct Summary {
    core: Arc<Mutex<SummaryCore>>,
}

impl Summary {
    pub fn observe(&self, value: f64) {
        match self.core.lock() {
            Ok(mut core) => core.observe(value),
            Err(poisoned) => poisoned.into_inner().observe(value),
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.with_core(|core| core.count)
    }

    pub fn sample_sum(&self) -> f64 {
        self.with_core(|core| core.sum)
    }

    fn with_core<T>(&self, f: impl FnOnce(&SummaryCore) -> T) -> T {
        match self.core.lock() {
            Ok(core) => f(&core),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

struct SummaryVecCore {
    desc: Desc,
    max_samples: usize,
    children: RwLock<HashMap<Vec<String>, Summary>>,
}

/// Labeled summary family.
#[derive(Clone)]
pub struct SummaryVec {
    inner: Arc<SummaryVecCore>,
}

impl SummaryVec {
    pub fn new(opts: Opts, label_names: &[&str], max_samples: usize) -> Result<Self> {
        if max_samples == 0 {
            return Err(PromError::Msg("summary window must hold at least one sample".into()));
        }
        let desc = Desc::new(
            opts.fq_name(),
            opts.help.clone(),
            label_names.iter().map(|l| l.to_string()).collect(),
            opts.const_labels.clone(),
        )?;
        Ok(Self {
            inner: Arc::new(SummaryVecCore {
                desc,
                max_samples,
                children: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn fq_name(&self) -> &str {
        &self.inner.desc.fq_name
    }

    /// Returns the series for `labels`, creating it on first use. The map must
    /// name every variable label exactly once.
    pub fn get_metric_with(&self, labels: &HashMap<&str, &str>) -> Result<Summary> {
        let values = self.label_values(labels)?;
        self.get_or_create(values)
    }

    pub fn get_metric_with_label_values(&self, values: &[&str]) -> Result<Summary> {
        let expect = self.inner.desc.variable_labels.len();
        if values.len() != expect {
            return Err(PromError::InconsistentCardinality {
                expect,
                got: values.len(),
            });
        }
        self.get_or_create(values.iter().map(|v| v.to_string()).collect())
    }

    /// Deletes the series for `labels`; errors when no such series exists.
    pub fn remove(&self, labels: &HashMap<&str, &str>) -> Result<()> {
        let values = self.label_values(labels)?;
        let removed = match self.inner.children.write() {
            Ok(mut children) => children.remove(&values),
            Err(poisoned) => poisoned.into_inner().remove(&values),
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(PromError::Msg(format!(
                "missing label values {values:?} for {}",
                self.inner.desc.fq_name
            ))),
        }
    }

    fn label_values(&self, labels: &HashMap<&str, &str>) -> Result<Vec<String>> {
        let names = &self.inner.desc.variable_labels;
        if labels.len() != names.len() {
            return Err(PromError::InconsistentCardinality {
                expect: names.len(),
                got: labels.len(),
            });
        }
        names
            .iter()
            .map(|name| {
                labels
                    .get(name.as_str())
                    .map(|v| v.to_string())
                    .ok_or_else(|| PromError::Msg(format!("label name {name} missing in label map")))
            })
            .collect()
    }

    fn get_or_create(&self, values: Vec<String>) -> Result<Summary> {
        if let Ok(children) = self.inner.children.read() {
            if let Some(s) = children.get(&values) {
                return Ok(s.clone());
            }
        }
        let mut children = match self.inner.children.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let max_samples = self.inner.max_samples;
        let summary = children.entry(values).or_insert_with(|| Summary {
            core: Arc::new(Mutex::new(SummaryCore::new(max_samples))),
        });
        Ok(summary.clone())
    }

    fn metric(&self, values: &[String], summary: &Summary) -> Metric {
        let desc = &self.inner.desc;
        let mut pairs: Vec<LabelPair> = desc.const_label_pairs.clone();
        for (name, value) in desc.variable_labels.iter().zip(values) {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            pairs.push(pair);
        }
        pairs.sort_by(|a, b| a.get_name().cmp(b.get_name()));

        let mut metric = Metric::default();
        for pair in pairs {
            metric.mut_label().push(pair);
        }

        let mut out = proto::Summary::default();
        summary.with_core(|core| {
            out.set_sample_count(core.count);
            out.set_sample_sum(core.sum);
            for (q, v) in core.quantiles(DEFAULT_QUANTILES) {
                let mut quantile = Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(v);
                out.mut_quantile().push(quantile);
            }
        });
        metric.set_summary(out);
        metric
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut series: Vec<(Vec<String>, Summary)> = match self.inner.children.read() {
            Ok(children) => children.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        series.sort_by(|a, b| a.0.cmp(&b.0));

        let mut family = MetricFamily::default();
        family.set_name(self.inner.desc.fq_name.clone());
        family.set_help(self.inner.desc.help.clone());
        family.set_field_type(MetricType::SUMMARY);
        for (values, summary) in &series {
            family.mut_metric().push(self.metric(values, summary));
        }
        vec![family]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latency_vec(max_samples: usize) -> SummaryVec {
        let opts = Opts::new("upstream_latency_seconds", "test latency")
            .namespace("nginx")
            .const_label("controller_pod", "pod-0");
        SummaryVec::new(opts, &["namespace", "ingress", "service"], max_samples).unwrap()
    }

    fn labels<'a>(ns: &'a str, ing: &'a str) -> HashMap<&'a str, &'a str> {
        HashMap::from([("namespace", ns), ("ingress", ing), ("service", "svc")])
    }

    #[test]
    fn observe_accumulates_count_and_sum() {
        let vec = latency_vec(100);
        let s = vec.get_metric_with(&labels("ns", "ing")).unwrap();
        s.observe(0.25);
        s.observe(0.75);

        let again = vec.get_metric_with(&labels("ns", "ing")).unwrap();
        assert_eq!(again.sample_count(), 2);
        assert!((again.sample_sum() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quantiles_follow_the_window() {
        let vec = latency_vec(4);
        let s = vec.get_metric_with_label_values(&["ns", "ing", "svc"]).unwrap();
        for v in [100.0, 1.0, 2.0, 3.0, 4.0] {
            s.observe(v);
        }

        let families = vec.collect();
        let summary = families[0].get_metric()[0].get_summary();
        assert_eq!(summary.get_sample_count(), 5);
        let quantiles = summary.get_quantile();
        assert_eq!(quantiles.len(), DEFAULT_QUANTILES.len());
        // 100.0 fell out of the window
        assert_eq!(quantiles[0].get_value(), 2.0);
        assert_eq!(quantiles[2].get_value(), 4.0);
    }

    #[test]
    fn collect_carries_const_and_variable_labels_sorted() {
        let vec = latency_vec(10);
        vec.get_metric_with(&labels("ns", "ing")).unwrap().observe(1.0);

        let families = vec.collect();
        assert_eq!(families[0].get_name(), "nginx_upstream_latency_seconds");
        assert_eq!(families[0].get_field_type(), MetricType::SUMMARY);
        let names: Vec<&str> = families[0].get_metric()[0]
            .get_label()
            .iter()
            .map(|l| l.get_name())
            .collect();
        assert_eq!(names, vec!["controller_pod", "ingress", "namespace", "service"]);
    }

    #[test]
    fn wrong_cardinality_is_rejected() {
        let vec = latency_vec(10);
        let short = HashMap::from([("namespace", "ns")]);
        assert!(matches!(
            vec.get_metric_with(&short),
            Err(PromError::InconsistentCardinality { expect: 3, got: 1 })
        ));

        let wrong_name = HashMap::from([("namespace", "ns"), ("ingress", "i"), ("host", "h")]);
        assert!(vec.get_metric_with(&wrong_name).is_err());
        assert!(vec.get_metric_with_label_values(&["ns"]).is_err());
    }

    #[test]
    fn remove_deletes_once() {
        let vec = latency_vec(10);
        vec.get_metric_with(&labels("ns", "ing")).unwrap().observe(1.0);
        vec.get_metric_with(&labels("ns", "other")).unwrap().observe(1.0);

        assert!(vec.remove(&labels("ns", "ing")).is_ok());
        assert!(vec.remove(&labels("ns", "ing")).is_err());
        assert_eq!(vec.collect()[0].get_metric().len(), 1);
    }

    #[test]
    fn empty_window_reports_nan() {
        assert!(rank(&[], 0.5).is_nan());
        assert_eq!(rank(&[1.0], 0.99), 1.0);
    }
}
