// Socket collector
// Glues the listener, batch decoder, host filter, updater and reaper around
// one shared metric registry
//
// Numan Thabit 2025 Nov

use crate::errors::Result;
use crate::event::decode_batch;
use crate::hosts::HostFilter;
use crate::listener::{ListenerHandle, SocketListener};
use crate::metrics::{BATCHES, EVENTS};
use crate::reaper::{self, ReapReport};
use crate::registry::{MetricRegistry, RegistryOptions};
use crate::updater;
use prometheus::proto::MetricFamily;
use std::sync::Arc;
use tracing::{debug, error, trace};

#[derive(Clone)]
pub struct SocketCollector {
    registry: MetricRegistry,
    hosts: Arc<HostFilter>,
}

impl SocketCollector {
    pub fn new(opts: &RegistryOptions) -> Result<Self> {
        Ok(Self {
            registry: MetricRegistry::new(opts)?,
            hosts: Arc::new(HostFilter::new()),
        })
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn hosts(&self) -> &HostFilter {
        &self.hosts
    }

    /// Replaces the set of hostnames whose events are recorded.
    pub fn set_hosts<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.replace(hosts);
    }

    /// Decodes one batch and records every event for a served host. A
    /// malformed batch is logged and dropped as a whole.
    pub fn handle_message(&self, msg: &[u8]) {
        trace!(msg = %String::from_utf8_lossy(msg), "telemetry batch received");

        let batch = match decode_batch(msg) {
            Ok(batch) => batch,
            Err(err) => {
                error!(
                    error = %err,
                    payload = %String::from_utf8_lossy(msg),
                    "unexpected error deserializing JSON payload"
                );
                BATCHES.with_label_values(&["malformed"]).inc();
                return;
            }
        };
        BATCHES.with_label_values(&["decoded"]).inc();

        for ev in &batch {
            if !self.hosts.contains(&ev.host) {
                debug!(host = %ev.host, "skipping metric for host that is not being served");
                EVENTS.with_label_values(&["host_filtered"]).inc();
                continue;
            }
            updater::record(&self.registry, ev);
            EVENTS.with_label_values(&["recorded"]).inc();
        }
    }

    /// Deletes series of ingresses that no longer exist.
    pub fn remove_metrics(&self, ingresses: &[String]) -> ReapReport {
        reaper::remove_metrics(&self.registry, ingresses)
    }

    /// Like [`remove_metrics`](Self::remove_metrics) but matching against a
    /// snapshot gathered from an exposition registry.
    pub fn remove_metrics_in(&self, snapshot: &[MetricFamily], ingresses: &[String]) -> ReapReport {
        reaper::remove_from_snapshot(&self.registry, snapshot, ingresses)
    }

    /// Runs the accept loop, feeding every payload through `handle_message`.
    pub fn start(&self, listener: SocketListener) -> ListenerHandle {
        let collector = self.clone();
        listener.start(move |payload| collector.handle_message(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::options;
    use std::sync::Mutex;

    #[test]
    fn filtered_hosts_leave_registry_untouched() {
        let collector = SocketCollector::new(&options()).unwrap();
        collector.set_hosts(["a.com"]);
        collector.handle_message(br#"[{"h":"b.com","s":"200","rT":0.5,"n":"ns","i":"ing","p":"/"}]"#);
        assert!(collector.registry().gather().is_empty());
    }

    #[test]
    fn no_hosts_configured_drops_everything() {
        let collector = SocketCollector::new(&options()).unwrap();
        collector.handle_message(br#"[{"h":"a.com","s":"200","n":"ns","i":"ing"}]"#);
        assert!(collector.registry().gather().is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Feeds one payload and counts the error lines it logged.
    fn errors_logged(collector: &SocketCollector, payload: &[u8]) -> usize {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();
        tracing::subscriber::with_default(subscriber, || collector.handle_message(payload));

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        text.lines().filter(|line| line.contains("ERROR")).count()
    }

    #[test]
    fn malformed_batch_is_not_partially_applied() {
        let collector = SocketCollector::new(&options()).unwrap();
        collector.set_hosts(["a.com"]);
        // first record is valid, second breaks the batch
        let logged = errors_logged(
            &collector,
            br#"[{"h":"a.com","s":"200","n":"ns","i":"ing"},{"h":"a.com","rT":"slow"}]"#,
        );
        assert_eq!(logged, 1);
        assert!(collector.registry().gather().is_empty());
    }

    #[test]
    fn one_decode_error_per_malformed_payload() {
        let collector = SocketCollector::new(&options()).unwrap();
        collector.set_hosts(["a.com"]);
        assert_eq!(errors_logged(&collector, b"not json"), 1);
        assert_eq!(errors_logged(&collector, br#"{"h":"a.com"}"#), 1);
        assert_eq!(
            errors_logged(&collector, br#"[{"h":"a.com","s":"200","n":"ns","i":"ing"}]"#),
            0
        );
    }

    #[test]
    fn events_apply_in_order_within_a_batch() {
        let collector = SocketCollector::new(&options()).unwrap();
        collector.set_hosts(["a.com", "b.com"]);
        collector.handle_message(
            br#"[{"h":"a.com","s":"200","n":"ns","i":"ing"},
                 {"h":"c.com","s":"200","n":"ns","i":"ing"},
                 {"h":"b.com","s":"200","n":"ns","i":"ing"}]"#,
        );
        assert_eq!(
            collector
                .registry()
                .requests()
                .with_label_values(&["ns", "ing", "200"])
                .get(),
            2.0
        );
    }
}
