// Library root module for ingress-stats
// Ingests per-request telemetry written by the proxy to a local socket,
// aggregates it into labeled metric families and reaps series of removed
// ingresses
//
// Numan Thabit 2025 Nov

pub mod api;
pub mod collector;
pub mod config;
pub mod errors;
pub mod event;
pub mod hosts;
pub mod listener;
pub mod metrics;
pub mod reaper;
pub mod registry;
pub mod summary;
pub mod updater;

pub use collector::SocketCollector;
pub use errors::StatsError;
pub use registry::{MetricRegistry, RegistryOptions};
