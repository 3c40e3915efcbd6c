// Configuration management module
// This file handles loading and parsing of configuration settings
// from built-in defaults, an optional config file and environment variables
//
// Numan Thabit 2025 Nov

use crate::errors::StatsError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "INGRESS_STATS";
pub const CONFIG_FILE_ENV: &str = "INGRESS_STATS_CONFIG";

const DEFAULT_POD: &str = "unknown";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Unix socket the proxy writes telemetry batches to
    pub socket_path: PathBuf,
    /// Address of the scrape/control HTTP server
    pub listen_addr: SocketAddr,
    /// Prefix joined to every exposed family name
    pub metrics_namespace: String,
    /// Namespace the controller watches (constant label)
    pub controller_namespace: String,
    /// Ingress class handled by the controller (constant label)
    pub controller_class: String,
    /// Controller pod identity (constant label)
    pub controller_pod: String,
    /// Concurrent connection handlers; 0 disables the bound
    pub max_connections: usize,
    /// Sliding window size used for summary quantiles
    pub summary_max_samples: usize,
    /// Also reap the per-ingress request counter on removal
    pub reap_request_counter: bool,
    /// Hostnames served at startup
    pub hosts: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        let mut cfg = Self::from_sources(file.as_deref())?;

        if cfg.controller_pod == DEFAULT_POD {
            if let Ok(pod) = std::env::var("POD_NAME") {
                cfg.controller_pod = pod;
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, then the optional file, then `INGRESS_STATS_*` variables.
    pub fn from_sources(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("socket_path", "/tmp/prometheus-nginx.socket")?
            .set_default("listen_addr", "0.0.0.0:10254")?
            .set_default("metrics_namespace", "nginx")?
            .set_default("controller_namespace", "default")?
            .set_default("controller_class", "nginx")?
            .set_default("controller_pod", DEFAULT_POD)?
            .set_default("max_connections", 1024_i64)?
            .set_default("summary_max_samples", 500_i64)?
            .set_default("reap_request_counter", false)?
            .set_default("hosts", Vec::<String>::new())?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let cfg = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("hosts"),
            )
            .build()
            .context("assemble configuration sources")?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), StatsError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(StatsError::InvalidConfig("socket_path is empty".into()));
        }
        if self.metrics_namespace.is_empty() {
            return Err(StatsError::InvalidConfig("metrics_namespace is empty".into()));
        }
        if self.summary_max_samples == 0 {
            return Err(StatsError::InvalidConfig(
                "summary_max_samples must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Constant labels attached to every exposed family.
    pub fn controller_labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                "controller_namespace".to_string(),
                self.controller_namespace.clone(),
            ),
            ("controller_class".to_string(), self.controller_class.clone()),
            ("controller_pod".to_string(), self.controller_pod.clone()),
        ])
    }
}
