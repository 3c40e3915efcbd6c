// Error types for the ingestion engine
// Library code returns StatsError; bootstrap code wraps it with anyhow context
//
// Numan Thabit 2025 Nov

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("metric error: {0}")]
    Metric(#[from] prometheus::Error),
    #[error("unknown metric family: {0}")]
    UnknownFamily(String),
    #[error("series not found: {0}")]
    SeriesNotFound(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = StatsError> = std::result::Result<T, E>;
