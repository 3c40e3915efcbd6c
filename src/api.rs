// HTTP API implementation
// This file provides the scrape endpoint and the control endpoints used by
// the route-management loop (host allow-list and ingress removal)
//
// Numan Thabit 2025 Nov

use crate::collector::SocketCollector;
use crate::reaper::ReapReport;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router as AxumRouter,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiState {
    pub collector: SocketCollector,
    /// Registry the collector is registered with for exposition
    pub exposition: Arc<Registry>,
}

#[derive(Debug, Deserialize)]
pub struct HostsRequest {
    pub hosts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HostsResponse {
    pub hosts: usize,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub ingresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create the HTTP router with scrape and control endpoints
pub fn create_api_router(state: ApiState) -> AxumRouter {
    AxumRouter::new()
        .route("/healthz", get(health_check))
        .route("/metrics", get(scrape))
        .route("/api/v1/hosts", put(replace_hosts))
        .route("/api/v1/remove", post(remove_ingresses))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Collector families first, then process self-metrics from the default registry
async fn scrape(State(state): State<ApiState>) -> Response {
    let mut families = state.exposition.gather();
    families.extend(prometheus::gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        error!(error = %err, families = families.len(), "prometheus text encoding failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn replace_hosts(
    State(state): State<ApiState>,
    Json(req): Json<HostsRequest>,
) -> Json<HostsResponse> {
    state.collector.set_hosts(req.hosts);
    let hosts = state.collector.hosts().len();
    info!(hosts = hosts, "served host set replaced");
    Json(HostsResponse { hosts })
}

async fn remove_ingresses(
    State(state): State<ApiState>,
    Json(req): Json<RemoveRequest>,
) -> Json<ReapReport> {
    let snapshot = state.exposition.gather();
    let report = state.collector.remove_metrics_in(&snapshot, &req.ingresses);
    info!(
        ingresses = req.ingresses.len(),
        removed = report.removed,
        missing = report.missing,
        "removed metrics for deleted ingresses"
    );
    Json(report)
}
