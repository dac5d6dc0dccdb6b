use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    error::ProbeError,
    health,
    probes::Diagnostics,
    types::{HealthReport, OsDetectReport, PingReport, PortScanReport, SpeedTestReport},
};

#[derive(Clone)]
pub struct AppState {
    diag: Arc<Diagnostics>, // process-wide, shared by every request
}

#[derive(Debug, Deserialize)]
pub struct ScanPortsQuery {
    pub ip: String,
    #[serde(default)]
    pub ports: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub ip: String,
}

#[derive(Debug, Deserialize)]
pub struct PingQuery {
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    #[serde(default = "default_true")]
    pub check_gateway: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ProbeError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProbeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ProbeError::Unavailable { .. } | ProbeError::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProbeError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ProbeError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(diag: Arc<Diagnostics>) -> Router {
    let api = Router::new()
        .route("/scan_ports", get(scan_ports))
        .route("/detect_os", get(detect_os))
        .route("/speedtest", get(speedtest))
        .route("/isp_health", get(isp_health))
        .route("/ping", get(ping))
        .with_state(AppState { diag });

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on `bind` until Ctrl+C, then close the worker pool.
pub async fn spawn_server(bind: &str, diag: Arc<Diagnostics>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding to {bind}"))?;
    info!(addr = %bind, workers = diag.pool().size(), "serving diagnostics API");

    axum::serve(listener, router(diag.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "ctrl-c handler failed");
            }
        })
        .await?;

    diag.shutdown();
    info!("diagnostics API stopped");
    Ok(())
}

/// Token cancelled when the handler future is dropped (client went away).
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn scan_ports(
    State(app): State<AppState>,
    Query(q): Query<ScanPortsQuery>,
) -> Result<Json<PortScanReport>, ProbeError> {
    let (cancel, _guard) = request_token();
    app.diag
        .port_scan(&q.ip, q.ports.as_deref(), &cancel)
        .await
        .map(Json)
}

async fn detect_os(
    State(app): State<AppState>,
    Query(q): Query<TargetQuery>,
) -> Result<Json<OsDetectReport>, ProbeError> {
    let (cancel, _guard) = request_token();
    app.diag.os_detect(&q.ip, &cancel).await.map(Json)
}

async fn speedtest(State(app): State<AppState>) -> Result<Json<SpeedTestReport>, ProbeError> {
    let (cancel, _guard) = request_token();
    app.diag.speed_test(&cancel).await.map(Json)
}

async fn ping(
    State(app): State<AppState>,
    Query(q): Query<PingQuery>,
) -> Result<Json<PingReport>, ProbeError> {
    let (cancel, _guard) = request_token();
    app.diag.ping(&q.host, &cancel).await.map(Json)
}

async fn isp_health(
    State(app): State<AppState>,
    Query(q): Query<HealthQuery>,
) -> Json<HealthReport> {
    let (cancel, _guard) = request_token();
    Json(health::run_health(&app.diag, q.check_gateway, &cancel).await)
}
