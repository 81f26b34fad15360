//! HTTP request gateway: the polling counterpart to the streaming surface.
//!
//! Routes:
//!
//! | Method | Path                        | Response                          |
//! |--------|-----------------------------|-----------------------------------|
//! | GET    | `/`                         | plain-text banner                 |
//! | GET    | `/devices`                  | status snapshots of the fleet     |
//! | GET    | `/devices/:id/info`         | status snapshot of one device     |
//! | GET    | `/devices/:id/sensor`       | current sensor reading + timestamp|
//! | POST   | `/devices/:id/command`      | command result                    |
//!
//! Commands submitted over HTTP share [`execute_command`] with the streaming
//! path, so every connected subscriber still receives the
//! `command_executed` notice.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use fleet_core::{
    CommandError, CommandResult, DeviceRegistry, SensorSnapshot, StatusSnapshot,
};

use crate::application::commands::execute_command;
use crate::infrastructure::connection_manager::ConnectionManager;

/// Body of the banner served at the root path.
const BANNER: &str = "fleet-sim device server";

// ── State and wire types ──────────────────────────────────────────────────────

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<DeviceRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub reboot_delay: Duration,
}

/// Body of `POST /devices/:id/command`.
///
/// `command` is optional at the serde level so an empty object yields a
/// clean 400 instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: Option<String>,
}

/// Body of `GET /devices/:id/sensor`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorResponse {
    pub device_id: String,
    pub sensor: SensorSnapshot,
    pub ts: String,
}

/// Errors a gateway handler can surface to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("device not found")]
    DeviceNotFound,
    #[error("missing command")]
    MissingCommand,
}

impl GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::DeviceNotFound => StatusCode::NOT_FOUND,
            GatewayError::MissingCommand => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Builds the gateway router over the given state.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/devices", get(list_devices))
        .route("/devices/:id/info", get(device_info))
        .route("/devices/:id/sensor", get(device_sensor))
        .route("/devices/:id/command", post(device_command))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the gateway listener and serves until the shutdown signal flips
/// to `true`.
///
/// # Errors
///
/// Returns an error when the address cannot be bound or the server fails
/// while running.
pub async fn run_http_server(
    addr: SocketAddr,
    state: GatewayState,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind gateway listener on {addr}"))?;
    serve(listener, state, shutdown_rx).await
}

/// Serves the gateway on an already-bound listener.
///
/// Split out from [`run_http_server`] so callers (and tests) can bind to
/// port 0 and learn the ephemeral address first.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: GatewayState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("gateway listening on {}", listener.local_addr()?);

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // Receiver error means the sender is gone; shut down either way.
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            info!("gateway shutting down");
        })
        .await
        .context("gateway server error")?;
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn root() -> &'static str {
    BANNER
}

async fn list_devices(State(state): State<GatewayState>) -> Json<Vec<StatusSnapshot>> {
    Json(state.registry.status_snapshots())
}

async fn device_info(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<StatusSnapshot>, GatewayError> {
    state
        .registry
        .status_of(&id)
        .map(Json)
        .ok_or(GatewayError::DeviceNotFound)
}

/// Reads are side-effect free: only the telemetry broadcaster advances the
/// sensor walk, so polling this route never perturbs the stream.
async fn device_sensor(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<SensorResponse>, GatewayError> {
    let sensor = state
        .registry
        .sensor_of(&id)
        .ok_or(GatewayError::DeviceNotFound)?;
    Ok(Json(SensorResponse {
        device_id: id,
        sensor,
        ts: chrono::Utc::now().to_rfc3339(),
    }))
}

async fn device_command(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<CommandRequest>,
) -> Result<Json<CommandResult>, GatewayError> {
    let command = body.command.ok_or(GatewayError::MissingCommand)?;
    let result = execute_command(
        &state.registry,
        &state.connections,
        &id,
        &command,
        state.reboot_delay,
        None,
    )
    .await
    .map_err(|CommandError::DeviceNotFound(_)| GatewayError::DeviceNotFound)?;
    Ok(Json(result))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
