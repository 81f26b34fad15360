//! Fleet-Sim server entry point.
//!
//! Wires together the device registry, the telemetry broadcaster, the
//! WebSocket streaming listener, and the HTTP request gateway, then blocks
//! until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ DeviceRegistry::new()       -- device-1 … device-N, all idle
//!  └─ ConnectionManager::new()    -- streaming session registry
//!  └─ start services
//!       ├─ TelemetryBroadcaster   -- one Tokio task per device
//!       ├─ liveness sweep         -- periodic probe of every session
//!       ├─ HTTP gateway           -- axum server
//!       └─ WS accept loop         -- tokio-tungstenite sessions
//! ```
//!
//! Shutdown order matters: timers stop first so no task publishes into a
//! half-closed connection set, then sessions are closed, then the listeners
//! wind down.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fleet_core::DeviceRegistry;
use fleet_server::domain::ServerConfig;
use fleet_server::infrastructure::{
    bind, run_accept_loop, run_http_server, ConnectionManager, GatewayState,
    SessionContext, TelemetryBroadcaster,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Fleet-Sim device server.
///
/// Simulates a fleet of IoT devices behind an HTTP request gateway and a
/// WebSocket telemetry stream.
#[derive(Debug, Parser)]
#[command(
    name = "fleet-server",
    about = "Simulated IoT device fleet with HTTP and WebSocket surfaces",
    version
)]
struct Cli {
    /// TCP port for the HTTP request gateway.
    #[arg(long, default_value_t = 3000, env = "FLEET_HTTP_PORT")]
    http_port: u16,

    /// TCP port for the WebSocket streaming listener.
    #[arg(long, default_value_t = 3001, env = "FLEET_WS_PORT")]
    ws_port: u16,

    /// IP address both listeners bind to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` for local-only access.
    #[arg(long, default_value = "0.0.0.0", env = "FLEET_BIND")]
    bind: String,

    /// Number of simulated devices (`device-1` … `device-N`).
    #[arg(long, default_value_t = 1, env = "FLEET_DEVICES")]
    devices: usize,

    /// Telemetry broadcast interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "FLEET_BROADCAST_INTERVAL_MS")]
    broadcast_interval_ms: u64,

    /// Liveness sweep interval in seconds.
    ///
    /// A streaming connection that misses two consecutive sweeps is removed.
    #[arg(long, default_value_t = 30, env = "FLEET_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: u64,

    /// Delay in milliseconds before a rebooting device returns to idle.
    #[arg(long, default_value_t = 2000, env = "FLEET_REBOOT_DELAY_MS")]
    reboot_delay_ms: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address, or if the
    /// device count is zero.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        if self.devices == 0 {
            anyhow::bail!("--devices must be at least 1");
        }

        let http_bind_addr: SocketAddr = format!("{}:{}", self.bind, self.http_port)
            .parse()
            .with_context(|| {
                format!("invalid HTTP bind address: '{}:{}'", self.bind, self.http_port)
            })?;
        let ws_bind_addr: SocketAddr = format!("{}:{}", self.bind, self.ws_port)
            .parse()
            .with_context(|| {
                format!("invalid WS bind address: '{}:{}'", self.bind, self.ws_port)
            })?;

        Ok(ServerConfig {
            http_bind_addr,
            ws_bind_addr,
            device_count: self.devices,
            firmware: "1.0.0".to_string(),
            broadcast_interval: Duration::from_millis(self.broadcast_interval_ms),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            reboot_delay: Duration::from_millis(self.reboot_delay_ms),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging; level overridden by RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "fleet-server starting: http={}, ws={}, devices={}",
        config.http_bind_addr, config.ws_bind_addr, config.device_count
    );

    // ── Shared components ─────────────────────────────────────────────────────
    let registry = Arc::new(DeviceRegistry::new(config.device_count, &config.firmware));
    let connections = Arc::new(ConnectionManager::new());
    let broadcaster = Arc::new(TelemetryBroadcaster::new(
        Arc::clone(&registry),
        Arc::clone(&connections),
        config.broadcast_interval,
    ));

    // Shutdown plumbing: the atomic flag stops the accept loop, the watch
    // channel stops the gateway and the sweep.
    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── HTTP request gateway ──────────────────────────────────────────────────
    let gateway_state = GatewayState {
        registry: Arc::clone(&registry),
        connections: Arc::clone(&connections),
        reboot_delay: config.reboot_delay,
    };
    let http_addr = config.http_bind_addr;
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = run_http_server(http_addr, gateway_state, http_shutdown).await {
            error!("gateway failed: {e:#}");
        }
    });

    // ── WebSocket streaming listener ──────────────────────────────────────────
    let listener = bind(config.ws_bind_addr).await?;
    let session_ctx = SessionContext {
        registry: Arc::clone(&registry),
        connections: Arc::clone(&connections),
        reboot_delay: config.reboot_delay,
    };
    let accept_running = Arc::clone(&running);
    let ws_task = tokio::spawn(async move {
        if let Err(e) = run_accept_loop(listener, session_ctx, accept_running).await {
            error!("streaming accept loop failed: {e:#}");
        }
    });

    // ── Liveness sweep ────────────────────────────────────────────────────────
    let sweep_connections = Arc::clone(&connections);
    let sweep_interval = config.sweep_interval;
    let mut sweep_shutdown = shutdown_rx.clone();
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        // The first tick fires immediately; skip it so the first real sweep
        // happens one full interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = sweep_connections.sweep().await;
                    if !reaped.is_empty() {
                        warn!("liveness sweep removed {} stale connection(s)", reaped.len());
                    }
                }
                _ = sweep_shutdown.changed() => {
                    if *sweep_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // ── Telemetry ─────────────────────────────────────────────────────────────
    broadcaster.start_all().await;
    info!(
        "fleet-server ready: {} device(s) broadcasting every {:?}",
        config.device_count, config.broadcast_interval
    );

    // ── Wait for Ctrl-C ───────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown signal received");

    // Ordered shutdown: stop publishing, then drop sessions, then stop the
    // listeners.
    broadcaster.stop_all().await;
    let _ = shutdown_tx.send(true);
    connections.close_all().await;
    running.store(false, Ordering::Relaxed);

    let _ = sweep_task.await;
    let _ = ws_task.await;
    let _ = http_task.await;

    info!("fleet-server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
