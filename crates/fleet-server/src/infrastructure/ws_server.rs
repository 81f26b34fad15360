//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured streaming address.
//! 2. Accepting incoming connections and upgrading them to WebSocket.
//! 3. Registering each session with the [`ConnectionManager`] and sending
//!    the `welcome` message.
//! 4. Running two halves per session:
//!    - **Writer task**: drains the connection's outbound queue into the
//!      socket (protocol messages as text frames, liveness probes as ping
//!      frames).
//!    - **Reader loop**: parses inbound JSON control messages (`subscribe`,
//!      `command`), answers pongs, and deregisters on close.
//! 5. Exiting cleanly when the shared `running` flag is cleared.
//!
//! Each session runs in its own Tokio task: the accept loop never blocks on
//! a session, and one misbehaving client never affects another.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use fleet_core::{ClientMessage, CommandError, DeviceRegistry, ServerMessage};

use crate::application::commands::execute_command;
use crate::application::subscriptions::SubscriptionFilter;
use crate::infrastructure::connection_manager::{
    ConnectionId, ConnectionManager, OutboundFrame,
};

/// Body of the `welcome` message sent on every new connection.
pub const WELCOME_MSG: &str = "connected to fleet-sim server";

/// Everything a streaming session needs, shared across session tasks.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<DeviceRegistry>,
    pub connections: Arc<ConnectionManager>,
    pub reboot_delay: Duration,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the streaming TCP listener.
///
/// Split out from [`run_accept_loop`] so callers (and tests) can learn the
/// bound address before the loop starts — binding to port 0 picks a free
/// ephemeral port.
///
/// # Errors
///
/// Returns an error when the address cannot be bound (port in use, no
/// permission).
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind streaming listener on {addr}"))?;
    info!("streaming listener on {}", listener.local_addr()?);
    Ok(listener)
}

/// Runs the accept loop until `running` is set to `false`.
///
/// Each accepted connection is handed to a dedicated Tokio task.  The loop
/// polls the `running` flag every 200 ms so shutdown is never blocked on a
/// quiet listener.
pub async fn run_accept_loop(
    listener: TcpListener,
    ctx: SessionContext,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping streaming accept loop");
            break;
        }

        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new streaming connection from {peer_addr}");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    handle_session(stream, peer_addr, ctx).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep serving the others.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout with no connection; loop back to check the flag.
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point for each session task; wraps [`run_session`] and logs the
/// outcome so `?` stays usable inside.
async fn handle_session(stream: TcpStream, peer_addr: SocketAddr, ctx: SessionContext) {
    match run_session(stream, peer_addr, ctx).await {
        Ok(()) => info!("session {peer_addr} closed normally"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one streaming session.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: SessionContext,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (conn_id, mut frames) = ctx.connections.register().await;
    debug!("session {peer_addr}: registered as connection {conn_id}");

    // Writer task: single consumer of this connection's outbound queue, so
    // every queued message reaches the socket in generation order.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let ws_msg = match frame {
                OutboundFrame::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(json) => WsMessage::Text(json),
                    Err(e) => {
                        error!("connection {conn_id}: serialization error: {e}");
                        continue;
                    }
                },
                OutboundFrame::Probe => WsMessage::Ping(Vec::new()),
            };
            if ws_tx.send(ws_msg).await.is_err() {
                break;
            }
        }
        // Queue closed: the manager dropped us (reaped or shutting down).
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    });

    ctx.connections
        .send_to(conn_id, ServerMessage::welcome(WELCOME_MSG))
        .await;

    // Reader loop: runs until the peer closes or errors out.
    while let Some(next) = ws_rx.next().await {
        let ws_msg = match next {
            Ok(msg) => msg,
            Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                debug!("connection {conn_id}: closed by peer");
                break;
            }
            Err(e) => {
                warn!("connection {conn_id}: WebSocket error: {e}");
                break;
            }
        };

        match ws_msg {
            WsMessage::Text(text) => {
                handle_client_text(&ctx, conn_id, &text).await;
            }
            WsMessage::Pong(_) => {
                // Answer to a liveness probe.
                ctx.connections.mark_alive(conn_id).await;
            }
            WsMessage::Ping(_) => {
                // tokio-tungstenite queues the pong reply automatically.
                debug!("connection {conn_id}: ping");
            }
            WsMessage::Binary(_) => {
                warn!("connection {conn_id}: unexpected binary frame (ignored)");
            }
            WsMessage::Close(_) => {
                debug!("connection {conn_id}: close frame received");
                break;
            }
            WsMessage::Frame(_) => {
                debug!("connection {conn_id}: raw frame (ignored)");
            }
        }
    }

    // Deregister; dropping the handle closes the queue and ends the writer.
    ctx.connections.remove(conn_id).await;
    let _ = writer.await;
    Ok(())
}

// ── Inbound message dispatch ──────────────────────────────────────────────────

/// Parses and dispatches one inbound text frame.
///
/// Malformed payloads produce an `error` reply on this connection only;
/// other connections never see them.
async fn handle_client_text(ctx: &SessionContext, conn_id: ConnectionId, text: &str) {
    // Two-stage parse so the reply distinguishes invalid JSON from a JSON
    // object the protocol does not recognize.
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            ctx.connections
                .send_to(conn_id, ServerMessage::error("invalid JSON"))
                .await;
            return;
        }
    };
    let msg: ClientMessage = match serde_json::from_value(value) {
        Ok(m) => m,
        Err(_) => {
            ctx.connections
                .send_to(conn_id, ServerMessage::error("unknown message type"))
                .await;
            return;
        }
    };

    match msg {
        ClientMessage::Subscribe { device_ids } => {
            let applied = ctx
                .connections
                .set_filter(conn_id, SubscriptionFilter::limited_to(device_ids))
                .await;
            if let Some(filter) = applied {
                debug!(
                    "connection {conn_id}: filter set to {:?}",
                    filter.device_ids()
                );
                ctx.connections
                    .send_to(
                        conn_id,
                        ServerMessage::Subscribed {
                            device_ids: filter.device_ids().to_vec(),
                        },
                    )
                    .await;
            }
        }

        ClientMessage::Command { device_id, command } => {
            match execute_command(
                &ctx.registry,
                &ctx.connections,
                &device_id,
                &command,
                ctx.reboot_delay,
                Some(conn_id),
            )
            .await
            {
                Ok(result) => {
                    debug!(
                        "connection {conn_id}: command '{}' on {} -> {:?}",
                        result.command, result.device_id, result.result
                    );
                }
                Err(CommandError::DeviceNotFound(id)) => {
                    debug!("connection {conn_id}: command for unknown device {id}");
                    ctx.connections
                        .send_to(conn_id, ServerMessage::error("device not found"))
                        .await;
                }
            }
        }
    }
}
