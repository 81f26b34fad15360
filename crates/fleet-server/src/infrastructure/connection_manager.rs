//! ConnectionManager: the live set of streaming connections, fan-out, and
//! liveness reaping.
//!
//! Every accepted WebSocket session registers here and receives an unbounded
//! outbound queue.  Producers (the telemetry broadcaster, the command notice
//! path, per-connection replies) only ever push onto that queue, so a slow
//! or stalled peer can never delay device mutation or delivery to other
//! connections — its frames pile up in its own queue until the liveness
//! sweep reaps it.
//!
//! # Liveness
//!
//! On every sweep the manager first removes each connection that did not
//! answer the previous probe, then flags the survivors as unanswered and
//! enqueues a fresh probe (a WebSocket ping frame, emitted by the session's
//! writer task).  A client that vanished without a clean close is therefore
//! gone after missing two consecutive sweeps.
//!
//! # Ownership
//!
//! The manager exclusively owns the connection set.  Nothing outside this
//! module holds a connection handle beyond the duration of one broadcast
//! iteration.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use fleet_core::ServerMessage;

use crate::application::subscriptions::SubscriptionFilter;

/// Identifier assigned to each streaming connection at registration.
pub type ConnectionId = Uuid;

/// What the session writer task pulls off a connection's outbound queue.
#[derive(Debug)]
pub enum OutboundFrame {
    /// A protocol message to serialize and send as a text frame.
    Message(ServerMessage),
    /// A liveness probe to send as a WebSocket ping frame.
    Probe,
}

impl OutboundFrame {
    /// The message inside, or `None` for a probe.  Used by tests.
    pub fn into_message(self) -> Option<ServerMessage> {
        match self {
            OutboundFrame::Message(msg) => Some(msg),
            OutboundFrame::Probe => None,
        }
    }
}

/// Per-connection record: outbound queue, liveness flag, device filter.
#[derive(Debug)]
struct ConnectionHandle {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    alive: bool,
    filter: SubscriptionFilter,
}

/// The connection manager.
///
/// Shared behind an `Arc` between the WebSocket server (add/remove/liveness),
/// the telemetry broadcaster (filtered fan-out), and the command path
/// (universal notices).
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection: marked live, filtered to all devices.
    ///
    /// Returns the connection id and the receiving end of its outbound
    /// queue, which the session's writer task drains into the socket.
    pub async fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<OutboundFrame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            tx,
            alive: true,
            filter: SubscriptionFilter::all(),
        };
        self.connections.write().await.insert(id, handle);
        debug!("connection {id}: registered");
        (id, rx)
    }

    /// Removes a connection, closing its outbound queue.
    ///
    /// Returns `false` when the id was already gone (remove is idempotent).
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id).is_some();
        if removed {
            debug!("connection {id}: removed");
        }
        removed
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Replaces a connection's device filter, returning the filter now in
    /// effect (`None` when the connection is gone).
    pub async fn set_filter(
        &self,
        id: ConnectionId,
        filter: SubscriptionFilter,
    ) -> Option<SubscriptionFilter> {
        let mut connections = self.connections.write().await;
        let handle = connections.get_mut(&id)?;
        handle.filter = filter;
        Some(handle.filter.clone())
    }

    /// Marks a connection as having answered the last probe.
    pub async fn mark_alive(&self, id: ConnectionId) {
        if let Some(handle) = self.connections.write().await.get_mut(&id) {
            handle.alive = true;
        }
    }

    /// Sends one message to one connection.
    ///
    /// Returns `false` (and removes the connection) when its queue is
    /// closed — the writer task is gone, so the socket is too.
    pub async fn send_to(&self, id: ConnectionId, msg: ServerMessage) -> bool {
        let mut connections = self.connections.write().await;
        let sent = match connections.get(&id) {
            Some(handle) => handle.tx.send(OutboundFrame::Message(msg)).is_ok(),
            None => return false,
        };
        if !sent {
            connections.remove(&id);
            debug!("connection {id}: send failed, removed");
        }
        sent
    }

    /// Fans a sensor event out to every live connection whose filter wants
    /// `device_id`.  Returns the number of connections it was queued for.
    ///
    /// Delivery failures are isolated: a closed queue removes only that
    /// connection.
    pub async fn broadcast_sensor(&self, device_id: &str, msg: ServerMessage) -> usize {
        self.broadcast_where(|filter| filter.wants(device_id), msg)
            .await
    }

    /// Fans a message out to every connection, ignoring device filters.
    /// Used for `command_executed` notices.
    pub async fn broadcast_all(&self, msg: ServerMessage) -> usize {
        self.broadcast_where(|_| true, msg).await
    }

    async fn broadcast_where(
        &self,
        pred: impl Fn(&SubscriptionFilter) -> bool,
        msg: ServerMessage,
    ) -> usize {
        let mut connections = self.connections.write().await;
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, handle) in connections.iter() {
            if !pred(&handle.filter) {
                continue;
            }
            if handle.tx.send(OutboundFrame::Message(msg.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }

        for id in dead {
            connections.remove(&id);
            debug!("connection {id}: broadcast send failed, removed");
        }
        delivered
    }

    /// One liveness cycle: reap connections that never answered the previous
    /// probe, then probe the survivors.
    ///
    /// Returns the ids that were reaped.
    pub async fn sweep(&self) -> Vec<ConnectionId> {
        let mut connections = self.connections.write().await;

        let reaped: Vec<ConnectionId> = connections
            .iter()
            .filter(|(_, handle)| !handle.alive)
            .map(|(id, _)| *id)
            .collect();
        for id in &reaped {
            connections.remove(id);
            debug!("connection {id}: unresponsive, reaped");
        }

        let mut probe_failed = Vec::new();
        for (id, handle) in connections.iter_mut() {
            handle.alive = false;
            if handle.tx.send(OutboundFrame::Probe).is_err() {
                probe_failed.push(*id);
            }
        }
        for id in probe_failed {
            connections.remove(&id);
            debug!("connection {id}: probe send failed, removed");
        }

        reaped
    }

    /// Drops every connection, closing all outbound queues.  The session
    /// writer tasks observe the closed queues and shut their sockets.
    pub async fn close_all(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        debug!("closed all {count} connection(s)");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
