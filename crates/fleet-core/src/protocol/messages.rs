//! Message types for the client-facing streaming protocol.
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant; all other fields are flattened into the same object:
//!
//! ```json
//! {"type":"subscribe","deviceIds":["device-1"]}
//! {"type":"sensor","deviceId":"device-1","data":{"temp":23.4,"humidity":51.2},"ts":"2026-08-29T12:00:00Z"}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles this automatically;
//! variant names map to snake_case tags (`command_ack`, `command_executed`)
//! and field names to camelCase keys (`deviceId`, `deviceIds`).
//!
//! # Why separate client→server and server→client message types?
//!
//! The two directions carry different information: clients send control
//! messages (subscribe, command), the server sends events and replies.  Two
//! enums make the asymmetry a compile-time property.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::{CommandResult, SensorSnapshot};

// ── Client → Server messages ──────────────────────────────────────────────────

/// All messages a client may send over a streaming connection.
///
/// # Serde representation
///
/// ```json
/// {"type":"subscribe","deviceIds":["device-1","device-2"]}
/// {"type":"command","deviceId":"device-1","command":"led:on"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace this connection's device filter.
    ///
    /// An empty (or omitted) list means "receive sensor events for all
    /// devices" — the default for a fresh connection.
    #[serde(rename_all = "camelCase")]
    Subscribe {
        #[serde(default)]
        device_ids: Vec<String>,
    },

    /// Apply a command to one device.
    ///
    /// The server replies with `command_ack` on this connection and fans a
    /// `command_executed` notice out to every connection.
    #[serde(rename_all = "camelCase")]
    Command { device_id: String, command: String },
}

// ── Server → Client messages ──────────────────────────────────────────────────

/// All messages the server sends over a streaming connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message after the connection is accepted.
    Welcome { msg: String, ts: DateTime<Utc> },

    /// Periodic telemetry event; delivered subject to the connection's
    /// device filter.
    #[serde(rename_all = "camelCase")]
    Sensor {
        device_id: String,
        data: SensorSnapshot,
        ts: DateTime<Utc>,
    },

    /// Acknowledges a `subscribe`, echoing the filter now in effect.
    #[serde(rename_all = "camelCase")]
    Subscribed { device_ids: Vec<String> },

    /// Direct reply to the connection that sent a `command`.
    CommandAck { result: CommandResult },

    /// Notice broadcast to *every* connection after a command ran,
    /// regardless of device filters.
    #[serde(rename_all = "camelCase")]
    CommandExecuted {
        device_id: String,
        result: CommandResult,
        ts: DateTime<Utc>,
    },

    /// Per-connection error reply (malformed payload, unknown device, …).
    Error { error: String },
}

impl ServerMessage {
    /// Builds the connect-time `welcome` message.
    pub fn welcome(msg: impl Into<String>) -> Self {
        ServerMessage::Welcome {
            msg: msg.into(),
            ts: Utc::now(),
        }
    }

    /// Builds a `sensor` telemetry event stamped with the current time.
    pub fn sensor(device_id: impl Into<String>, data: SensorSnapshot) -> Self {
        ServerMessage::Sensor {
            device_id: device_id.into(),
            data,
            ts: Utc::now(),
        }
    }

    /// Builds the universal `command_executed` notice.
    pub fn command_executed(result: CommandResult) -> Self {
        ServerMessage::CommandExecuted {
            device_id: result.device_id.clone(),
            result,
            ts: Utc::now(),
        }
    }

    /// Builds a per-connection `error` reply.
    pub fn error(error: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
