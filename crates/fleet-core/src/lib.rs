//! # fleet-core
//!
//! Shared library for Fleet-Sim containing the simulated device model, the
//! device registry, the command processor, and the JSON wire message types.
//!
//! This crate is used by the server binary and by anything that wants to talk
//! its protocol.  It has zero dependencies on async runtimes, sockets, or
//! UI frameworks.
//!
//! # Architecture overview
//!
//! Fleet-Sim models a small fleet of network-attached devices entirely in
//! software: each device has an identity, a firmware version, a status, and a
//! pair of synthetic sensor readings that follow a bounded random walk.  The
//! server exposes that state over HTTP and streams it over WebSocket; this
//! crate defines everything both surfaces share:
//!
//! - **`device`** – The simulated device itself: status snapshots, sensor
//!   snapshots, and the command state machine (`reboot` / `led:on` /
//!   `led:off`).
//!
//! - **`registry`** – The fixed, ordered set of devices created at process
//!   start (`device-1` … `device-N`), with all per-device locking centralized
//!   behind its API.
//!
//! - **`command`** – The command processor used by both ingress paths (HTTP
//!   and streaming), which distinguishes "device not found" from a rejected
//!   command.
//!
//! - **`protocol`** – The JSON messages exchanged over the streaming
//!   connection, tagged with a `type` discriminator.

pub mod command;
pub mod device;
pub mod protocol;
pub mod registry;

// Re-export the most-used types at the crate root so callers can write
// `fleet_core::Device` instead of `fleet_core::device::Device`.
pub use command::{process_command, CommandError, CommandOutcome};
pub use device::{
    CommandResult, Device, DeviceStatus, RebootTicket, SensorSnapshot, StatusSnapshot, Verdict,
};
pub use protocol::messages::{ClientMessage, ServerMessage};
pub use registry::DeviceRegistry;
