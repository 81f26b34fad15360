//! fleet-server library crate.
//!
//! This crate is the network-facing half of Fleet-Sim: it exposes the
//! simulated device fleet over HTTP and streams live telemetry over a JSON
//! WebSocket protocol.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! HTTP client                 Streaming client
//!     ↕ (JSON over HTTP)          ↕ (JSON over WebSocket)
//! [fleet-server]
//!   ├── domain/           ServerConfig (pure settings, no I/O)
//!   ├── application/      Subscription filter policy, command dispatch
//!   └── infrastructure/
//!         ├── http_gateway/       axum router for status + command routes
//!         ├── ws_server/          WebSocket accept loop and session tasks
//!         ├── connection_manager/ live connection set, fan-out, liveness
//!         └── broadcaster/        per-device telemetry timers
//!                 ↕
//! fleet-core  (device model, registry, command processor, wire messages)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `fleet-core`, plus the runtime
//!   for scheduling the delayed reboot revert.
//! - `infrastructure` depends on everything plus `tokio`, `tungstenite`,
//!   and `axum`.

/// Domain layer: runtime configuration.
pub mod domain;

/// Application layer: subscription policy and the shared command path.
pub mod application;

/// Infrastructure layer: HTTP gateway, WebSocket server, connection set,
/// telemetry broadcaster.
pub mod infrastructure;
