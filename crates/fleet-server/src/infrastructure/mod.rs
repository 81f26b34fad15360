//! Infrastructure layer: everything that touches the network or the clock.
//!
//! - [`connection_manager`]: the registry of live streaming sessions and the
//!   fan-out primitives built on it.
//! - [`broadcaster`]: per-device periodic telemetry publication.
//! - [`ws_server`]: the WebSocket accept loop and session lifecycle.
//! - [`http_gateway`]: the request/response HTTP surface.

pub mod broadcaster;
pub mod connection_manager;
pub mod http_gateway;
pub mod ws_server;

pub use broadcaster::TelemetryBroadcaster;
pub use connection_manager::{ConnectionId, ConnectionManager, OutboundFrame};
pub use http_gateway::{build_router, run_http_server, GatewayState};
pub use ws_server::{bind, run_accept_loop, SessionContext};
