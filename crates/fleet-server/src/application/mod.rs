//! Application layer for fleet-server.
//!
//! Orchestration and policy that both transport surfaces share:
//!
//! - The subscription filter rule deciding which connections receive which
//!   sensor events.
//! - The command dispatch path used by the HTTP gateway and the streaming
//!   handler alike: process the command, schedule the reboot revert, fan
//!   out the `command_executed` notice.
//!
//! Socket handling, WebSocket framing, and HTTP routing do NOT belong here —
//! that is the infrastructure layer.

pub mod commands;
pub mod subscriptions;

pub use commands::execute_command;
pub use subscriptions::SubscriptionFilter;
