//! Domain layer for fleet-server.
//!
//! Pure types with no dependencies on I/O, networking, or the async runtime.
//! Configuration lives here; everything that opens a socket lives in
//! `infrastructure`.

pub mod config;

pub use config::ServerConfig;
