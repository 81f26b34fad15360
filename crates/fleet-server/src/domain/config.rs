//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It can be constructed from CLI arguments (production) or from defaults
//! (local development and tests).  The domain keeps it a plain struct: no
//! global state, no environment reads — `main.rs` populates it.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the fleet server.
///
/// Build this once at startup and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the HTTP request gateway.
    pub http_bind_addr: SocketAddr,

    /// Bind address for the WebSocket streaming listener.
    pub ws_bind_addr: SocketAddr,

    /// How many simulated devices to create at startup
    /// (`device-1` … `device-N`).
    pub device_count: usize,

    /// Firmware version every device reports.
    pub firmware: String,

    /// How often each device advances its sensor walk and broadcasts a
    /// telemetry event.
    pub broadcast_interval: Duration,

    /// How often the liveness sweep probes streaming connections.  A
    /// connection that misses two consecutive sweeps is removed.
    pub sweep_interval: Duration,

    /// Delay between a `reboot` command and the autonomous revert to `idle`.
    pub reboot_delay: Duration,
}

impl Default for ServerConfig {
    /// Returns a `ServerConfig` suitable for local development.
    ///
    /// | Field              | Default         |
    /// |--------------------|-----------------|
    /// | http_bind_addr     | `0.0.0.0:3000`  |
    /// | ws_bind_addr       | `0.0.0.0:3001`  |
    /// | device_count       | 1               |
    /// | firmware           | `1.0.0`         |
    /// | broadcast_interval | 5 seconds       |
    /// | sweep_interval     | 30 seconds      |
    /// | reboot_delay       | 2 seconds       |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address strings.
            http_bind_addr: "0.0.0.0:3000".parse().unwrap(),
            ws_bind_addr: "0.0.0.0:3001".parse().unwrap(),
            device_count: 1,
            firmware: "1.0.0".to_string(),
            broadcast_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(30),
            reboot_delay: Duration::from_millis(2000),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_http_port_is_3000() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_bind_addr.port(), 3000);
    }

    #[test]
    fn test_default_ws_port_is_3001() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ws_bind_addr.port(), 3001);
    }

    #[test]
    fn test_default_fleet_is_one_device() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.device_count, 1);
        assert_eq!(cfg.firmware, "1.0.0");
    }

    #[test]
    fn test_default_timings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.broadcast_interval, Duration::from_secs(5));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(30));
        assert_eq!(cfg.reboot_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_config_can_be_cloned() {
        let cfg = ServerConfig::default();
        let cloned = cfg.clone();
        assert_eq!(cfg.http_bind_addr, cloned.http_bind_addr);
        assert_eq!(cfg.ws_bind_addr, cloned.ws_bind_addr);
    }
}
