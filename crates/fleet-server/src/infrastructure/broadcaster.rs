//! Telemetry broadcaster: per-device sensor timers.
//!
//! Each device gets its own Tokio task that ticks on the broadcast interval,
//! advances the device's sensor walk, and hands the fresh snapshot to the
//! [`ConnectionManager`] for filtered fan-out.  Fan-out is a queue push, so
//! a slow subscriber never delays the tick.
//!
//! Starting a device that is already broadcasting is a no-op, as is stopping
//! one that is not running.  Shutdown is explicit and awaited: a watch
//! channel tells every task to stop and [`TelemetryBroadcaster::stop_all`]
//! joins them before returning, so no tick can race a closing transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use fleet_core::{DeviceRegistry, ServerMessage};

use crate::infrastructure::connection_manager::ConnectionManager;

/// Owns one broadcast task per device.
pub struct TelemetryBroadcaster {
    registry: Arc<DeviceRegistry>,
    connections: Arc<ConnectionManager>,
    interval: Duration,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TelemetryBroadcaster {
    /// Creates a broadcaster; no tasks run until `start` / `start_all`.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        connections: Arc<ConnectionManager>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry,
            connections,
            interval,
            tasks: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    /// Starts broadcasting for every device in the registry.
    pub async fn start_all(&self) {
        for device_id in self.registry.device_ids() {
            self.start(&device_id).await;
        }
    }

    /// Starts the broadcast task for one device.
    ///
    /// Returns `false` when the device is unknown or already broadcasting
    /// (a second start while running is a no-op).
    pub async fn start(&self, device_id: &str) -> bool {
        if !self.registry.contains(device_id) {
            return false;
        }
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(device_id) {
            return false;
        }

        let registry = Arc::clone(&self.registry);
        let connections = Arc::clone(&self.connections);
        let tick_interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let id = device_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(tick_interval);
            // The first tick resolves immediately; skip it so the first
            // sensor event goes out one full interval after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(snapshot) = registry.advance_sensor(&id) else {
                            break;
                        };
                        let delivered = connections
                            .broadcast_sensor(&id, ServerMessage::sensor(&id, snapshot))
                            .await;
                        debug!("device {id}: sensor event to {delivered} connection(s)");
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("device {id}: broadcast task stopping");
                        break;
                    }
                }
            }
        });

        tasks.insert(device_id.to_string(), handle);
        info!("device {device_id}: telemetry broadcast started");
        true
    }

    /// Stops the broadcast task for one device.
    ///
    /// Returns `false` when no task was running (stop is a no-op then).
    pub async fn stop(&self, device_id: &str) -> bool {
        let handle = self.tasks.lock().await.remove(device_id);
        match handle {
            Some(handle) => {
                handle.abort();
                // A JoinError from the abort is expected here.
                let _ = handle.await;
                info!("device {device_id}: telemetry broadcast stopped");
                true
            }
            None => false,
        }
    }

    /// `true` while the device's broadcast task is running.
    pub async fn is_running(&self, device_id: &str) -> bool {
        self.tasks.lock().await.contains_key(device_id)
    }

    /// Signals every broadcast task to stop and waits for each one to
    /// finish.  Called first in the shutdown sequence, before connections
    /// are closed.
    pub async fn stop_all(&self) {
        // Receivers observe the change on their next loop iteration.
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for (device_id, handle) in tasks.drain() {
            let _ = handle.await;
            debug!("device {device_id}: broadcast task joined");
        }
        info!("all telemetry broadcast tasks stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
