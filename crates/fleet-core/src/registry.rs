//! The device registry: the fixed, ordered set of simulated devices.
//!
//! The registry is constructed once at process start with a device count and
//! never changes shape afterwards — devices are neither added nor removed
//! while the process runs.  Identifiers follow the stable naming scheme
//! `device-1` … `device-N`.
//!
//! # Locking
//!
//! Sensor advancement, command application, and snapshot reads are all
//! read-modify-write or read operations that may arrive from different tasks
//! on a multi-threaded runtime, so each device sits behind its own mutex.
//! All locking is centralized in this module: the guards never escape, and
//! no lock is ever held across an await point (this crate has none).  A
//! poisoned mutex is treated as still-usable — a panic in one snapshot must
//! not take out the whole fleet.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::device::{
    CommandResult, Device, RebootTicket, SensorSnapshot, StatusSnapshot,
};

/// Owns every [`Device`] for the lifetime of the process.
///
/// Shared across request handlers, streaming sessions, and the telemetry
/// broadcaster (wrap it in an `Arc`).  Lookup is a linear scan — the fleet
/// is small and fixed.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: Vec<(String, Mutex<Device>)>,
}

impl DeviceRegistry {
    /// Creates `count` devices named `device-1` … `device-count`, all
    /// reporting the given firmware version.
    pub fn new(count: usize, firmware: &str) -> Self {
        let devices = (1..=count)
            .map(|n| {
                let id = format!("device-{n}");
                let device = Device::new(id.clone(), firmware);
                (id, Mutex::new(device))
            })
            .collect();
        Self { devices }
    }

    /// Number of devices in the fleet.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// `true` when the fleet was created with a count of zero.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// `true` when the identifier resolves to a device.
    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.iter().any(|(id, _)| id == device_id)
    }

    /// The device identifiers in creation order.
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Status snapshots for every device, in creation order.
    pub fn status_snapshots(&self) -> Vec<StatusSnapshot> {
        self.devices
            .iter()
            .map(|(_, device)| lock(device).status_snapshot())
            .collect()
    }

    /// Status snapshot for one device, or `None` when the id is unknown.
    pub fn status_of(&self, device_id: &str) -> Option<StatusSnapshot> {
        self.with_device(device_id, |device| device.status_snapshot())
    }

    /// Sensor snapshot for one device, or `None` when the id is unknown.
    pub fn sensor_of(&self, device_id: &str) -> Option<SensorSnapshot> {
        self.with_device(device_id, |device| device.sensor())
    }

    /// Advances one device's sensor walk and returns the new readings.
    ///
    /// Called by the telemetry broadcaster on every tick.
    pub fn advance_sensor(&self, device_id: &str) -> Option<SensorSnapshot> {
        self.with_device(device_id, |device| {
            device.advance_sensor();
            device.sensor()
        })
    }

    /// Applies a command to one device.
    ///
    /// Returns `None` when the id is unknown; otherwise the structured
    /// result plus the reboot ticket when a revert needs scheduling.
    pub fn apply_command(
        &self,
        device_id: &str,
        command: &str,
    ) -> Option<(CommandResult, Option<RebootTicket>)> {
        self.with_device(device_id, |device| device.apply_command(command))
    }

    /// Completes a pending reboot revert.  Unknown ids and stale tickets are
    /// ignored.
    pub fn finish_reboot(&self, device_id: &str, ticket: RebootTicket) {
        self.with_device(device_id, |device| device.finish_reboot(ticket));
    }

    fn with_device<T>(&self, device_id: &str, f: impl FnOnce(&mut Device) -> T) -> Option<T> {
        self.devices
            .iter()
            .find(|(id, _)| id == device_id)
            .map(|(_, device)| f(&mut lock(device)))
    }
}

/// Locks a device, recovering from poisoning instead of propagating it.
fn lock(device: &Mutex<Device>) -> MutexGuard<'_, Device> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceStatus, Verdict};

    #[test]
    fn test_new_creates_count_devices() {
        let registry = DeviceRegistry::new(3, "1.0.0");
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_naming_scheme_is_stable_and_ordered() {
        let registry = DeviceRegistry::new(3, "1.0.0");
        assert_eq!(
            registry.device_ids(),
            vec!["device-1", "device-2", "device-3"]
        );
    }

    #[test]
    fn test_contains_known_and_unknown_ids() {
        let registry = DeviceRegistry::new(2, "1.0.0");
        assert!(registry.contains("device-1"));
        assert!(registry.contains("device-2"));
        assert!(!registry.contains("device-3"));
        assert!(!registry.contains("gadget-1"));
    }

    #[test]
    fn test_status_snapshots_preserve_creation_order() {
        let registry = DeviceRegistry::new(2, "1.0.0");
        let snaps = registry.status_snapshots();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].id, "device-1");
        assert_eq!(snaps[1].id, "device-2");
        assert!(snaps.iter().all(|s| s.status == DeviceStatus::Idle));
    }

    #[test]
    fn test_status_of_unknown_device_is_none() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        assert!(registry.status_of("device-9").is_none());
        assert!(registry.sensor_of("device-9").is_none());
    }

    #[test]
    fn test_apply_command_routes_to_the_right_device() {
        let registry = DeviceRegistry::new(2, "1.0.0");
        let (result, _) = registry.apply_command("device-2", "led:on").unwrap();
        assert_eq!(result.device_id, "device-2");
        assert_eq!(result.result, Verdict::Ok);

        // Only device-2 changed.
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::Idle
        );
        assert_eq!(
            registry.status_of("device-2").unwrap().status,
            DeviceStatus::LedOn
        );
    }

    #[test]
    fn test_apply_command_unknown_device_is_none() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        assert!(registry.apply_command("device-9", "reboot").is_none());
    }

    #[test]
    fn test_advance_sensor_changes_readings() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        let after = registry.advance_sensor("device-1").unwrap();
        assert!((20.0..=35.0).contains(&after.temp));
        assert!((30.0..=80.0).contains(&after.humidity));
        // The snapshot read back matches what the tick returned.
        assert_eq!(registry.sensor_of("device-1").unwrap(), after);
    }

    #[test]
    fn test_finish_reboot_through_registry() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        let (_, ticket) = registry.apply_command("device-1", "reboot").unwrap();
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::Rebooting
        );
        registry.finish_reboot("device-1", ticket.unwrap());
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::Idle
        );
    }
}
