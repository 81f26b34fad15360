//! The simulated device model.
//!
//! A [`Device`] holds the full mutable state of one simulated endpoint:
//! identity, firmware version, uptime origin, status, and a pair of synthetic
//! sensor readings.  Nothing in this module performs I/O; timers and fan-out
//! live in the server crate.
//!
//! # The status state machine
//!
//! ```text
//!            led:on                    reboot
//!   idle ───────────→ led_on   idle ───────────→ rebooting
//!    ↑                   │       ↑                    │
//!    └─────── led:off ───┘       └── (after delay) ───┘
//! ```
//!
//! Transitions are driven only by the three recognized commands plus the one
//! autonomous `rebooting → idle` timeout.  Any other command string is a
//! no-op that produces an `error` result — never a fault.
//!
//! # The reboot epoch
//!
//! `reboot` schedules a revert to `idle` that the *caller* fires after a
//! fixed delay (2000 ms by default).  Each reboot bumps an epoch counter and
//! the returned [`RebootTicket`] carries it; [`Device::finish_reboot`] only
//! completes the transition when the ticket is still the latest one.  A
//! newer reboot therefore invalidates an older pending revert, which keeps
//! the "revert fires no earlier than the delay" guarantee even when reboots
//! overlap.

use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ── Status and snapshots ──────────────────────────────────────────────────────

/// The device status reported in every status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Powered on, LED off, nothing in progress.
    Idle,
    /// The LED was switched on by a `led:on` command.
    LedOn,
    /// A `reboot` command is in progress; reverts to [`DeviceStatus::Idle`]
    /// after the configured delay.
    Rebooting,
}

/// Point-in-time view of a device, as returned by [`Device::status_snapshot`].
///
/// `uptime` is derived from the uptime origin at read time; `heap` is a
/// fresh uniform random value on every call (it emulates a memory-usage
/// report and is not device state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub id: String,
    pub firmware: String,
    /// Seconds since process start or since the last `reboot`.
    pub uptime: u64,
    /// Synthetic free-heap reading in bytes, uniform in `[20_000, 100_000)`.
    pub heap: u64,
    pub status: DeviceStatus,
}

/// Current sensor readings.
///
/// `temp` stays within `[20, 35]` °C and `humidity` within `[30, 80]` %RH,
/// both rounded to two decimal places by the sensor walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub temp: f64,
    pub humidity: f64,
}

// ── Command results ───────────────────────────────────────────────────────────

/// Whether a command was applied (`ok`) or rejected (`error`).
///
/// A rejected command is a normal negative result, not an error path: the
/// device state is untouched and the caller still gets a structured reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    Error,
}

/// Structured result of applying one command to one device.
///
/// Serializes with camelCase keys to match the wire format:
///
/// ```json
/// {"deviceId":"device-1","command":"led:on","result":"ok","info":"led on"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub device_id: String,
    pub command: String,
    pub result: Verdict,
    /// Human-readable detail ("rebooting", "led on", "unknown command", …).
    pub info: String,
}

impl CommandResult {
    /// Returns `true` when the command was applied.
    pub fn is_ok(&self) -> bool {
        self.result == Verdict::Ok
    }
}

/// Proof that a `reboot` was accepted, identifying which reboot it was.
///
/// The caller schedules [`Device::finish_reboot`] with this ticket after the
/// configured delay.  Only the ticket from the most recent reboot completes
/// the `rebooting → idle` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootTicket {
    epoch: u64,
}

// ── Device ────────────────────────────────────────────────────────────────────

/// One simulated network-attached device.
///
/// Created once at process start and never destroyed while the process runs.
/// Mutated only by the command processor (`apply_command` / `finish_reboot`)
/// and the telemetry broadcaster (`advance_sensor`).
#[derive(Debug)]
pub struct Device {
    id: String,
    firmware: String,
    uptime_start: Instant,
    sensor: SensorSnapshot,
    status: DeviceStatus,
    reboot_epoch: u64,
}

impl Device {
    /// Creates a device in the `idle` state with the baseline sensor readings.
    pub fn new(id: impl Into<String>, firmware: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            firmware: firmware.into(),
            uptime_start: Instant::now(),
            // Baseline readings before the first broadcast tick.
            sensor: SensorSnapshot {
                temp: 22.0,
                humidity: 45.0,
            },
            status: DeviceStatus::Idle,
            reboot_epoch: 0,
        }
    }

    /// The device identifier (stable and unique within the registry).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The current status, without the rest of the snapshot.
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Seconds since creation or since the last `reboot`.
    pub fn uptime_secs(&self) -> u64 {
        self.uptime_start.elapsed().as_secs()
    }

    /// Builds a full status snapshot.
    ///
    /// `heap` is recomputed on every call — two consecutive snapshots of an
    /// otherwise untouched device may differ only in that field.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            id: self.id.clone(),
            firmware: self.firmware.clone(),
            uptime: self.uptime_secs(),
            heap: rand::thread_rng().gen_range(20_000..100_000),
            status: self.status,
        }
    }

    /// Current sensor readings, no side effects.
    pub fn sensor(&self) -> SensorSnapshot {
        self.sensor
    }

    /// Advances the synthetic sensor walk.
    ///
    /// Called only by the telemetry broadcaster.  Every call produces a new
    /// uniform sample: temperature in `[20, 35]`, humidity in `[30, 80]`,
    /// each rounded to two decimals.
    pub fn advance_sensor(&mut self) {
        let mut rng = rand::thread_rng();
        self.sensor.temp = round2(rng.gen_range(20.0..35.0));
        self.sensor.humidity = round2(rng.gen_range(30.0..80.0));
    }

    /// Applies one command string to the device state machine.
    ///
    /// Returns the structured result plus, for `reboot`, the ticket the
    /// caller uses to schedule the delayed [`Device::finish_reboot`].
    /// Unrecognized commands leave the state untouched and return an
    /// `error` result with info `"unknown command"`.
    pub fn apply_command(&mut self, command: &str) -> (CommandResult, Option<RebootTicket>) {
        match command {
            "reboot" => {
                self.uptime_start = Instant::now();
                self.status = DeviceStatus::Rebooting;
                self.reboot_epoch += 1;
                let ticket = RebootTicket {
                    epoch: self.reboot_epoch,
                };
                (self.result(command, Verdict::Ok, "rebooting"), Some(ticket))
            }
            "led:on" => {
                self.status = DeviceStatus::LedOn;
                (self.result(command, Verdict::Ok, "led on"), None)
            }
            "led:off" => {
                self.status = DeviceStatus::Idle;
                (self.result(command, Verdict::Ok, "led off"), None)
            }
            _ => (
                self.result(command, Verdict::Error, "unknown command"),
                None,
            ),
        }
    }

    /// Completes a pending `rebooting → idle` transition.
    ///
    /// A no-op unless the device is still `rebooting` *and* the ticket is the
    /// latest one — a newer reboot supersedes an older pending revert.
    pub fn finish_reboot(&mut self, ticket: RebootTicket) {
        if self.status == DeviceStatus::Rebooting && ticket.epoch == self.reboot_epoch {
            self.status = DeviceStatus::Idle;
        }
    }

    fn result(&self, command: &str, verdict: Verdict, info: &str) -> CommandResult {
        CommandResult {
            device_id: self.id.clone(),
            command: command.to_string(),
            result: verdict,
            info: info.to_string(),
        }
    }
}

/// Rounds to two decimal places, half away from zero.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_device_is_idle() {
        let device = Device::new("device-1", "1.0.0");
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_new_device_has_baseline_sensor() {
        let device = Device::new("device-1", "1.0.0");
        let sensor = device.sensor();
        assert_eq!(sensor.temp, 22.0);
        assert_eq!(sensor.humidity, 45.0);
    }

    #[test]
    fn test_status_snapshot_carries_identity() {
        let device = Device::new("device-7", "2.1.0");
        let snap = device.status_snapshot();
        assert_eq!(snap.id, "device-7");
        assert_eq!(snap.firmware, "2.1.0");
        assert_eq!(snap.status, DeviceStatus::Idle);
    }

    #[test]
    fn test_status_snapshot_heap_in_range() {
        let device = Device::new("device-1", "1.0.0");
        for _ in 0..100 {
            let heap = device.status_snapshot().heap;
            assert!((20_000..100_000).contains(&heap), "heap {heap} out of range");
        }
    }

    #[test]
    fn test_advance_sensor_stays_in_bounds() {
        let mut device = Device::new("device-1", "1.0.0");
        for _ in 0..200 {
            device.advance_sensor();
            let s = device.sensor();
            assert!((20.0..=35.0).contains(&s.temp), "temp {} out of range", s.temp);
            assert!(
                (30.0..=80.0).contains(&s.humidity),
                "humidity {} out of range",
                s.humidity
            );
        }
    }

    #[test]
    fn test_advance_sensor_rounds_to_two_decimals() {
        let mut device = Device::new("device-1", "1.0.0");
        for _ in 0..50 {
            device.advance_sensor();
            let s = device.sensor();
            assert_eq!(round2(s.temp), s.temp);
            assert_eq!(round2(s.humidity), s.humidity);
        }
    }

    #[test]
    fn test_led_on_sets_led_on_status() {
        let mut device = Device::new("device-1", "1.0.0");
        let (result, ticket) = device.apply_command("led:on");
        assert_eq!(device.status(), DeviceStatus::LedOn);
        assert_eq!(result.result, Verdict::Ok);
        assert_eq!(result.info, "led on");
        assert!(ticket.is_none());
    }

    #[test]
    fn test_led_off_returns_to_idle() {
        let mut device = Device::new("device-1", "1.0.0");
        device.apply_command("led:on");
        let (result, _) = device.apply_command("led:off");
        assert_eq!(device.status(), DeviceStatus::Idle);
        assert_eq!(result.result, Verdict::Ok);
        assert_eq!(result.info, "led off");
    }

    #[test]
    fn test_reboot_sets_rebooting_and_returns_ticket() {
        let mut device = Device::new("device-1", "1.0.0");
        let (result, ticket) = device.apply_command("reboot");
        assert_eq!(device.status(), DeviceStatus::Rebooting);
        assert_eq!(result.result, Verdict::Ok);
        assert_eq!(result.info, "rebooting");
        assert!(ticket.is_some());
    }

    #[test]
    fn test_reboot_resets_uptime_origin() {
        let mut device = Device::new("device-1", "1.0.0");
        device.apply_command("reboot");
        // Immediately after a reboot the derived uptime restarts near zero.
        assert_eq!(device.uptime_secs(), 0);
    }

    #[test]
    fn test_finish_reboot_reverts_to_idle() {
        let mut device = Device::new("device-1", "1.0.0");
        let (_, ticket) = device.apply_command("reboot");
        device.finish_reboot(ticket.unwrap());
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_stale_ticket_does_not_revert_newer_reboot() {
        let mut device = Device::new("device-1", "1.0.0");
        let (_, first) = device.apply_command("reboot");
        let (_, second) = device.apply_command("reboot");

        // The first reboot's timer fires while the second is still pending:
        // the stale ticket must not flip the device to idle early.
        device.finish_reboot(first.unwrap());
        assert_eq!(device.status(), DeviceStatus::Rebooting);

        device.finish_reboot(second.unwrap());
        assert_eq!(device.status(), DeviceStatus::Idle);
    }

    #[test]
    fn test_finish_reboot_is_noop_when_not_rebooting() {
        let mut device = Device::new("device-1", "1.0.0");
        let (_, ticket) = device.apply_command("reboot");
        let ticket = ticket.unwrap();
        device.apply_command("led:on");
        device.finish_reboot(ticket);
        // A command moved the device out of `rebooting`; the revert must not
        // clobber the newer state.
        assert_eq!(device.status(), DeviceStatus::LedOn);
    }

    #[test]
    fn test_unknown_command_is_rejected_without_state_change() {
        let mut device = Device::new("device-1", "1.0.0");
        device.apply_command("led:on");
        let (result, ticket) = device.apply_command("forward");
        assert_eq!(device.status(), DeviceStatus::LedOn);
        assert_eq!(result.result, Verdict::Error);
        assert_eq!(result.info, "unknown command");
        assert!(ticket.is_none());
    }

    #[test]
    fn test_command_result_serializes_with_camel_case_keys() {
        let mut device = Device::new("device-1", "1.0.0");
        let (result, _) = device.apply_command("led:on");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["deviceId"], "device-1");
        assert_eq!(json["command"], "led:on");
        assert_eq!(json["result"], "ok");
        assert_eq!(json["info"], "led on");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(DeviceStatus::LedOn).unwrap(),
            serde_json::json!("led_on")
        );
        assert_eq!(
            serde_json::to_value(DeviceStatus::Rebooting).unwrap(),
            serde_json::json!("rebooting")
        );
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(21.005_1), 21.01);
        assert_eq!(round2(34.999_9), 35.0);
        assert_eq!(round2(30.0), 30.0);
    }
}
