//! The command processor shared by both ingress paths.
//!
//! The HTTP gateway and the streaming connection handler both funnel into
//! [`process_command`]: resolve the device, run the state machine, hand back
//! a structured outcome.  "Device not found" is a typed error so callers can
//! map it to a 404 or an `error` message; a *rejected* command (recognized
//! envelope, unrecognized command string) is a normal outcome with
//! `result: "error"`, not an `Err`.

use thiserror::Error;

use crate::device::{CommandResult, RebootTicket};
use crate::registry::DeviceRegistry;

/// Errors distinct from a rejected command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The device identifier did not resolve in the registry.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
}

/// What applying one command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The structured result to return to the caller and fan out as a notice.
    pub result: CommandResult,
    /// Present when the command was `reboot`: the caller must schedule
    /// [`DeviceRegistry::finish_reboot`] with this ticket after the
    /// configured delay.
    pub reboot: Option<RebootTicket>,
}

/// Resolves `device_id` and applies `command` to its state machine.
///
/// # Errors
///
/// Returns [`CommandError::DeviceNotFound`] when the identifier does not
/// resolve.  An unknown command *string* is not an error — it comes back as
/// a [`CommandOutcome`] whose result carries `result: "error"`.
pub fn process_command(
    registry: &DeviceRegistry,
    device_id: &str,
    command: &str,
) -> Result<CommandOutcome, CommandError> {
    let (result, reboot) = registry
        .apply_command(device_id, command)
        .ok_or_else(|| CommandError::DeviceNotFound(device_id.to_string()))?;
    Ok(CommandOutcome { result, reboot })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceStatus, Verdict};

    #[test]
    fn test_process_command_ok() {
        let registry = DeviceRegistry::new(2, "1.0.0");
        let outcome = process_command(&registry, "device-1", "led:on").unwrap();
        assert_eq!(outcome.result.result, Verdict::Ok);
        assert!(outcome.reboot.is_none());
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::LedOn
        );
    }

    #[test]
    fn test_process_command_reboot_carries_ticket() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        let outcome = process_command(&registry, "device-1", "reboot").unwrap();
        assert!(outcome.reboot.is_some());
        assert_eq!(outcome.result.info, "rebooting");
    }

    #[test]
    fn test_process_command_unknown_device() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        let err = process_command(&registry, "device-9", "reboot").unwrap_err();
        assert_eq!(err, CommandError::DeviceNotFound("device-9".to_string()));
    }

    #[test]
    fn test_rejected_command_is_not_an_error() {
        let registry = DeviceRegistry::new(1, "1.0.0");
        let outcome = process_command(&registry, "device-1", "forward").unwrap();
        assert_eq!(outcome.result.result, Verdict::Error);
        assert_eq!(outcome.result.info, "unknown command");
        assert!(outcome.reboot.is_none());
    }
}
