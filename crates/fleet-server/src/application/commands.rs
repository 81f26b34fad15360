//! The shared command dispatch path.
//!
//! Both ingress surfaces — `POST /devices/{id}/command` and the streaming
//! `command` message — funnel through [`execute_command`] so that observers
//! see identical behavior regardless of where a command entered:
//!
//! 1. Resolve the device and run the state machine (`fleet-core`).
//! 2. For `reboot`, schedule the autonomous revert to `idle` after the
//!    configured delay.
//! 3. Fan a `command_executed` notice out to every streaming connection,
//!    ignoring device filters.
//!
//! The notice goes out even when the command was rejected — a rejected
//! command is still an executed command from an observer's point of view.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use fleet_core::{process_command, CommandError, CommandResult, DeviceRegistry, ServerMessage};

use crate::infrastructure::connection_manager::{ConnectionId, ConnectionManager};

/// Applies `command` to `device_id` and performs the shared side effects.
///
/// Returns the structured result for the caller to relay (HTTP body or
/// `command_ack`).  When `ack_to` names a streaming connection, the
/// `command_ack` is queued on it *before* the universal notice so the sender
/// sees its reply first.
///
/// # Errors
///
/// Returns [`CommandError::DeviceNotFound`] when the identifier does not
/// resolve; the caller maps this to a 404 or a per-connection `error` reply.
pub async fn execute_command(
    registry: &Arc<DeviceRegistry>,
    connections: &Arc<ConnectionManager>,
    device_id: &str,
    command: &str,
    reboot_delay: Duration,
    ack_to: Option<ConnectionId>,
) -> Result<CommandResult, CommandError> {
    let outcome = process_command(registry, device_id, command)?;

    if let Some(ticket) = outcome.reboot {
        // The revert fires no earlier than the delay; a newer reboot's ticket
        // supersedes this one inside the device.
        let registry = Arc::clone(registry);
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(reboot_delay).await;
            registry.finish_reboot(&device_id, ticket);
            debug!("device {device_id}: reboot revert fired");
        });
    }

    if let Some(conn_id) = ack_to {
        connections
            .send_to(
                conn_id,
                ServerMessage::CommandAck {
                    result: outcome.result.clone(),
                },
            )
            .await;
    }

    let delivered = connections
        .broadcast_all(ServerMessage::command_executed(outcome.result.clone()))
        .await;
    debug!(
        "command '{command}' on {device_id}: notice fanned out to {delivered} connection(s)"
    );

    Ok(outcome.result)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DeviceStatus, Verdict};

    fn fixture() -> (Arc<DeviceRegistry>, Arc<ConnectionManager>) {
        (
            Arc::new(DeviceRegistry::new(2, "1.0.0")),
            Arc::new(ConnectionManager::new()),
        )
    }

    #[tokio::test]
    async fn test_execute_command_applies_and_returns_result() {
        let (registry, connections) = fixture();
        let result = execute_command(
            &registry,
            &connections,
            "device-1",
            "led:on",
            Duration::from_millis(10),
            None,
        )
        .await
        .unwrap();
        assert_eq!(result.result, Verdict::Ok);
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::LedOn
        );
    }

    #[tokio::test]
    async fn test_execute_command_unknown_device() {
        let (registry, connections) = fixture();
        let err = execute_command(
            &registry,
            &connections,
            "device-9",
            "reboot",
            Duration::from_millis(10),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_reboot_reverts_to_idle_after_delay() {
        let (registry, connections) = fixture();
        execute_command(
            &registry,
            &connections,
            "device-1",
            "reboot",
            Duration::from_millis(20),
            None,
        )
        .await
        .unwrap();
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::Rebooting
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            registry.status_of("device-1").unwrap().status,
            DeviceStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_notice_reaches_every_connection() {
        let (registry, connections) = fixture();
        let (_id_a, mut rx_a) = connections.register().await;
        let (_id_b, mut rx_b) = connections.register().await;

        execute_command(
            &registry,
            &connections,
            "device-1",
            "led:on",
            Duration::from_millis(10),
            None,
        )
        .await
        .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let frame = rx.recv().await.expect("notice delivered");
            let msg = frame.into_message().expect("a message, not a probe");
            assert!(matches!(msg, ServerMessage::CommandExecuted { .. }));
        }
    }

    #[tokio::test]
    async fn test_ack_arrives_before_the_notice_on_the_sender() {
        let (registry, connections) = fixture();
        let (id, mut rx) = connections.register().await;

        execute_command(
            &registry,
            &connections,
            "device-1",
            "led:on",
            Duration::from_millis(10),
            Some(id),
        )
        .await
        .unwrap();

        let first = rx.recv().await.unwrap().into_message().unwrap();
        assert!(matches!(first, ServerMessage::CommandAck { .. }));
        let second = rx.recv().await.unwrap().into_message().unwrap();
        assert!(matches!(second, ServerMessage::CommandExecuted { .. }));
    }

    #[tokio::test]
    async fn test_rejected_command_still_broadcasts_notice() {
        let (registry, connections) = fixture();
        let (_id, mut rx) = connections.register().await;

        let result = execute_command(
            &registry,
            &connections,
            "device-1",
            "forward",
            Duration::from_millis(10),
            None,
        )
        .await
        .unwrap();
        assert_eq!(result.result, Verdict::Error);

        let frame = rx.recv().await.expect("notice delivered");
        match frame.into_message().expect("a message") {
            ServerMessage::CommandExecuted { result, .. } => {
                assert_eq!(result.info, "unknown command");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
