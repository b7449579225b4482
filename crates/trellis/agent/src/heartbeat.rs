//! Periodic liveness signal to the DM

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use trellis_messaging::{AgentClient, Message, PeriodicTask};
use trellis_model::InstancePath;

/// Start sending `NotifHeartbeat` for `root` every `period`.
///
/// The application name is read at each tick so a reconfigured agent
/// reports under its new name.
pub fn spawn_heartbeat(
    client: Arc<AgentClient>,
    root: InstancePath,
    ip_address: Option<String>,
    period: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn(format!("heartbeat {}", root), period, move || {
        let client = client.clone();
        let root = root.clone();
        let ip_address = ip_address.clone();
        async move {
            let message = Message::NotifHeartbeat {
                application_name: client.application_name(),
                root_instance_path: root.clone(),
                ip_address,
            };
            match client.send_message_to_the_dm(message).await {
                Ok(()) => debug!(root = %root, "Heartbeat sent"),
                Err(e) => warn!(root = %root, error = %e, "Failed to send heartbeat"),
            }
        }
    })
}
