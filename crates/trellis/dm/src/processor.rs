//! Serial processing of the messages agents send to the DM
//!
//! Every managed application is listened to on its own topic, but all of
//! them feed the same queue and this single processor.

use crate::application::ManagedApplication;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trellis_messaging::{DmClient, Message};
use trellis_model::{InstancePath, InstanceStatus};

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmProcessorStats {
    pub processed: u64,
    pub heartbeats: u64,
    pub ignored: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Applies agent notifications to the managed applications
pub struct DmMessageProcessor {
    client: Arc<DmClient>,
    applications: Arc<DashMap<String, ManagedApplication>>,
    stats: DmProcessorStats,
}

impl DmMessageProcessor {
    pub fn new(
        client: Arc<DmClient>,
        applications: Arc<DashMap<String, ManagedApplication>>,
    ) -> Self {
        Self {
            client,
            applications,
            stats: DmProcessorStats::default(),
        }
    }

    pub fn stats(&self) -> &DmProcessorStats {
        &self.stats
    }

    /// Process messages until `shutdown` fires, then drain the queue.
    pub async fn run(
        mut self,
        mut queue: mpsc::Receiver<Message>,
        shutdown: CancellationToken,
    ) -> Self {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    queue.close();
                    while let Some(message) = queue.recv().await {
                        self.process(message).await;
                    }
                    break;
                }
                message = queue.recv() => match message {
                    Some(message) => self.process(message).await,
                    None => break,
                },
            }
        }
        info!(processed = self.stats.processed, "DM message processor stopped");
        self
    }

    pub async fn process(&mut self, message: Message) {
        self.stats.processed += 1;
        self.stats.last_message_at = Some(Utc::now());

        match message {
            Message::NotifHeartbeat {
                application_name,
                root_instance_path,
                ip_address,
            } => {
                self.stats.heartbeats += 1;
                self.heartbeat(&application_name, &root_instance_path, ip_address)
                    .await;
            }
            Message::NotifInstanceChanged {
                application_name,
                instance_path,
                status,
            } => self.instance_changed(&application_name, &instance_path, status),
            Message::NotifInstanceRemoved {
                application_name,
                instance_path,
            } => self.instance_removed(&application_name, &instance_path),
            other => {
                self.stats.ignored += 1;
                debug!(message = other.kind_name(), "Message not meant for the DM");
            }
        }
    }

    async fn heartbeat(
        &mut self,
        application_name: &str,
        root: &InstancePath,
        ip_address: Option<String>,
    ) {
        // The guard must not be held across the send below
        let recovered = {
            let Some(mut application) = self.applications.get_mut(application_name) else {
                warn!(
                    application = application_name,
                    root = %root,
                    "Heartbeat from an unknown application"
                );
                return;
            };
            if !application.record_heartbeat(root, ip_address, Utc::now()) {
                warn!(
                    application = application_name,
                    root = %root,
                    "Heartbeat for an unknown root instance"
                );
                return;
            }
            let recovered = application.status(root) == Some(InstanceStatus::Problem);
            if recovered {
                application.set_status(root, InstanceStatus::DeployedStarted);
            }
            recovered
        };

        if recovered {
            info!(
                application = application_name,
                root = %root,
                "Agent is back, requesting its instances"
            );
            if let Err(e) = self
                .client
                .send_message_to_agent(application_name, root.as_str(), Message::CmdSendInstances)
                .await
            {
                warn!(
                    application = application_name,
                    root = %root,
                    error = %e,
                    "Failed to request instances"
                );
            }
        }
    }

    fn instance_changed(
        &mut self,
        application_name: &str,
        path: &InstancePath,
        status: InstanceStatus,
    ) {
        let Some(mut application) = self.applications.get_mut(application_name) else {
            warn!(
                application = application_name,
                instance = %path,
                "Status from an unknown application"
            );
            return;
        };
        if !application.contains(path) {
            debug!(
                application = application_name,
                instance = %path,
                "Status for an instance not known yet"
            );
        }
        let previous = application.set_status(path, status);
        debug!(
            application = application_name,
            instance = %path,
            from = ?previous,
            to = %status,
            "Instance status updated"
        );
    }

    fn instance_removed(&mut self, application_name: &str, path: &InstancePath) {
        let Some(mut application) = self.applications.get_mut(application_name) else {
            warn!(
                application = application_name,
                instance = %path,
                "Removal from an unknown application"
            );
            return;
        };
        let removed = application.remove_instance(path);
        debug!(application = application_name, instance = %path, removed, "Instance removed");
    }
}
