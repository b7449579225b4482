//! The deployment manager
//!
//! Tracks the managed applications and drives their agents. Commands go to
//! the agent owning the root of the targeted instance, with mandatory
//! delivery.

use crate::application::{mark_stale_roots, ManagedApplication};
use crate::config::DmConfig;
use crate::error::{DmError, Result};
use crate::processor::{DmMessageProcessor, DmProcessorStats};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use trellis_messaging::{
    DmClient, InMemoryClient, ListenerCommand, Message, OwnerProperties, PeriodicTask,
    RoutingContext,
};
use trellis_model::{FileContents, InstancePath, InstanceStatus, InstanceTree};

/// A running deployment manager
pub struct Manager {
    config: DmConfig,
    client: Arc<DmClient>,
    applications: Arc<DashMap<String, ManagedApplication>>,
    shutdown: CancellationToken,
    processor: JoinHandle<DmMessageProcessor>,
    heartbeat_check: PeriodicTask,
}

impl Manager {
    pub async fn start(config: DmConfig, routing: Arc<RoutingContext>) -> Result<Self> {
        config.validate()?;

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let transport = InMemoryClient::new(
            routing,
            queue_tx,
            OwnerProperties::dm(config.domain.clone()),
            config.messaging.connection_required,
        );
        let client = Arc::new(DmClient::new(Arc::new(transport), config.domain.clone()));
        client.open_connection().await?;

        let applications = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();
        let processor = DmMessageProcessor::new(client.clone(), applications.clone());
        let processor = tokio::spawn(processor.run(queue_rx, shutdown.clone()));

        let checked = applications.clone();
        let timeout = config.heartbeat_timeout();
        let heartbeat_check = PeriodicTask::spawn(
            "heartbeat check",
            config.heartbeat_check_interval(),
            move || {
                let applications = checked.clone();
                async move {
                    mark_stale_roots(&applications, Utc::now(), timeout);
                }
            },
        );

        info!(domain = %config.domain, "Deployment manager started");
        Ok(Self {
            config,
            client,
            applications,
            shutdown,
            processor,
            heartbeat_check,
        })
    }

    pub fn config(&self) -> &DmConfig {
        &self.config
    }

    /// Start managing an application whose instances are `tree`.
    #[instrument(skip(self, tree))]
    pub async fn add_application(&self, name: &str, tree: &InstanceTree) -> Result<()> {
        match self.applications.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(DmError::ApplicationExists(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(ManagedApplication::new(name, tree));
            }
        }

        if let Err(e) = self
            .client
            .listen_to_agent_messages(name, ListenerCommand::Start)
            .await
        {
            self.applications.remove(name);
            return Err(e.into());
        }
        info!(application = name, instances = tree.len(), "Application added");
        Ok(())
    }

    /// Stop managing an application and delete its messaging artifacts.
    #[instrument(skip(self))]
    pub async fn remove_application(&self, name: &str) -> Result<()> {
        if self.applications.remove(name).is_none() {
            return Err(DmError::UnknownApplication(name.to_string()));
        }
        self.client
            .listen_to_agent_messages(name, ListenerCommand::Stop)
            .await?;
        self.client.delete_messaging_server_artifacts(name).await?;
        info!(application = name, "Application removed");
        Ok(())
    }

    pub fn application_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.applications.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Last status reported for an instance.
    pub fn instance_status(
        &self,
        application: &str,
        path: &InstancePath,
    ) -> Option<InstanceStatus> {
        self.applications.get(application)?.status(path)
    }

    /// Snapshot of an application's state.
    pub fn application(&self, name: &str) -> Option<ManagedApplication> {
        self.applications.get(name).map(|e| e.value().clone())
    }

    /// Ask the agent owning `path` to move it to `new_status`.
    #[instrument(skip(self, file_contents))]
    pub async fn change_instance_state(
        &self,
        application: &str,
        path: &InstancePath,
        new_status: InstanceStatus,
        file_contents: FileContents,
    ) -> Result<()> {
        if !new_status.is_valid_target() {
            return Err(DmError::InvalidTarget(new_status));
        }
        self.ensure_instance(application, path)?;
        self.send_to_owner(
            application,
            path,
            Message::CmdChangeInstanceState {
                instance_path: path.clone(),
                new_status,
                file_contents,
            },
        )
        .await
    }

    /// Ask the agent owning `path` to remove it. The agent refuses when the
    /// instance or one of its descendants is still deployed.
    pub async fn remove_instance(&self, application: &str, path: &InstancePath) -> Result<()> {
        self.ensure_instance(application, path)?;
        self.send_to_owner(
            application,
            path,
            Message::CmdRemoveInstance {
                instance_path: path.clone(),
            },
        )
        .await
    }

    /// Ask the agent of `root` to report the status of all its instances.
    pub async fn request_instances(&self, application: &str, root: &InstancePath) -> Result<()> {
        self.ensure_instance(application, root)?;
        self.send_to_owner(application, root, Message::CmdSendInstances)
            .await
    }

    /// Stop the heartbeat check and the processor, then close the connection.
    pub async fn stop(self) -> Result<DmProcessorStats> {
        self.heartbeat_check.stop().await;

        self.shutdown.cancel();
        let processor = self.processor.await?;

        let names: Vec<String> = self.applications.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.client
                .listen_to_agent_messages(&name, ListenerCommand::Stop)
                .await?;
        }
        self.client.close_connection().await?;

        info!(processed = processor.stats().processed, "Deployment manager stopped");
        Ok(processor.stats().clone())
    }

    fn ensure_instance(&self, application: &str, path: &InstancePath) -> Result<()> {
        let managed = self
            .applications
            .get(application)
            .ok_or_else(|| DmError::UnknownApplication(application.to_string()))?;
        if !managed.contains(path) {
            return Err(DmError::UnknownInstance {
                application: application.to_string(),
                path: path.clone(),
            });
        }
        Ok(())
    }

    async fn send_to_owner(
        &self,
        application: &str,
        path: &InstancePath,
        message: Message,
    ) -> Result<()> {
        let root = path.root_path();
        self.client
            .send_message_to_agent(application, root.as_str(), message)
            .await?;
        Ok(())
    }
}
