//! Agent runtime
//!
//! An agent manages the instances under one root instance. It listens to
//! the DM and to the agents it shares variables with, and reports to the DM
//! through heartbeats and status notifications.

use crate::config::AgentConfig;
use crate::error::Result;
use crate::heartbeat::spawn_heartbeat;
use crate::processor::AgentMessageProcessor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use trellis_lifecycle::PluginRegistry;
use trellis_messaging::{
    AgentClient, AgentIdentity, InMemoryClient, ListenerCommand, OwnerProperties, PeriodicTask,
    RoutingContext,
};
use trellis_model::{InstancePath, InstanceTree, DATA_IP_ADDRESS};

/// A running agent
pub struct Agent {
    config: AgentConfig,
    root: InstancePath,
    client: Arc<AgentClient>,
    shutdown: CancellationToken,
    processor: JoinHandle<AgentMessageProcessor>,
    heartbeat: PeriodicTask,
}

impl Agent {
    /// Start an agent for the subtree of `application` rooted at the
    /// configured scoped instance path.
    pub async fn start(
        config: AgentConfig,
        routing: Arc<RoutingContext>,
        plugins: PluginRegistry,
        application: &InstanceTree,
    ) -> Result<Self> {
        config.validate()?;
        let root = config.scoped_path()?;

        let mut tree = application.subtree(&root)?;
        if let (Some(ip), Some(instance)) = (&config.ip_address, tree.get_mut(&root)) {
            instance.data.insert(DATA_IP_ADDRESS.to_string(), ip.clone());
        }

        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let transport = InMemoryClient::new(
            routing,
            queue_tx,
            OwnerProperties::agent(
                config.domain.clone(),
                config.application_name.clone(),
                config.scoped_instance_path.clone(),
            ),
            config.messaging.connection_required,
        );
        let client = Arc::new(AgentClient::new(
            Arc::new(transport),
            config.domain.clone(),
            identity_of(&config),
        ));
        client.open_connection().await?;
        client.listen_to_the_dm(ListenerCommand::Start).await?;

        let shutdown = CancellationToken::new();
        let processor = AgentMessageProcessor::new(client.clone(), plugins, tree);
        let processor = tokio::spawn(processor.run(queue_rx, shutdown.clone()));

        let heartbeat = spawn_heartbeat(
            client.clone(),
            root.clone(),
            config.ip_address.clone(),
            config.heartbeat_interval(),
        );

        info!(
            application = %config.application_name,
            root = %root,
            "Agent started"
        );
        Ok(Self {
            config,
            root,
            client,
            shutdown,
            processor,
            heartbeat,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn root(&self) -> &InstancePath {
        &self.root
    }

    pub fn client(&self) -> &Arc<AgentClient> {
        &self.client
    }

    /// Change the application name and scoped instance path the agent is
    /// known under. The instance tree is left untouched.
    pub async fn reconfigure(
        &mut self,
        application_name: impl Into<String>,
        scoped_instance_path: impl Into<String>,
    ) -> Result<()> {
        let mut config = self.config.clone();
        config.application_name = application_name.into();
        config.scoped_instance_path = scoped_instance_path.into();
        config.validate()?;

        self.client.listen_to_the_dm(ListenerCommand::Stop).await?;
        self.client.set_identity(identity_of(&config));
        self.client.listen_to_the_dm(ListenerCommand::Start).await?;

        let heartbeat = spawn_heartbeat(
            self.client.clone(),
            self.root.clone(),
            config.ip_address.clone(),
            config.heartbeat_interval(),
        );
        std::mem::replace(&mut self.heartbeat, heartbeat).stop().await;

        info!(
            application = %config.application_name,
            scoped_path = %config.scoped_instance_path,
            "Agent reconfigured"
        );
        self.config = config;
        Ok(())
    }

    /// Stop the agent and hand back its instances.
    ///
    /// The heartbeat is cancelled first, then the queue is closed and what
    /// it already holds is processed, then the connection is closed.
    pub async fn stop(self) -> Result<InstanceTree> {
        self.heartbeat.stop().await;

        self.shutdown.cancel();
        let processor = self.processor.await?;

        self.client.listen_to_the_dm(ListenerCommand::Stop).await?;
        self.client.close_connection().await?;

        info!(
            root = %self.root,
            processed = processor.stats().processed,
            "Agent stopped"
        );
        Ok(processor.into_tree())
    }
}

fn identity_of(config: &AgentConfig) -> AgentIdentity {
    AgentIdentity {
        application_name: config.application_name.clone(),
        scoped_instance_path: config.scoped_instance_path.clone(),
        external_exports: config.external_exports.clone(),
    }
}
