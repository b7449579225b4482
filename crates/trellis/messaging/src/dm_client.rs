//! Messaging operations of the deployment manager

use crate::client::{ListenerCommand, MessagingClient, OwnerProperties, PublishMode};
use crate::context::MessagingContext;
use crate::error::Result;
use crate::messages::Message;
use std::sync::Arc;
use tracing::debug;

/// DM-side facade over a [`MessagingClient`]
pub struct DmClient {
    transport: Arc<dyn MessagingClient>,
    domain: String,
}

impl DmClient {
    pub fn new(transport: Arc<dyn MessagingClient>, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        transport.set_owner_properties(OwnerProperties::dm(domain.clone()));
        Self { transport, domain }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub async fn open_connection(&self) -> Result<()> {
        self.transport.open_connection().await
    }

    pub async fn close_connection(&self) -> Result<()> {
        self.transport.close_connection().await
    }

    /// Start or stop receiving the messages agents of an application send.
    pub async fn listen_to_agent_messages(
        &self,
        application_name: &str,
        command: ListenerCommand,
    ) -> Result<()> {
        let ctx = MessagingContext::for_dm(&self.domain, application_name);
        debug!(topic = %ctx, command = %command, "Listening to agents");
        match command {
            ListenerCommand::Start => self.transport.subscribe(&ctx).await,
            ListenerCommand::Stop => self.transport.unsubscribe(&ctx).await,
        }
    }

    /// Send a message to the agent managing `scoped_instance_path`.
    ///
    /// The agent is expected to be listening.
    pub async fn send_message_to_agent(
        &self,
        application_name: &str,
        scoped_instance_path: &str,
        message: Message,
    ) -> Result<()> {
        let ctx = MessagingContext::for_agent(&self.domain, application_name, scoped_instance_path);
        self.transport
            .publish(&ctx, message, PublishMode::Mandatory)
            .await
    }

    pub async fn delete_messaging_server_artifacts(&self, application_name: &str) -> Result<()> {
        self.transport.delete_server_artifacts(application_name).await
    }
}
