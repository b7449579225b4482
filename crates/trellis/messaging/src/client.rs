//! Transport abstraction

use crate::context::{MessagingContext, RecipientKind};
use crate::error::Result;
use crate::messages::Message;
use async_trait::async_trait;
use std::fmt;

/// Delivery expectation of a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Nobody listening is fine
    #[default]
    BestEffort,
    /// At least one receiver is expected; a warning is logged otherwise
    Mandatory,
}

/// Start or stop listening on a set of topics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerCommand {
    Start,
    Stop,
}

impl fmt::Display for ListenerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerCommand::Start => write!(f, "start"),
            ListenerCommand::Stop => write!(f, "stop"),
        }
    }
}

/// Identity of the owner of a transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerProperties {
    pub kind: RecipientKind,
    pub domain: String,
    pub application_name: Option<String>,
    pub scoped_instance_path: Option<String>,
}

impl OwnerProperties {
    pub fn dm(domain: impl Into<String>) -> Self {
        Self {
            kind: RecipientKind::Dm,
            domain: domain.into(),
            application_name: None,
            scoped_instance_path: None,
        }
    }

    pub fn agent(
        domain: impl Into<String>,
        application_name: impl Into<String>,
        scoped_instance_path: impl Into<String>,
    ) -> Self {
        Self {
            kind: RecipientKind::Agents,
            domain: domain.into(),
            application_name: Some(application_name.into()),
            scoped_instance_path: Some(scoped_instance_path.into()),
        }
    }

    /// Key the owner is registered under in a routing table.
    pub fn owner_id(&self) -> String {
        match self.kind {
            RecipientKind::Dm => "DM".to_string(),
            _ => format!(
                "{} {}",
                self.application_name.as_deref().unwrap_or("?"),
                self.scoped_instance_path.as_deref().unwrap_or("?")
            ),
        }
    }
}

/// A messaging transport.
///
/// Implementations deliver received messages to the queue they were built
/// with. When the transport requires a connection and is not connected,
/// subscription and publication calls do nothing.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Short name of the transport, for logs
    fn messaging_type(&self) -> &str;

    async fn open_connection(&self) -> Result<()>;

    async fn close_connection(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Change the identity the connection is registered under.
    fn set_owner_properties(&self, owner: OwnerProperties);

    async fn subscribe(&self, ctx: &MessagingContext) -> Result<()>;

    async fn unsubscribe(&self, ctx: &MessagingContext) -> Result<()>;

    async fn publish(
        &self,
        ctx: &MessagingContext,
        message: Message,
        mode: PublishMode,
    ) -> Result<()>;

    /// Remove server-side resources bound to an application.
    async fn delete_server_artifacts(&self, application_name: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_ids() {
        assert_eq!(OwnerProperties::dm("d").owner_id(), "DM");
        assert_eq!(
            OwnerProperties::agent("d", "app", "/vm1").owner_id(),
            "app /vm1"
        );
    }
}
