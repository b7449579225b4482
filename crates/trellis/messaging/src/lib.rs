//! Trellis Messaging - Topics, routing and transports
//!
//! Agents and the DM never talk to each other directly. They publish
//! [`Message`]s to topics named by a [`MessagingContext`]:
//!
//! - `those.that.export.<prefix>`: exporters of a prefix, reached by requests
//! - `those.that.import.<prefix>`: importers of a prefix, reached by exports
//! - `machine.<path>`: a single agent, reached by DM commands
//! - the application name: the DM
//!
//! [`InMemoryClient`] implements [`MessagingClient`] on a process-wide
//! [`RoutingContext`]. [`AgentClient`] and [`DmClient`] layer the operations
//! of each side on top of any transport.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod agent_client;
pub mod client;
pub mod config;
pub mod context;
pub mod dm_client;
pub mod error;
pub mod in_memory;
pub mod messages;
pub mod routing;
pub mod scheduler;

pub use agent_client::{AgentClient, AgentIdentity};
pub use client::{ListenerCommand, MessagingClient, OwnerProperties, PublishMode};
pub use config::MessagingConfig;
pub use context::{
    for_exported_variables, for_imported_variables, MessagingContext, RecipientKind, ThoseThat,
    MACHINE_PREFIX, THOSE_THAT_EXPORT, THOSE_THAT_IMPORT,
};
pub use dm_client::DmClient;
pub use error::{MessagingError, Result};
pub use in_memory::{InMemoryClient, IN_MEMORY_TYPE};
pub use messages::Message;
pub use routing::{RoutedQueue, RoutingContext};
pub use scheduler::PeriodicTask;
