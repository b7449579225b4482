//! Agent errors

use thiserror::Error;
use trellis_lifecycle::{LifecycleError, PluginError};
use trellis_messaging::MessagingError;
use trellis_model::ModelError;

/// Errors raised by the agent runtime
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Message processor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
