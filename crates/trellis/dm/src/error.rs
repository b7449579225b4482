//! DM errors

use thiserror::Error;
use trellis_messaging::MessagingError;
use trellis_model::{InstancePath, InstanceStatus, ModelError};

#[derive(Debug, Error)]
pub enum DmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Application already managed: {0}")]
    ApplicationExists(String),

    #[error("Unknown application: {0}")]
    UnknownApplication(String),

    #[error("Unknown instance {path} in application {application}")]
    UnknownInstance {
        application: String,
        path: InstancePath,
    },

    #[error("Not a valid target status: {0}")]
    InvalidTarget(InstanceStatus),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Message processor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<config::ConfigError> for DmError {
    fn from(err: config::ConfigError) -> Self {
        DmError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DmError>;
