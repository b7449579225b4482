//! Lifecycle errors

use crate::plugin::PluginError;
use thiserror::Error;
use trellis_messaging::MessagingError;
use trellis_model::{InstancePath, InstanceStatus};

/// Errors raised by instance transitions
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Instance not found: {0}")]
    InstanceNotFound(InstancePath),

    #[error("Transition already in progress for {path} (status {status})")]
    TransitionInProgress {
        path: InstancePath,
        status: InstanceStatus,
    },

    #[error("{0} cannot be requested, only NOT_DEPLOYED, DEPLOYED_STOPPED and DEPLOYED_STARTED can")]
    InvalidTarget(InstanceStatus),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
