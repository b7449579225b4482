//! Model error types

use thiserror::Error;

/// Errors raised while building the component graph or the instance tree
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Duplicate component: {0}")]
    DuplicateComponent(String),

    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("Cycle in the component graph: {0}")]
    Cycle(String),

    #[error("Duplicate instance path: {0}")]
    DuplicatePath(String),

    #[error("Invalid instance name: {0:?}")]
    InvalidName(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Component {child} cannot be nested under {parent}")]
    InvalidChild { parent: String, child: String },
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
