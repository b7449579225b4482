//! Messaging errors

use thiserror::Error;

/// Errors raised by messaging clients and transports
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not connected to the messaging server")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Messaging client is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, MessagingError>;
