//! Transport settings shared by agents and the DM

use serde::{Deserialize, Serialize};

/// Messaging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Whether subscriptions and publications need an open connection.
    /// Disable for single-process deployments and tests.
    #[serde(default = "default_true")]
    pub connection_required: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            connection_required: true,
        }
    }
}

fn default_true() -> bool {
    true
}
