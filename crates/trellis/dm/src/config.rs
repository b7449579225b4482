//! Configuration for trellis-dm

use crate::error::{DmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trellis_messaging::MessagingConfig;

/// Deployment manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmConfig {
    /// Messaging domain shared with the agents
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Capacity of the queue shared by every managed application
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Age after which a root instance without heartbeat is a problem
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// Period of the heartbeat check
    #[serde(default = "default_heartbeat_check_interval")]
    pub heartbeat_check_interval_secs: u64,

    #[serde(default)]
    pub messaging: MessagingConfig,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            queue_capacity: default_queue_capacity(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            heartbeat_check_interval_secs: default_heartbeat_check_interval(),
            messaging: MessagingConfig::default(),
        }
    }
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_heartbeat_timeout() -> u64 {
    180
}

fn default_heartbeat_check_interval() -> u64 {
    30
}

impl DmConfig {
    /// Load configuration: defaults, then the file at `path` if any, then
    /// `TRELLIS_DM_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DmConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let config: DmConfig = builder
            .add_source(
                config::Environment::with_prefix("TRELLIS_DM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(DmError::Config("queue_capacity must be positive".into()));
        }
        if self.heartbeat_check_interval_secs == 0 {
            return Err(DmError::Config(
                "heartbeat_check_interval_secs must be positive".into(),
            ));
        }
        if self.heartbeat_timeout_secs < self.heartbeat_check_interval_secs {
            return Err(DmError::Config(format!(
                "heartbeat_timeout_secs ({}) is shorter than the check interval ({})",
                self.heartbeat_timeout_secs, self.heartbeat_check_interval_secs
            )));
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }

    pub fn heartbeat_check_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_check_interval_secs)
    }
}
