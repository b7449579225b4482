//! Configuration for trellis-agent

use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use trellis_messaging::MessagingConfig;
use trellis_model::InstancePath;

/// Main agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Messaging domain shared with the DM
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Application the agent belongs to
    #[serde(default)]
    pub application_name: String,

    /// Path of the root instance this agent manages
    #[serde(default)]
    pub scoped_instance_path: String,

    /// IP address published for exported `ip` variables
    #[serde(default)]
    pub ip_address: Option<String>,

    /// Exported variables offered to other applications, keyed by internal
    /// name (`mysql.port = "Store.port"`)
    #[serde(default)]
    pub external_exports: BTreeMap<String, String>,

    /// Period of the heartbeat sent to the DM
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Capacity of the inbound message queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            application_name: String::new(),
            scoped_instance_path: String::new(),
            ip_address: None,
            external_exports: BTreeMap::new(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            queue_capacity: default_queue_capacity(),
            messaging: MessagingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Load configuration: defaults, then the file at `path` if any, then
    /// `TRELLIS_AGENT_*` environment variables (`__` separates nested keys).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&AgentConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TRELLIS_AGENT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AgentConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.application_name.is_empty() {
            return Err(AgentError::Config("application_name is required".into()));
        }
        // The DM addresses agents by root instance path
        if !self.scoped_path()?.is_root() {
            return Err(AgentError::Config(format!(
                "scoped_instance_path {:?} must name a root instance",
                self.scoped_instance_path
            )));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(AgentError::Config(
                "heartbeat_interval_secs must be positive".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(AgentError::Config("queue_capacity must be positive".into()));
        }
        Ok(())
    }

    pub fn scoped_path(&self) -> Result<InstancePath> {
        InstancePath::parse(&self.scoped_instance_path).map_err(|e| {
            AgentError::Config(format!(
                "invalid scoped_instance_path {:?}: {}",
                self.scoped_instance_path, e
            ))
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
