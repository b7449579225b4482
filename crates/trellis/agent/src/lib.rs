//! Trellis Agent - Runtime of the process managing one root instance
//!
//! The agent funnels every inbound message into one bounded queue drained
//! by a single [`AgentMessageProcessor`], so no two transitions of its
//! instances ever run concurrently. A [`PeriodicTask`] heartbeat reports
//! liveness to the DM.
//!
//! [`PeriodicTask`]: trellis_messaging::PeriodicTask

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod agent;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod processor;
pub mod telemetry;

pub use crate::agent::Agent;
pub use crate::config::{AgentConfig, LoggingConfig};
pub use crate::error::{AgentError, Result};
pub use crate::heartbeat::spawn_heartbeat;
pub use crate::processor::{AgentMessageProcessor, ProcessorStats};
pub use crate::telemetry::init_tracing;
