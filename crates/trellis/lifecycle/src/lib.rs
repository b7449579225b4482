//! Trellis Lifecycle - Instance state machine
//!
//! An instance's status decides which transitions it accepts:
//!
//! ```text
//! NOT_DEPLOYED --deploy--> DEPLOYED_STOPPED --start--> DEPLOYED_STARTED
//!      |                        |    ^                        |
//!      | parent not started     |    +--------stop------------+
//!      v                        +--start, imports missing--> UNRESOLVED
//! WAITING_FOR_ANCESTOR                                        |
//!                               DEPLOYED_STARTED <--imports---+
//! ```
//!
//! Plugin hooks run while the instance sits in a transitive status
//! (`DEPLOYING`, `STARTING`, `STOPPING`, `UNDEPLOYING`). Requests arriving
//! then are rejected. Import changes only ever promote an instance.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod handler;
pub mod plugin;
mod states;
mod transitions;

pub use error::{LifecycleError, Result};
pub use handler::{
    build, change_instance_state, resume_waiting_instance, update_state_from_imports,
    StateHandler, StateVariant,
};
pub use plugin::{
    LoggerPlugin, Plugin, PluginAction, PluginError, PluginRegistry, PluginResult,
    SimulatedPlugin, LOGGER_INSTALLER,
};
