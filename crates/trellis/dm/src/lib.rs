//! Trellis DM - The deployment manager
//!
//! The DM tracks the applications it manages and sends lifecycle commands
//! to the agents owning their root instances. Agents of every application
//! report into one queue drained by a single [`DmMessageProcessor`]. A
//! periodic check marks roots whose heartbeat stopped as `PROBLEM`.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod application;
pub mod config;
pub mod error;
pub mod manager;
pub mod processor;

pub use crate::application::{mark_stale_roots, ManagedApplication, RootRecord};
pub use crate::config::DmConfig;
pub use crate::error::{DmError, Result};
pub use crate::manager::Manager;
pub use crate::processor::{DmMessageProcessor, DmProcessorStats};
