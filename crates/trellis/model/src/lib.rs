//! Trellis Model - Components, instances and imports
//!
//! Trellis deploys and reconfigures distributed application components.
//! Each agent hosts a tree of instances (a VM holding a server holding a
//! deployed application); instances publish variables ("exports") that the
//! instances depending on them consume ("imports").
//!
//! ## Key Concepts
//!
//! - **Component**: type descriptor declaring exported/imported variables
//! - **Facet**: reusable bundle of variable declarations, may extend other facets
//! - **Instance**: runtime node of a component, placed in an [`InstanceTree`]
//! - **Import**: snapshot of a remote instance's exports, grouped by prefix
//!
//! This crate is pure data plus lookup helpers. It performs no I/O.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod component;
pub mod error;
pub mod import;
pub mod instance;
pub mod path;
pub mod status;

pub use component::{
    Component, ComponentBuilder, ComponentGraph, ExportedVariables, Facet, ImportedVariable,
    ImportedVariables, WILDCARD,
};
pub use error::{ModelError, Result};
pub use import::{Import, VariableValues};
pub use instance::{FileContents, ImportMap, Instance, InstanceTree, DATA_IP_ADDRESS};
pub use path::InstancePath;
pub use status::{InstanceStatus, UnknownStatus};
