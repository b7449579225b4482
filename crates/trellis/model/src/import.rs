//! Imports: snapshots of another instance's exports

use crate::path::InstancePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved variable values, keyed by fully-qualified name
pub type VariableValues = BTreeMap<String, String>;

/// Exports of a remote instance, as seen by an importing instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Path of the exporting instance
    pub instance_path: InstancePath,

    /// Component of the exporting instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,

    /// Variable values at the time the exports were published
    pub exported_vars: VariableValues,
}

impl Import {
    pub fn new(instance_path: InstancePath, exported_vars: VariableValues) -> Self {
        Self {
            instance_path,
            component_name: None,
            exported_vars,
        }
    }

    pub fn with_component(mut self, component_name: impl Into<String>) -> Self {
        self.component_name = Some(component_name.into());
        self
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.exported_vars.get(name).map(String::as_str)
    }
}
