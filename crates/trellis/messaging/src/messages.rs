//! Messages exchanged between agents and the DM

use crate::error::Result;
use serde::{Deserialize, Serialize};
use trellis_model::{FileContents, InstancePath, InstanceStatus, VariableValues};

/// A message carried by a messaging transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// An instance publishes (or republishes) its exports under a prefix
    AddImport {
        application_name: String,
        component_or_facet_name: String,
        added_instance_path: InstancePath,
        added_instance_component: String,
        exported_variables: VariableValues,
    },

    /// An instance withdraws its exports under a prefix
    RemoveImport {
        application_name: String,
        component_or_facet_name: String,
        removed_instance_path: InstancePath,
    },

    /// Ask exporters of a prefix to publish again
    RequestImport {
        application_name: String,
        component_or_facet_name: String,
    },

    /// Liveness signal from an agent to the DM
    NotifHeartbeat {
        application_name: String,
        root_instance_path: InstancePath,
        ip_address: Option<String>,
    },

    /// An instance's status changed
    NotifInstanceChanged {
        application_name: String,
        instance_path: InstancePath,
        status: InstanceStatus,
    },

    /// An instance was removed from an agent
    NotifInstanceRemoved {
        application_name: String,
        instance_path: InstancePath,
    },

    /// Request a transition of an instance
    CmdChangeInstanceState {
        instance_path: InstancePath,
        new_status: InstanceStatus,
        #[serde(default)]
        file_contents: FileContents,
    },

    /// Remove an instance and its descendants
    CmdRemoveInstance { instance_path: InstancePath },

    /// Ask an agent to report every instance it manages
    CmdSendInstances,
}

impl Message {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::AddImport { .. } => "AddImport",
            Message::RemoveImport { .. } => "RemoveImport",
            Message::RequestImport { .. } => "RequestImport",
            Message::NotifHeartbeat { .. } => "NotifHeartbeat",
            Message::NotifInstanceChanged { .. } => "NotifInstanceChanged",
            Message::NotifInstanceRemoved { .. } => "NotifInstanceRemoved",
            Message::CmdChangeInstanceState { .. } => "CmdChangeInstanceState",
            Message::CmdRemoveInstance { .. } => "CmdRemoveInstance",
            Message::CmdSendInstances => "CmdSendInstances",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
