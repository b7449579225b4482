//! Instance status
//!
//! Stable statuses only change on an explicit request or on import
//! resolution. Every other status is transitive: a transition is in flight.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Runtime status of an instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Nothing installed
    #[default]
    NotDeployed,
    /// Installation in progress
    Deploying,
    /// Installed, not running
    DeployedStopped,
    /// Start in progress
    Starting,
    /// Installed and running
    DeployedStarted,
    /// Stop in progress
    Stopping,
    /// Removal in progress
    Undeploying,
    /// The hosting agent stopped answering
    Problem,
    /// State is being restored after an agent restart
    Restoring,
    /// Deployed, but required imports are missing
    Unresolved,
    /// Deploy requested while the parent is not started
    WaitingForAncestor,
}

impl InstanceStatus {
    /// Every status, in declaration order.
    pub const ALL: [InstanceStatus; 11] = [
        InstanceStatus::NotDeployed,
        InstanceStatus::Deploying,
        InstanceStatus::DeployedStopped,
        InstanceStatus::Starting,
        InstanceStatus::DeployedStarted,
        InstanceStatus::Stopping,
        InstanceStatus::Undeploying,
        InstanceStatus::Problem,
        InstanceStatus::Restoring,
        InstanceStatus::Unresolved,
        InstanceStatus::WaitingForAncestor,
    ];

    pub fn is_stable(&self) -> bool {
        match self {
            InstanceStatus::NotDeployed
            | InstanceStatus::DeployedStarted
            | InstanceStatus::DeployedStopped
            | InstanceStatus::Unresolved
            | InstanceStatus::WaitingForAncestor => true,
            InstanceStatus::Deploying
            | InstanceStatus::Starting
            | InstanceStatus::Stopping
            | InstanceStatus::Undeploying
            | InstanceStatus::Problem
            | InstanceStatus::Restoring => false,
        }
    }

    /// Whether an instance with this status has something installed on its host.
    pub fn is_deployed(&self) -> bool {
        !matches!(
            self,
            InstanceStatus::NotDeployed
                | InstanceStatus::Deploying
                | InstanceStatus::WaitingForAncestor
        )
    }

    /// The statuses a transition may be requested for.
    pub fn is_valid_target(&self) -> bool {
        matches!(
            self,
            InstanceStatus::NotDeployed
                | InstanceStatus::DeployedStopped
                | InstanceStatus::DeployedStarted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::NotDeployed => "NOT_DEPLOYED",
            InstanceStatus::Deploying => "DEPLOYING",
            InstanceStatus::DeployedStopped => "DEPLOYED_STOPPED",
            InstanceStatus::Starting => "STARTING",
            InstanceStatus::DeployedStarted => "DEPLOYED_STARTED",
            InstanceStatus::Stopping => "STOPPING",
            InstanceStatus::Undeploying => "UNDEPLOYING",
            InstanceStatus::Problem => "PROBLEM",
            InstanceStatus::Restoring => "RESTORING",
            InstanceStatus::Unresolved => "UNRESOLVED",
            InstanceStatus::WaitingForAncestor => "WAITING_FOR_ANCESTOR",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InstanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        InstanceStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
