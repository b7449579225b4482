//! State handler factory and entry points
//!
//! The handler of an instance is chosen from its status alone. Stable
//! statuses have a dedicated variant; every other status shares the
//! transitive variant, which rejects new requests until the transition in
//! flight settles.

use crate::error::{LifecycleError, Result};
use crate::plugin::Plugin;
use crate::states::{
    deployed_started, deployed_stopped, not_deployed, transitive, unresolved,
    waiting_for_ancestor,
};
use crate::transitions::{instance, Transitions};
use tracing::instrument;
use trellis_messaging::AgentClient;
use trellis_model::{FileContents, Import, Instance, InstancePath, InstanceStatus, InstanceTree};

/// The fixed set of state variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariant {
    NotDeployed,
    DeployedStarted,
    DeployedStopped,
    Unresolved,
    WaitingForAncestor,
    Transitive,
}

impl StateVariant {
    pub fn for_status(status: InstanceStatus) -> Self {
        match status {
            InstanceStatus::NotDeployed => StateVariant::NotDeployed,
            InstanceStatus::DeployedStarted => StateVariant::DeployedStarted,
            InstanceStatus::DeployedStopped => StateVariant::DeployedStopped,
            InstanceStatus::Unresolved => StateVariant::Unresolved,
            InstanceStatus::WaitingForAncestor => StateVariant::WaitingForAncestor,
            InstanceStatus::Deploying
            | InstanceStatus::Starting
            | InstanceStatus::Stopping
            | InstanceStatus::Undeploying
            | InstanceStatus::Problem
            | InstanceStatus::Restoring => StateVariant::Transitive,
        }
    }
}

/// Applies transitions to an instance according to its status
pub struct StateHandler<'a> {
    variant: StateVariant,
    transitions: Transitions<'a>,
}

/// Build the handler for `instance`'s current status.
pub fn build<'a>(
    instance: &Instance,
    application_name: &'a str,
    client: &'a AgentClient,
) -> StateHandler<'a> {
    StateHandler {
        variant: StateVariant::for_status(instance.status),
        transitions: Transitions {
            application_name,
            client,
        },
    }
}

impl StateHandler<'_> {
    pub fn variant(&self) -> StateVariant {
        self.variant
    }

    /// Apply an explicit transition request.
    #[instrument(skip_all, fields(instance = %path, target = %new_status, variant = ?self.variant))]
    pub async fn change_instance_state(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        new_status: InstanceStatus,
        files: &FileContents,
    ) -> Result<()> {
        if !new_status.is_valid_target() {
            return Err(LifecycleError::InvalidTarget(new_status));
        }
        if instance(tree, path)?.status == new_status {
            return Ok(());
        }

        let t = &self.transitions;
        match self.variant {
            StateVariant::NotDeployed => {
                not_deployed::change_instance_state(t, tree, path, plugin, new_status, files).await
            }
            StateVariant::DeployedStarted => {
                deployed_started::change_instance_state(t, tree, path, plugin, new_status, files)
                    .await
            }
            StateVariant::DeployedStopped => {
                deployed_stopped::change_instance_state(t, tree, path, plugin, new_status, files)
                    .await
            }
            StateVariant::Unresolved => {
                unresolved::change_instance_state(t, tree, path, plugin, new_status, files).await
            }
            StateVariant::WaitingForAncestor => {
                waiting_for_ancestor::change_instance_state(
                    t, tree, path, plugin, new_status, files,
                )
                .await
            }
            StateVariant::Transitive => {
                transitive::change_instance_state(t, tree, path, plugin, new_status, files).await
            }
        }
    }

    /// Re-evaluate the instance after one of its imports changed.
    ///
    /// Only promotes: an instance missing imports is never moved back to
    /// `UNRESOLVED`.
    #[instrument(
        skip_all,
        fields(instance = %path, on_resolution = %status_on_resolution, variant = ?self.variant)
    )]
    pub async fn update_state_from_imports(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        import: Option<&Import>,
        status_on_resolution: InstanceStatus,
    ) -> Result<()> {
        let t = &self.transitions;
        let sor = status_on_resolution;
        match self.variant {
            StateVariant::NotDeployed => {
                not_deployed::update_state_from_imports(t, tree, path, plugin, import, sor).await
            }
            StateVariant::DeployedStarted => {
                deployed_started::update_state_from_imports(t, tree, path, plugin, import, sor)
                    .await
            }
            StateVariant::DeployedStopped => {
                deployed_stopped::update_state_from_imports(t, tree, path, plugin, import, sor)
                    .await
            }
            StateVariant::Unresolved => {
                unresolved::update_state_from_imports(t, tree, path, plugin, import, sor).await
            }
            StateVariant::WaitingForAncestor => {
                waiting_for_ancestor::update_state_from_imports(t, tree, path, plugin, import, sor)
                    .await
            }
            StateVariant::Transitive => {
                transitive::update_state_from_imports(t, tree, path, plugin, import, sor).await
            }
        }
    }
}

/// Apply an explicit transition request to the instance at `path`.
pub async fn change_instance_state(
    client: &AgentClient,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    new_status: InstanceStatus,
    files: &FileContents,
) -> Result<()> {
    let application_name = client.application_name();
    let handler = build(instance(tree, path)?, &application_name, client);
    handler
        .change_instance_state(tree, path, plugin, new_status, files)
        .await
}

/// Re-evaluate the instance at `path` after one of its imports changed.
pub async fn update_state_from_imports(
    client: &AgentClient,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    import: Option<&Import>,
    status_on_resolution: InstanceStatus,
) -> Result<()> {
    let application_name = client.application_name();
    let handler = build(instance(tree, path)?, &application_name, client);
    handler
        .update_state_from_imports(tree, path, plugin, import, status_on_resolution)
        .await
}

/// Deploy and start an instance left `WAITING_FOR_ANCESTOR` once its
/// parent is started. Does nothing otherwise.
pub async fn resume_waiting_instance(
    client: &AgentClient,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    files: &FileContents,
) -> Result<()> {
    let application_name = client.application_name();
    let transitions = Transitions {
        application_name: &application_name,
        client,
    };
    waiting_for_ancestor::resume(&transitions, tree, path, plugin, files).await
}
