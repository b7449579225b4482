use crate::error::Result;
use crate::plugin::Plugin;
use crate::transitions::Transitions;
use tracing::debug;
use trellis_model::{FileContents, Import, InstancePath, InstanceStatus, InstanceTree};

/// Only a stop request is honoured. It is applied locally, without any
/// message: the instance and every descendant that is waiting, started,
/// stopped or unresolved become `DEPLOYED_STOPPED`. Descendants in a
/// transitive status keep it.
pub(crate) async fn change_instance_state(
    _transitions: &Transitions<'_>,
    tree: &mut InstanceTree,
    path: &InstancePath,
    _plugin: &dyn Plugin,
    new_status: InstanceStatus,
    _files: &FileContents,
) -> Result<()> {
    if new_status != InstanceStatus::DeployedStopped {
        debug!(instance = %path, target = %new_status, "Waiting for an ancestor, request ignored");
        return Ok(());
    }

    for descendant in tree.descendants(path) {
        if let Some(instance) = tree.get_mut(&descendant) {
            if matches!(
                instance.status,
                InstanceStatus::WaitingForAncestor
                    | InstanceStatus::DeployedStarted
                    | InstanceStatus::DeployedStopped
                    | InstanceStatus::Unresolved
            ) {
                instance.status = InstanceStatus::DeployedStopped;
            }
        }
    }
    Ok(())
}

pub(crate) async fn update_state_from_imports(
    _transitions: &Transitions<'_>,
    _tree: &mut InstanceTree,
    path: &InstancePath,
    _plugin: &dyn Plugin,
    _import: Option<&Import>,
    _status_on_resolution: InstanceStatus,
) -> Result<()> {
    debug!(instance = %path, "Waiting for an ancestor, import change ignored");
    Ok(())
}

/// Deploy and start a waiting instance once its parent runs.
pub(crate) async fn resume(
    transitions: &Transitions<'_>,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    files: &FileContents,
) -> Result<()> {
    let parent_started = tree
        .parent_of(path)
        .map_or(true, |parent| parent.status == InstanceStatus::DeployedStarted);
    if tree.status(path) != Some(InstanceStatus::WaitingForAncestor) || !parent_started {
        return Ok(());
    }

    transitions.deploy(tree, path, plugin, files).await?;
    transitions.start(tree, path, plugin, files).await
}
