use crate::error::Result;
use crate::plugin::Plugin;
use crate::transitions::Transitions;
use tracing::debug;
use trellis_model::{FileContents, Import, InstancePath, InstanceStatus, InstanceTree};

pub(crate) async fn change_instance_state(
    transitions: &Transitions<'_>,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    new_status: InstanceStatus,
    files: &FileContents,
) -> Result<()> {
    if new_status == InstanceStatus::NotDeployed {
        return Ok(());
    }

    let parent_started = tree
        .parent_of(path)
        .map_or(true, |parent| parent.status == InstanceStatus::DeployedStarted);
    if !parent_started {
        debug!(instance = %path, "Parent is not started, waiting");
        return transitions
            .set_status(tree, path, InstanceStatus::WaitingForAncestor)
            .await;
    }

    transitions.deploy(tree, path, plugin, files).await?;
    if new_status == InstanceStatus::DeployedStarted {
        transitions.start(tree, path, plugin, files).await?;
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
    debug!(instance = %path, "Not deployed, import change ignored");
    Ok(())
}
