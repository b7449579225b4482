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
    match new_status {
        InstanceStatus::DeployedStarted => transitions.start(tree, path, plugin, files).await,
        InstanceStatus::NotDeployed => transitions.undeploy(tree, path, plugin, files).await,
        _ => Ok(()),
    }
}

pub(crate) async fn update_state_from_imports(
    _transitions: &Transitions<'_>,
    _tree: &mut InstanceTree,
    path: &InstancePath,
    _plugin: &dyn Plugin,
    _import: Option<&Import>,
    _status_on_resolution: InstanceStatus,
) -> Result<()> {
    debug!(instance = %path, "Stopped, import change ignored");
    Ok(())
}
