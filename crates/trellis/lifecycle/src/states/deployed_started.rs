use crate::error::Result;
use crate::plugin::Plugin;
use crate::transitions::{instance, Transitions};
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
        InstanceStatus::DeployedStopped => transitions.stop(tree, path, plugin, files).await,
        InstanceStatus::NotDeployed => {
            transitions.stop(tree, path, plugin, files).await?;
            transitions.undeploy(tree, path, plugin, files).await
        }
        _ => Ok(()),
    }
}

/// A started instance only forwards import changes to its plugin. Missing
/// imports never stop it.
pub(crate) async fn update_state_from_imports(
    _transitions: &Transitions<'_>,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    import: Option<&Import>,
    status_on_resolution: InstanceStatus,
) -> Result<()> {
    if status_on_resolution != InstanceStatus::DeployedStarted {
        return Ok(());
    }
    let Some(changed) = import else {
        return Ok(());
    };
    debug!(
        instance = %path,
        exporter = %changed.instance_path,
        "Notifying plugin of import change"
    );
    plugin.update(instance(tree, path)?, Some(changed)).await?;
    Ok(())
}
