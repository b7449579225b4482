use crate::error::Result;
use crate::plugin::Plugin;
use crate::transitions::{instance, Transitions};
use tracing::{debug, info};
use trellis_model::{FileContents, Import, InstancePath, InstanceStatus, InstanceTree};
use trellis_resolution::has_all_required_imports;

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
        // Never started: nothing for the plugin to stop
        InstanceStatus::DeployedStopped => {
            transitions
                .set_status(tree, path, InstanceStatus::DeployedStopped)
                .await
        }
        // A failed undeploy restores UNRESOLVED
        InstanceStatus::NotDeployed => transitions.undeploy(tree, path, plugin, files).await,
        _ => Ok(()),
    }
}

pub(crate) async fn update_state_from_imports(
    transitions: &Transitions<'_>,
    tree: &mut InstanceTree,
    path: &InstancePath,
    plugin: &dyn Plugin,
    _import: Option<&Import>,
    status_on_resolution: InstanceStatus,
) -> Result<()> {
    if !has_all_required_imports(instance(tree, path)?) {
        debug!(instance = %path, "Still unresolved");
        return Ok(());
    }

    info!(instance = %path, target = %status_on_resolution, "Imports resolved");
    if status_on_resolution == InstanceStatus::DeployedStarted {
        return transitions
            .run_start(tree, path, plugin, &FileContents::new())
            .await;
    }

    transitions
        .set_status(tree, path, status_on_resolution)
        .await?;
    transitions.client.publish_exports(tree, path).await?;
    Ok(())
}
