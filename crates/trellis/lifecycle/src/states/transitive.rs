use crate::error::{LifecycleError, Result};
use crate::plugin::Plugin;
use crate::transitions::{instance, Transitions};
use tracing::debug;
use trellis_model::{FileContents, Import, InstancePath, InstanceStatus, InstanceTree};

pub(crate) async fn change_instance_state(
    _transitions: &Transitions<'_>,
    tree: &mut InstanceTree,
    path: &InstancePath,
    _plugin: &dyn Plugin,
    _new_status: InstanceStatus,
    _files: &FileContents,
) -> Result<()> {
    Err(LifecycleError::TransitionInProgress {
        path: path.clone(),
        status: instance(tree, path)?.status,
    })
}

pub(crate) async fn update_state_from_imports(
    _transitions: &Transitions<'_>,
    _tree: &mut InstanceTree,
    path: &InstancePath,
    _plugin: &dyn Plugin,
    _import: Option<&Import>,
    _status_on_resolution: InstanceStatus,
) -> Result<()> {
    debug!(instance = %path, "Transition in progress, import change ignored");
    Ok(())
}
