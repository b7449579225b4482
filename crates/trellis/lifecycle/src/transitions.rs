//! Transition primitives shared by the state variants
//!
//! Every primitive moves the instance through its transitive status, runs
//! the plugin hook, then settles on the target status. A failing hook puts
//! the previous status back and the error is returned.

use crate::error::{LifecycleError, Result};
use crate::plugin::{Plugin, PluginResult};
use tracing::{debug, error, warn};
use trellis_messaging::{AgentClient, ListenerCommand, Message};
use trellis_model::{FileContents, Instance, InstancePath, InstanceStatus, InstanceTree};
use trellis_resolution::has_all_required_imports;

pub(crate) fn instance<'t>(tree: &'t InstanceTree, path: &InstancePath) -> Result<&'t Instance> {
    tree.get(path)
        .ok_or_else(|| LifecycleError::InstanceNotFound(path.clone()))
}

/// Side effects available to a state variant
pub(crate) struct Transitions<'a> {
    pub(crate) application_name: &'a str,
    pub(crate) client: &'a AgentClient,
}

impl Transitions<'_> {
    /// Tell the DM about the instance's current status.
    ///
    /// Failures are logged; the DM can always ask for a full report.
    pub(crate) async fn notify(&self, tree: &InstanceTree, path: &InstancePath) {
        let Some(status) = tree.status(path) else {
            return;
        };
        let message = Message::NotifInstanceChanged {
            application_name: self.application_name.to_string(),
            instance_path: path.clone(),
            status,
        };
        if let Err(e) = self.client.send_message_to_the_dm(message).await {
            warn!(instance = %path, error = %e, "Failed to notify the DM");
        }
    }

    pub(crate) async fn set_status(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        status: InstanceStatus,
    ) -> Result<()> {
        let instance = tree
            .get_mut(path)
            .ok_or_else(|| LifecycleError::InstanceNotFound(path.clone()))?;
        debug!(instance = %path, from = %instance.status, to = %status, "Status changed");
        instance.status = status;
        self.notify(tree, path).await;
        Ok(())
    }

    async fn settle(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        previous: InstanceStatus,
        target: InstanceStatus,
        outcome: PluginResult<()>,
    ) -> Result<()> {
        match outcome {
            Ok(()) => self.set_status(tree, path, target).await,
            Err(e) => {
                error!(instance = %path, error = %e, restored = %previous, "Plugin failed");
                self.set_status(tree, path, previous).await?;
                Err(e.into())
            }
        }
    }

    /// Install the instance. It ends `DEPLOYED_STOPPED` and listens for its
    /// imports.
    pub(crate) async fn deploy(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        files: &FileContents,
    ) -> Result<()> {
        let previous = instance(tree, path)?.status;
        self.set_status(tree, path, InstanceStatus::Deploying).await?;

        let target = instance(tree, path)?;
        let outcome = match plugin.initialize(target).await {
            Ok(()) => plugin.deploy(target, files).await,
            Err(e) => Err(e),
        };
        self.settle(tree, path, previous, InstanceStatus::DeployedStopped, outcome)
            .await?;

        self.client
            .listen_to_exports_from_other_agents(ListenerCommand::Start, instance(tree, path)?)
            .await?;
        Ok(())
    }

    /// Start the instance, or park it in `UNRESOLVED` while required imports
    /// are missing.
    pub(crate) async fn start(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        files: &FileContents,
    ) -> Result<()> {
        if !has_all_required_imports(instance(tree, path)?) {
            self.set_status(tree, path, InstanceStatus::Unresolved).await?;
            self.client
                .request_exports_from_other_agents(instance(tree, path)?)
                .await?;
            return Ok(());
        }
        self.run_start(tree, path, plugin, files).await
    }

    /// Start the instance without checking its imports.
    pub(crate) async fn run_start(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        files: &FileContents,
    ) -> Result<()> {
        let previous = instance(tree, path)?.status;
        self.set_status(tree, path, InstanceStatus::Starting).await?;

        let outcome = plugin.start(instance(tree, path)?, files).await;
        self.settle(tree, path, previous, InstanceStatus::DeployedStarted, outcome)
            .await?;

        self.client.publish_exports(tree, path).await?;
        let started = instance(tree, path)?;
        self.client
            .listen_to_requests_from_other_agents(ListenerCommand::Start, started)
            .await?;
        self.client.request_exports_from_other_agents(started).await?;
        Ok(())
    }

    /// Stop the instance and withdraw its exports.
    pub(crate) async fn stop(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        files: &FileContents,
    ) -> Result<()> {
        let previous = instance(tree, path)?.status;
        self.set_status(tree, path, InstanceStatus::Stopping).await?;

        let outcome = plugin.stop(instance(tree, path)?, files).await;
        self.settle(tree, path, previous, InstanceStatus::DeployedStopped, outcome)
            .await?;

        self.withdraw_exports(instance(tree, path)?).await
    }

    /// Uninstall the instance. Its imports stay cached.
    pub(crate) async fn undeploy(
        &self,
        tree: &mut InstanceTree,
        path: &InstancePath,
        plugin: &dyn Plugin,
        files: &FileContents,
    ) -> Result<()> {
        let previous = instance(tree, path)?.status;
        self.set_status(tree, path, InstanceStatus::Undeploying).await?;

        let outcome = plugin.undeploy(instance(tree, path)?, files).await;
        self.settle(tree, path, previous, InstanceStatus::NotDeployed, outcome)
            .await?;

        let undeployed = instance(tree, path)?;
        self.withdraw_exports(undeployed).await?;
        self.client
            .listen_to_exports_from_other_agents(ListenerCommand::Stop, undeployed)
            .await?;
        Ok(())
    }

    async fn withdraw_exports(&self, instance: &Instance) -> Result<()> {
        self.client.unpublish_exports(instance).await?;
        self.client
            .listen_to_requests_from_other_agents(ListenerCommand::Stop, instance)
            .await?;
        Ok(())
    }
}
