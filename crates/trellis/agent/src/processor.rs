//! Serial processing of the messages an agent receives
//!
//! The processor owns the agent's instance tree. Messages are applied one at
//! a time, so transitions and import updates never overlap.

use crate::error::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trellis_lifecycle::{
    change_instance_state, resume_waiting_instance, update_state_from_imports, LifecycleError,
    Plugin, PluginRegistry,
};
use trellis_messaging::{AgentClient, Message};
use trellis_model::{
    FileContents, Instance, InstancePath, InstanceStatus, InstanceTree, VariableValues,
};
use trellis_resolution::{
    add_import, build_tailored_import, find_prefixes_for_external_imports,
    find_prefixes_for_imported_variables, remove_import,
};

/// Counters exposed for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorStats {
    pub started_at: DateTime<Utc>,
    pub processed: u64,
    pub failed: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Default for ProcessorStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            processed: 0,
            failed: 0,
            last_message_at: None,
        }
    }
}

/// Applies inbound messages to the agent's instances
pub struct AgentMessageProcessor {
    client: Arc<AgentClient>,
    plugins: PluginRegistry,
    tree: InstanceTree,
    stats: ProcessorStats,
}

impl AgentMessageProcessor {
    pub fn new(client: Arc<AgentClient>, plugins: PluginRegistry, tree: InstanceTree) -> Self {
        Self {
            client,
            plugins,
            tree,
            stats: ProcessorStats::default(),
        }
    }

    pub fn tree(&self) -> &InstanceTree {
        &self.tree
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    pub fn into_tree(self) -> InstanceTree {
        self.tree
    }

    /// Process messages until `shutdown` fires or every sender is gone.
    ///
    /// On shutdown the queue is closed and the messages already in it are
    /// still processed.
    pub async fn run(
        mut self,
        mut queue: mpsc::Receiver<Message>,
        shutdown: CancellationToken,
    ) -> Self {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    queue.close();
                    while let Some(message) = queue.recv().await {
                        self.process(message).await;
                    }
                    break;
                }
                message = queue.recv() => match message {
                    Some(message) => self.process(message).await,
                    None => break,
                },
            }
        }
        info!(processed = self.stats.processed, "Message processor stopped");
        self
    }

    /// Apply one message. Failures are logged, never propagated.
    pub async fn process(&mut self, message: Message) {
        let kind = message.kind_name();
        self.stats.processed += 1;
        self.stats.last_message_at = Some(Utc::now());

        if let Err(e) = self.handle(message).await {
            self.stats.failed += 1;
            error!(message = kind, error = %e, "Failed to process message");
        }
    }

    pub async fn handle(&mut self, message: Message) -> Result<()> {
        match message {
            Message::CmdChangeInstanceState {
                instance_path,
                new_status,
                file_contents,
            } => {
                self.change_state(&instance_path, new_status, &file_contents)
                    .await
            }
            Message::CmdRemoveInstance { instance_path } => {
                self.remove_instance(&instance_path).await
            }
            Message::CmdSendInstances => self.send_instances().await,
            Message::AddImport {
                application_name,
                component_or_facet_name,
                added_instance_path,
                added_instance_component,
                exported_variables,
            } => {
                self.add_import(
                    &application_name,
                    &component_or_facet_name,
                    &added_instance_path,
                    &added_instance_component,
                    &exported_variables,
                )
                .await
            }
            Message::RemoveImport {
                application_name,
                component_or_facet_name,
                removed_instance_path,
            } => {
                self.remove_import(
                    &application_name,
                    &component_or_facet_name,
                    &removed_instance_path,
                )
                .await
            }
            Message::RequestImport {
                component_or_facet_name,
                ..
            } => self.republish_exports(&component_or_facet_name).await,
            other @ (Message::NotifHeartbeat { .. }
            | Message::NotifInstanceChanged { .. }
            | Message::NotifInstanceRemoved { .. }) => {
                debug!(message = other.kind_name(), "Not meant for agents, ignored");
                Ok(())
            }
        }
    }

    /// Transition an instance, taking its descendants along: they are
    /// stopped or undeployed first, and resumed once it runs.
    async fn change_state(
        &mut self,
        path: &InstancePath,
        new_status: InstanceStatus,
        files: &FileContents,
    ) -> Result<()> {
        if matches!(
            new_status,
            InstanceStatus::DeployedStopped | InstanceStatus::NotDeployed
        ) {
            let mut descendants = self.tree.descendants(path);
            descendants.reverse();
            for descendant in descendants.iter().filter(|d| *d != path) {
                let affected = match self.tree.status(descendant) {
                    Some(InstanceStatus::DeployedStarted | InstanceStatus::Unresolved) => true,
                    Some(InstanceStatus::DeployedStopped) => {
                        new_status == InstanceStatus::NotDeployed
                    }
                    _ => false,
                };
                if affected {
                    self.apply(descendant, new_status, &FileContents::new()).await?;
                }
            }
        }

        self.apply(path, new_status, files).await?;
        self.resume_waiting_descendants(path).await
    }

    async fn apply(
        &mut self,
        path: &InstancePath,
        new_status: InstanceStatus,
        files: &FileContents,
    ) -> Result<()> {
        let plugin = self.plugin_for(path)?;
        change_instance_state(
            &self.client,
            &mut self.tree,
            path,
            plugin.as_ref(),
            new_status,
            files,
        )
        .await?;
        Ok(())
    }

    async fn resume_waiting_descendants(&mut self, path: &InstancePath) -> Result<()> {
        for descendant in self.tree.descendants(path) {
            if self.tree.status(&descendant) != Some(InstanceStatus::WaitingForAncestor) {
                continue;
            }
            let plugin = self.plugin_for(&descendant)?;
            resume_waiting_instance(
                &self.client,
                &mut self.tree,
                &descendant,
                plugin.as_ref(),
                &FileContents::new(),
            )
            .await?;
        }
        Ok(())
    }

    async fn add_import(
        &mut self,
        application_name: &str,
        prefix: &str,
        exporter: &InstancePath,
        exporter_component: &str,
        variables: &VariableValues,
    ) -> Result<()> {
        for path in self.importers(application_name, prefix, exporter) {
            let Some(instance) = self.tree.get_mut(&path) else {
                continue;
            };
            let import =
                build_tailored_import(instance, exporter, Some(exporter_component), variables);
            if !add_import(instance, prefix, import.clone()) {
                continue;
            }

            let plugin = self.plugin_for(&path)?;
            update_state_from_imports(
                &self.client,
                &mut self.tree,
                &path,
                plugin.as_ref(),
                Some(&import),
                InstanceStatus::DeployedStarted,
            )
            .await?;
            self.resume_waiting_descendants(&path).await?;
        }
        Ok(())
    }

    async fn remove_import(
        &mut self,
        application_name: &str,
        prefix: &str,
        exporter: &InstancePath,
    ) -> Result<()> {
        for path in self.importers(application_name, prefix, exporter) {
            let Some(instance) = self.tree.get_mut(&path) else {
                continue;
            };
            let Some(removed) = remove_import(instance, prefix, exporter) else {
                continue;
            };

            let plugin = self.plugin_for(&path)?;
            update_state_from_imports(
                &self.client,
                &mut self.tree,
                &path,
                plugin.as_ref(),
                Some(&removed),
                InstanceStatus::DeployedStarted,
            )
            .await?;
        }
        Ok(())
    }

    /// Local instances that import `prefix` from `application_name`.
    ///
    /// Imports from another application are only taken by external
    /// imports. An instance never imports from itself.
    fn importers(
        &self,
        application_name: &str,
        prefix: &str,
        exporter: &InstancePath,
    ) -> Vec<InstancePath> {
        let same_application = application_name == self.client.application_name();
        self.tree
            .iter()
            .filter(|instance| !(same_application && &instance.path == exporter))
            .filter(|instance| {
                let external = find_prefixes_for_external_imports(instance).contains(prefix);
                find_prefixes_for_imported_variables(instance).contains(prefix)
                    && external != same_application
            })
            .map(|instance| instance.path.clone())
            .collect()
    }

    async fn republish_exports(&self, prefix: &str) -> Result<()> {
        let started: Vec<InstancePath> = self
            .tree
            .iter()
            .filter(|i| i.status == InstanceStatus::DeployedStarted)
            .map(|i| i.path.clone())
            .collect();
        for path in started {
            self.client
                .publish_exports_for_prefix(&self.tree, &path, prefix)
                .await?;
        }
        Ok(())
    }

    async fn send_instances(&self) -> Result<()> {
        let application_name = self.client.application_name();
        for instance in self.tree.iter() {
            let message = Message::NotifInstanceChanged {
                application_name: application_name.clone(),
                instance_path: instance.path.clone(),
                status: instance.status,
            };
            self.client.send_message_to_the_dm(message).await?;
        }
        Ok(())
    }

    /// Remove an instance and its descendants, provided none is deployed.
    async fn remove_instance(&mut self, path: &InstancePath) -> Result<()> {
        let deployed: Vec<&Instance> = self
            .tree
            .descendants(path)
            .iter()
            .filter_map(|p| self.tree.get(p))
            .filter(|i| i.status != InstanceStatus::NotDeployed)
            .collect();
        if let Some(blocking) = deployed.first() {
            warn!(
                instance = %path,
                blocking = %blocking.path,
                status = %blocking.status,
                "Instance still deployed, not removed"
            );
            return Ok(());
        }

        let application_name = self.client.application_name();
        for removed in self.tree.remove(path) {
            info!(instance = %removed, "Instance removed");
            self.client
                .send_message_to_the_dm(Message::NotifInstanceRemoved {
                    application_name: application_name.clone(),
                    instance_path: removed,
                })
                .await?;
        }
        Ok(())
    }

    fn plugin_for(&self, path: &InstancePath) -> Result<Arc<dyn Plugin>> {
        let instance = self
            .tree
            .get(path)
            .ok_or_else(|| LifecycleError::InstanceNotFound(path.clone()))?;
        Ok(self.plugins.for_instance(instance)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_lifecycle::{PluginAction, SimulatedPlugin};
    use trellis_messaging::{
        AgentIdentity, InMemoryClient, MessagingContext, OwnerProperties, RoutingContext,
    };
    use trellis_model::{Component, Import, ImportedVariable};

    struct Fixture {
        processor: AgentMessageProcessor,
        plugin: Arc<SimulatedPlugin>,
        dm: mpsc::Receiver<Message>,
        vm: InstancePath,
        server: InstancePath,
    }

    fn fixture() -> Fixture {
        let routing = Arc::new(RoutingContext::new());
        let (dm_tx, dm) = mpsc::channel(64);
        routing.register("DM", dm_tx);
        routing.subscribe("DM", MessagingContext::for_dm("d", "shop"));

        let (tx, _rx) = mpsc::channel(64);
        let transport = InMemoryClient::new(
            routing,
            tx,
            OwnerProperties::agent("d", "shop", "/vm"),
            false,
        );
        let client = Arc::new(AgentClient::new(
            Arc::new(transport),
            "d",
            AgentIdentity::new("shop", "/vm"),
        ));

        let vm_type = Arc::new(
            Component::builder("vm")
                .installer("sim")
                .child("app-server")
                .build(),
        );
        let server_type = Arc::new(
            Component::builder("app-server")
                .installer("sim")
                .export("app-server.url", Some("http://vm:8080"))
                .import("database.ip", ImportedVariable::required())
                .import("billing.url", ImportedVariable::external(true))
                .build(),
        );
        let mut tree = InstanceTree::new();
        let vm = tree.insert_root(Instance::new("vm", vm_type)).unwrap();
        let server = tree
            .insert_child(&vm, Instance::new("server", server_type))
            .unwrap();

        let plugin = Arc::new(SimulatedPlugin::new("sim"));
        let mut plugins = PluginRegistry::new();
        plugins.register(plugin.clone());

        Fixture {
            processor: AgentMessageProcessor::new(client, plugins, tree),
            plugin,
            dm,
            vm,
            server,
        }
    }

    fn change(path: &InstancePath, status: InstanceStatus) -> Message {
        Message::CmdChangeInstanceState {
            instance_path: path.clone(),
            new_status: status,
            file_contents: FileContents::new(),
        }
    }

    fn add_import_message(app: &str, prefix: &str, exporter: &str, var: &str) -> Message {
        let mut vars = VariableValues::new();
        vars.insert(var.to_string(), "value".to_string());
        Message::AddImport {
            application_name: app.to_string(),
            component_or_facet_name: prefix.to_string(),
            added_instance_path: InstancePath::parse(exporter).unwrap(),
            added_instance_component: "exporter".to_string(),
            exported_variables: vars,
        }
    }

    fn imports<'a>(fx: &'a Fixture, prefix: &str) -> &'a [Import] {
        trellis_resolution::imports_for(fx.processor.tree().get(&fx.server).unwrap(), prefix)
    }

    #[tokio::test]
    async fn test_internal_and_external_imports() {
        let mut fx = fixture();

        // Internal prefix from another application: not for us
        fx.processor
            .handle(add_import_message("other", "database", "/db", "database.ip"))
            .await
            .unwrap();
        assert!(imports(&fx, "database").is_empty());

        // External prefix from our own application: not for us either
        fx.processor
            .handle(add_import_message("shop", "billing", "/pay", "billing.url"))
            .await
            .unwrap();
        assert!(imports(&fx, "billing").is_empty());

        fx.processor
            .handle(add_import_message("shop", "database", "/db", "database.ip"))
            .await
            .unwrap();
        fx.processor
            .handle(add_import_message("billing-app", "billing", "/pay", "billing.url"))
            .await
            .unwrap();
        assert_eq!(imports(&fx, "database").len(), 1);
        assert_eq!(imports(&fx, "billing").len(), 1);
        assert_eq!(
            imports(&fx, "database")[0].component_name.as_deref(),
            Some("exporter")
        );
    }

    #[tokio::test]
    async fn test_resolution_through_messages() {
        let mut fx = fixture();
        let (vm, server) = (fx.vm.clone(), fx.server.clone());

        fx.processor
            .handle(change(&vm, InstanceStatus::DeployedStarted))
            .await
            .unwrap();
        fx.processor
            .handle(change(&server, InstanceStatus::DeployedStarted))
            .await
            .unwrap();
        assert_eq!(
            fx.processor.tree().status(&server),
            Some(InstanceStatus::Unresolved)
        );

        fx.processor
            .handle(add_import_message("shop", "database", "/db", "database.ip"))
            .await
            .unwrap();
        assert_eq!(
            fx.processor.tree().status(&server),
            Some(InstanceStatus::DeployedStarted)
        );

        // Losing the import does not stop the server
        fx.processor
            .handle(Message::RemoveImport {
                application_name: "shop".into(),
                component_or_facet_name: "database".into(),
                removed_instance_path: InstancePath::parse("/db").unwrap(),
            })
            .await
            .unwrap();
        assert!(imports(&fx, "database").is_empty());
        assert_eq!(
            fx.processor.tree().status(&server),
            Some(InstanceStatus::DeployedStarted)
        );
        assert_eq!(fx.plugin.calls_of(PluginAction::Update), 1);
    }

    #[tokio::test]
    async fn test_waiting_child_resumes_with_parent() {
        let mut fx = fixture();
        let (vm, server) = (fx.vm.clone(), fx.server.clone());
        fx.processor
            .handle(add_import_message("shop", "database", "/db", "database.ip"))
            .await
            .unwrap();

        fx.processor
            .handle(change(&server, InstanceStatus::DeployedStarted))
            .await
            .unwrap();
        assert_eq!(
            fx.processor.tree().status(&server),
            Some(InstanceStatus::WaitingForAncestor)
        );

        fx.processor
            .handle(change(&vm, InstanceStatus::DeployedStarted))
            .await
            .unwrap();
        assert_eq!(
            fx.processor.tree().status(&server),
            Some(InstanceStatus::DeployedStarted)
        );
    }

    #[tokio::test]
    async fn test_stopping_parent_stops_children_first() {
        let mut fx = fixture();
        let (vm, server) = (fx.vm.clone(), fx.server.clone());
        fx.processor
            .handle(add_import_message("shop", "database", "/db", "database.ip"))
            .await
            .unwrap();
        fx.processor
            .handle(change(&vm, InstanceStatus::DeployedStarted))
            .await
            .unwrap();
        fx.processor
            .handle(change(&server, InstanceStatus::DeployedStarted))
            .await
            .unwrap();

        fx.processor
            .handle(change(&vm, InstanceStatus::NotDeployed))
            .await
            .unwrap();

        let undeploys: Vec<InstancePath> = fx
            .plugin
            .calls()
            .into_iter()
            .filter(|(action, _)| *action == PluginAction::Undeploy)
            .map(|(_, path)| path)
            .collect();
        assert_eq!(undeploys, vec![server.clone(), vm.clone()]);
        assert_eq!(
            fx.processor.tree().status(&server),
            Some(InstanceStatus::NotDeployed)
        );
    }

    #[tokio::test]
    async fn test_remove_instance_requires_not_deployed() {
        let mut fx = fixture();
        let (vm, server) = (fx.vm.clone(), fx.server.clone());
        fx.processor
            .handle(change(&vm, InstanceStatus::DeployedStopped))
            .await
            .unwrap();

        fx.processor
            .handle(Message::CmdRemoveInstance {
                instance_path: vm.clone(),
            })
            .await
            .unwrap();
        assert_eq!(fx.processor.tree().len(), 2);

        fx.processor
            .handle(Message::CmdRemoveInstance {
                instance_path: server.clone(),
            })
            .await
            .unwrap();
        assert_eq!(fx.processor.tree().len(), 1);

        let mut removed = Vec::new();
        while let Ok(message) = fx.dm.try_recv() {
            if let Message::NotifInstanceRemoved { instance_path, .. } = message {
                removed.push(instance_path);
            }
        }
        assert_eq!(removed, vec![server]);
    }

    #[tokio::test]
    async fn test_send_instances() {
        let mut fx = fixture();
        fx.processor.handle(Message::CmdSendInstances).await.unwrap();

        let mut reported = Vec::new();
        while let Ok(message) = fx.dm.try_recv() {
            if let Message::NotifInstanceChanged {
                instance_path,
                status,
                ..
            } = message
            {
                reported.push((instance_path, status));
            }
        }
        assert_eq!(reported.len(), 2);
        assert!(reported
            .iter()
            .all(|(_, status)| *status == InstanceStatus::NotDeployed));
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let mut fx = fixture();
        let vm = fx.vm.clone();
        fx.plugin.fail_on(PluginAction::Deploy);

        fx.processor
            .process(change(&vm, InstanceStatus::DeployedStarted))
            .await;
        fx.processor.process(Message::CmdSendInstances).await;

        assert_eq!(fx.processor.stats().processed, 2);
        assert_eq!(fx.processor.stats().failed, 1);
        assert!(fx.processor.stats().last_message_at.is_some());
        assert_eq!(
            fx.processor.tree().status(&vm),
            Some(InstanceStatus::NotDeployed)
        );
    }
}
