//! Messaging operations of an agent

use crate::client::{ListenerCommand, MessagingClient, OwnerProperties, PublishMode};
use crate::context::{
    for_exported_variables, for_imported_variables, MessagingContext, RecipientKind, ThoseThat,
};
use crate::error::Result;
use crate::messages::Message;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use trellis_model::{Instance, InstancePath, InstanceTree, VariableValues};
use trellis_resolution::{exported_values, exports_for_prefix, variable_prefix};

/// Who an agent is within its application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub application_name: String,
    pub scoped_instance_path: String,
    /// Internal exported variable name to the name other applications see
    pub external_exports: BTreeMap<String, String>,
}

impl AgentIdentity {
    pub fn new(
        application_name: impl Into<String>,
        scoped_instance_path: impl Into<String>,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            scoped_instance_path: scoped_instance_path.into(),
            external_exports: BTreeMap::new(),
        }
    }

    pub fn with_external_export(
        mut self,
        internal: impl Into<String>,
        external: impl Into<String>,
    ) -> Self {
        self.external_exports.insert(internal.into(), external.into());
        self
    }
}

/// Agent-side facade over a [`MessagingClient`].
///
/// Several instances of an agent may share a topic. A topic is subscribed
/// when its first instance starts listening and unsubscribed when its last
/// one stops.
pub struct AgentClient {
    transport: Arc<dyn MessagingClient>,
    domain: String,
    identity: RwLock<AgentIdentity>,
    listeners: Mutex<HashMap<MessagingContext, HashSet<InstancePath>>>,
}

impl AgentClient {
    pub fn new(
        transport: Arc<dyn MessagingClient>,
        domain: impl Into<String>,
        identity: AgentIdentity,
    ) -> Self {
        let domain = domain.into();
        transport.set_owner_properties(OwnerProperties::agent(
            domain.clone(),
            identity.application_name.clone(),
            identity.scoped_instance_path.clone(),
        ));
        Self {
            transport,
            domain,
            identity: RwLock::new(identity),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn MessagingClient> {
        &self.transport
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn identity(&self) -> AgentIdentity {
        self.identity.read().clone()
    }

    pub fn application_name(&self) -> String {
        self.identity.read().application_name.clone()
    }

    /// Replace the agent's identity and re-register the connection under it.
    pub fn set_identity(&self, identity: AgentIdentity) {
        self.transport.set_owner_properties(OwnerProperties::agent(
            self.domain.clone(),
            identity.application_name.clone(),
            identity.scoped_instance_path.clone(),
        ));
        *self.identity.write() = identity;
    }

    pub async fn open_connection(&self) -> Result<()> {
        self.transport.open_connection().await
    }

    pub async fn close_connection(&self) -> Result<()> {
        self.listeners.lock().clear();
        self.transport.close_connection().await
    }

    /// Publish every export of the instance at `path`.
    pub async fn publish_exports(&self, tree: &InstanceTree, path: &InstancePath) -> Result<()> {
        self.publish(tree, path, None).await
    }

    /// Publish the exports of the instance at `path` under one prefix.
    pub async fn publish_exports_for_prefix(
        &self,
        tree: &InstanceTree,
        path: &InstancePath,
        prefix: &str,
    ) -> Result<()> {
        self.publish(tree, path, Some(prefix)).await
    }

    async fn publish(
        &self,
        tree: &InstanceTree,
        path: &InstancePath,
        only: Option<&str>,
    ) -> Result<()> {
        let Some(instance) = tree.get(path) else {
            return Ok(());
        };
        let identity = self.identity();
        let values = exported_values(tree, path);
        let contexts = for_exported_variables(
            &self.domain,
            &identity.application_name,
            instance,
            &identity.external_exports,
            ThoseThat::Import,
        );

        for ctx in contexts {
            let Some(prefix) = ctx.component_or_facet_name().map(str::to_string) else {
                continue;
            };
            if only.is_some_and(|p| p != prefix) {
                continue;
            }

            let exported_variables = match ctx.kind() {
                RecipientKind::InterApp => {
                    external_values(&values, &identity.external_exports, &prefix)
                }
                _ => exports_for_prefix(&values, &prefix),
            };
            let message = Message::AddImport {
                application_name: identity.application_name.clone(),
                component_or_facet_name: prefix,
                added_instance_path: path.clone(),
                added_instance_component: instance.component_name().to_string(),
                exported_variables,
            };
            debug!(instance = %path, topic = %ctx, "Publishing exports");
            self.transport.publish(&ctx, message, PublishMode::BestEffort).await?;
        }
        Ok(())
    }

    /// Withdraw every export of `instance`.
    pub async fn unpublish_exports(&self, instance: &Instance) -> Result<()> {
        let identity = self.identity();
        let contexts = for_exported_variables(
            &self.domain,
            &identity.application_name,
            instance,
            &identity.external_exports,
            ThoseThat::Import,
        );
        for ctx in contexts {
            let Some(prefix) = ctx.component_or_facet_name().map(str::to_string) else {
                continue;
            };
            let message = Message::RemoveImport {
                application_name: identity.application_name.clone(),
                component_or_facet_name: prefix,
                removed_instance_path: instance.path.clone(),
            };
            debug!(instance = %instance.path, topic = %ctx, "Unpublishing exports");
            self.transport.publish(&ctx, message, PublishMode::BestEffort).await?;
        }
        Ok(())
    }

    /// Start or stop receiving the exports `instance` imports.
    pub async fn listen_to_exports_from_other_agents(
        &self,
        command: ListenerCommand,
        instance: &Instance,
    ) -> Result<()> {
        let contexts = for_imported_variables(
            &self.domain,
            &self.application_name(),
            instance,
            ThoseThat::Import,
        );
        self.apply_listener(command, &instance.path, contexts).await
    }

    /// Ask the exporters of every prefix `instance` imports to publish again.
    pub async fn request_exports_from_other_agents(&self, instance: &Instance) -> Result<()> {
        let application_name = self.application_name();
        let contexts =
            for_imported_variables(&self.domain, &application_name, instance, ThoseThat::Export);
        for ctx in contexts {
            let Some(prefix) = ctx.component_or_facet_name().map(str::to_string) else {
                continue;
            };
            let message = Message::RequestImport {
                application_name: application_name.clone(),
                component_or_facet_name: prefix,
            };
            debug!(instance = %instance.path, topic = %ctx, "Requesting exports");
            self.transport.publish(&ctx, message, PublishMode::BestEffort).await?;
        }
        Ok(())
    }

    /// Start or stop answering export requests for what `instance` exports.
    pub async fn listen_to_requests_from_other_agents(
        &self,
        command: ListenerCommand,
        instance: &Instance,
    ) -> Result<()> {
        let identity = self.identity();
        let contexts = for_exported_variables(
            &self.domain,
            &identity.application_name,
            instance,
            &identity.external_exports,
            ThoseThat::Export,
        );
        self.apply_listener(command, &instance.path, contexts).await
    }

    /// Start or stop receiving the DM's messages.
    pub async fn listen_to_the_dm(&self, command: ListenerCommand) -> Result<()> {
        let ctx = self.dm_listening_context();
        debug!(topic = %ctx, command = %command, "Listening to the DM");
        match command {
            ListenerCommand::Start => self.transport.subscribe(&ctx).await,
            ListenerCommand::Stop => self.transport.unsubscribe(&ctx).await,
        }
    }

    pub async fn send_message_to_the_dm(&self, message: Message) -> Result<()> {
        let ctx = MessagingContext::for_dm(&self.domain, self.application_name());
        self.transport.publish(&ctx, message, PublishMode::BestEffort).await
    }

    fn dm_listening_context(&self) -> MessagingContext {
        let identity = self.identity.read();
        MessagingContext::for_agent(
            &self.domain,
            identity.application_name.clone(),
            identity.scoped_instance_path.clone(),
        )
    }

    /// Number of instances holding a subscription to `ctx`.
    pub fn listener_count(&self, ctx: &MessagingContext) -> usize {
        self.listeners.lock().get(ctx).map_or(0, HashSet::len)
    }

    async fn apply_listener(
        &self,
        command: ListenerCommand,
        holder: &InstancePath,
        contexts: HashSet<MessagingContext>,
    ) -> Result<()> {
        for ctx in contexts {
            let changed = {
                let mut listeners = self.listeners.lock();
                match command {
                    ListenerCommand::Start => {
                        let holders = listeners.entry(ctx.clone()).or_default();
                        let first = holders.is_empty();
                        holders.insert(holder.clone());
                        first
                    }
                    ListenerCommand::Stop => match listeners.get_mut(&ctx) {
                        Some(holders) => {
                            holders.remove(holder);
                            let last = holders.is_empty();
                            if last {
                                listeners.remove(&ctx);
                            }
                            last
                        }
                        None => false,
                    },
                }
            };

            if changed {
                match command {
                    ListenerCommand::Start => self.transport.subscribe(&ctx).await?,
                    ListenerCommand::Stop => self.transport.unsubscribe(&ctx).await?,
                }
            }
        }
        Ok(())
    }
}

/// Values bound to external names whose prefix is `external_prefix`,
/// renamed to those external names.
fn external_values(
    values: &VariableValues,
    external_exports: &BTreeMap<String, String>,
    external_prefix: &str,
) -> VariableValues {
    external_exports
        .iter()
        .filter(|(_, external)| variable_prefix(external) == external_prefix)
        .filter_map(|(internal, external)| {
            values
                .get(internal)
                .map(|v| (external.clone(), v.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryClient;
    use crate::routing::RoutingContext;
    use tokio::sync::mpsc;
    use trellis_model::{Component, ImportedVariable, DATA_IP_ADDRESS};

    struct Fixture {
        routing: Arc<RoutingContext>,
        client: AgentClient,
    }

    fn fixture(identity: AgentIdentity) -> Fixture {
        let routing = Arc::new(RoutingContext::new());
        let (tx, _rx) = mpsc::channel(16);
        let transport = InMemoryClient::new(
            routing.clone(),
            tx,
            OwnerProperties::agent("d", "app", "/vm"),
            false,
        );
        let client = AgentClient::new(Arc::new(transport), "d", identity);
        Fixture { routing, client }
    }

    fn observer(routing: &Arc<RoutingContext>, ctx: MessagingContext) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(16);
        routing.register("observer", tx);
        routing.subscribe("observer", ctx);
        rx
    }

    fn tree() -> (InstanceTree, InstancePath, InstancePath) {
        let vm = Arc::new(Component::builder("vm").child("mysql").child("tomcat").build());
        let mysql = Arc::new(
            Component::builder("mysql")
                .export("mysql.ip", None)
                .export("mysql.port", Some("3306"))
                .build(),
        );
        let tomcat = Arc::new(
            Component::builder("tomcat")
                .import("mysql.ip", ImportedVariable::required())
                .build(),
        );
        let mut tree = InstanceTree::new();
        let root = tree
            .insert_root(Instance::new("vm", vm).with_data(DATA_IP_ADDRESS, "10.0.0.4"))
            .unwrap();
        let db = tree.insert_child(&root, Instance::new("db", mysql)).unwrap();
        let web = tree.insert_child(&root, Instance::new("web", tomcat)).unwrap();
        (tree, db, web)
    }

    #[tokio::test]
    async fn test_publish_exports() {
        let fx = fixture(AgentIdentity::new("app", "/vm"));
        let mut rx = observer(
            &fx.routing,
            MessagingContext::for_agents("d", "app", "mysql", ThoseThat::Import),
        );
        let (tree, db, _) = tree();

        fx.client.publish_exports(&tree, &db).await.unwrap();

        match rx.recv().await {
            Some(Message::AddImport {
                component_or_facet_name,
                added_instance_path,
                added_instance_component,
                exported_variables,
                ..
            }) => {
                assert_eq!(component_or_facet_name, "mysql");
                assert_eq!(added_instance_path, db);
                assert_eq!(added_instance_component, "mysql");
                assert_eq!(exported_variables["mysql.ip"], "10.0.0.4");
                assert_eq!(exported_variables["mysql.port"], "3306");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_external_exports_are_renamed() {
        let identity =
            AgentIdentity::new("app", "/vm").with_external_export("mysql.port", "store.port");
        let fx = fixture(identity);
        let mut rx = observer(
            &fx.routing,
            MessagingContext::for_inter_app("d", "store", ThoseThat::Import),
        );
        let (tree, db, _) = tree();

        fx.client.publish_exports(&tree, &db).await.unwrap();

        match rx.recv().await {
            Some(Message::AddImport { exported_variables, .. }) => {
                assert_eq!(exported_variables.len(), 1);
                assert_eq!(exported_variables["store.port"], "3306");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shared_topic_survives_until_last_holder_stops() {
        let fx = fixture(AgentIdentity::new("app", "/vm"));
        let (mut tree, _, web) = tree();
        let root = tree.roots()[0].clone();
        let tomcat = tree.get(&web).unwrap().component.clone();
        let web2 = tree.insert_child(&root, Instance::new("web2", tomcat)).unwrap();
        let ctx = MessagingContext::for_agents("d", "app", "mysql", ThoseThat::Import);
        let owner = "app /vm";

        let first = tree.get(&web).unwrap();
        let second = tree.get(&web2).unwrap();
        fx.client
            .listen_to_exports_from_other_agents(ListenerCommand::Start, first)
            .await
            .unwrap();
        fx.client
            .listen_to_exports_from_other_agents(ListenerCommand::Start, second)
            .await
            .unwrap();
        assert_eq!(fx.client.listener_count(&ctx), 2);

        fx.client
            .listen_to_exports_from_other_agents(ListenerCommand::Stop, first)
            .await
            .unwrap();
        assert!(fx.routing.subscriptions(owner).contains(&ctx));

        fx.client
            .listen_to_exports_from_other_agents(ListenerCommand::Stop, second)
            .await
            .unwrap();
        assert!(!fx.routing.subscriptions(owner).contains(&ctx));
    }

    #[tokio::test]
    async fn test_requests_go_to_exporters() {
        let fx = fixture(AgentIdentity::new("app", "/vm"));
        let mut rx = observer(
            &fx.routing,
            MessagingContext::for_agents("d", "app", "mysql", ThoseThat::Export),
        );
        let (tree, _, web) = tree();

        fx.client
            .request_exports_from_other_agents(tree.get(&web).unwrap())
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Message::RequestImport {
                application_name: "app".into(),
                component_or_facet_name: "mysql".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_set_identity_renames_owner() {
        let fx = fixture(AgentIdentity::new("app", "/vm"));
        fx.client.listen_to_the_dm(ListenerCommand::Start).await.unwrap();
        assert_eq!(fx.routing.subscriptions("app /vm").len(), 1);

        fx.client.set_identity(AgentIdentity::new("app", "/vm2"));
        assert!(fx.routing.subscriptions("app /vm").is_empty());
        assert_eq!(fx.routing.subscriptions("app /vm2").len(), 1);
    }
}
