//! Two agents resolving their dependencies through the in-memory transport

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use trellis_agent::{Agent, AgentConfig};
use trellis_lifecycle::{PluginAction, PluginRegistry, SimulatedPlugin};
use trellis_messaging::{
    DmClient, InMemoryClient, ListenerCommand, Message, MessagingConfig, OwnerProperties,
    RoutingContext,
};
use trellis_model::{
    Component, Facet, FileContents, ImportedVariable, Instance, InstancePath, InstanceStatus,
    InstanceTree,
};

const APP: &str = "shop";

fn application() -> InstanceTree {
    let database = Arc::new(
        Facet::new("database")
            .export("database.ip", None)
            .export("database.port", Some("3306")),
    );
    let vm = Arc::new(
        Component::builder("vm")
            .installer("sim")
            .child("mysql")
            .child("app-server")
            .build(),
    );
    let mysql = Arc::new(
        Component::builder("mysql")
            .installer("sim")
            .facet(database)
            .build(),
    );
    let app_server = Arc::new(
        Component::builder("app-server")
            .installer("sim")
            .export("app-server.url", None)
            .import("database.ip", ImportedVariable::required())
            .import("database.port", ImportedVariable::required())
            .build(),
    );

    let mut tree = InstanceTree::new();
    let db_vm = tree
        .insert_root(Instance::new("db-vm", vm.clone()))
        .unwrap();
    tree.insert_child(&db_vm, Instance::new("mysql", mysql))
        .unwrap();
    let app_vm = tree.insert_root(Instance::new("app-vm", vm)).unwrap();
    tree.insert_child(&app_vm, Instance::new("server", app_server))
        .unwrap();
    tree
}

fn config(scoped_path: &str, ip: &str) -> AgentConfig {
    AgentConfig {
        domain: "test".into(),
        application_name: APP.into(),
        scoped_instance_path: scoped_path.into(),
        ip_address: Some(ip.into()),
        heartbeat_interval_secs: 3600,
        messaging: MessagingConfig {
            connection_required: false,
        },
        ..Default::default()
    }
}

struct Dm {
    client: DmClient,
    inbox: mpsc::Receiver<Message>,
}

impl Dm {
    async fn new(routing: &Arc<RoutingContext>) -> Self {
        let (tx, inbox) = mpsc::channel(256);
        let transport =
            InMemoryClient::new(routing.clone(), tx, OwnerProperties::dm("test"), false);
        let client = DmClient::new(Arc::new(transport), "test");
        client
            .listen_to_agent_messages(APP, ListenerCommand::Start)
            .await
            .unwrap();
        Self { client, inbox }
    }

    async fn request(&self, agent_root: &str, path: &str, status: InstanceStatus) {
        self.client
            .send_message_to_agent(
                APP,
                agent_root,
                Message::CmdChangeInstanceState {
                    instance_path: InstancePath::parse(path).unwrap(),
                    new_status: status,
                    file_contents: FileContents::new(),
                },
            )
            .await
            .unwrap();
    }

    /// Wait until an agent reports `path` in `status`.
    async fn wait_for(&mut self, path: &str, status: InstanceStatus) {
        let expected = InstancePath::parse(path).unwrap();
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(message) = self.inbox.recv().await {
                if let Message::NotifInstanceChanged {
                    instance_path,
                    status: reported,
                    ..
                } = message
                {
                    if instance_path == expected && reported == status {
                        return true;
                    }
                }
            }
            false
        })
        .await;
        assert_eq!(found, Ok(true), "{} never reached {}", path, status);
    }
}

fn plugins() -> (Arc<SimulatedPlugin>, PluginRegistry) {
    let plugin = Arc::new(SimulatedPlugin::new("sim"));
    let mut registry = PluginRegistry::new();
    registry.register(plugin.clone());
    (plugin, registry)
}

#[tokio::test]
async fn test_server_resolves_once_database_starts() {
    let routing = Arc::new(RoutingContext::new());
    let app = application();
    let mut dm = Dm::new(&routing).await;

    let (_, db_plugins) = plugins();
    let (app_plugin, app_plugins) = plugins();
    let db_agent = Agent::start(config("/db-vm", "10.0.0.2"), routing.clone(), db_plugins, &app)
        .await
        .unwrap();
    let app_agent = Agent::start(config("/app-vm", "10.0.0.3"), routing.clone(), app_plugins, &app)
        .await
        .unwrap();

    dm.request("/app-vm", "/app-vm", InstanceStatus::DeployedStarted)
        .await;
    dm.request("/app-vm", "/app-vm/server", InstanceStatus::DeployedStarted)
        .await;
    dm.wait_for("/app-vm/server", InstanceStatus::Unresolved)
        .await;

    dm.request("/db-vm", "/db-vm", InstanceStatus::DeployedStarted)
        .await;
    dm.request("/db-vm", "/db-vm/mysql", InstanceStatus::DeployedStarted)
        .await;
    dm.wait_for("/db-vm/mysql", InstanceStatus::DeployedStarted)
        .await;
    dm.wait_for("/app-vm/server", InstanceStatus::DeployedStarted)
        .await;

    // The database going away does not stop the server
    dm.request("/db-vm", "/db-vm/mysql", InstanceStatus::DeployedStopped)
        .await;
    dm.wait_for("/db-vm/mysql", InstanceStatus::DeployedStopped)
        .await;

    let db_tree = db_agent.stop().await.unwrap();
    let app_tree = app_agent.stop().await.unwrap();

    let server = app_tree
        .get(&InstancePath::parse("/app-vm/server").unwrap())
        .unwrap();
    assert_eq!(server.status, InstanceStatus::DeployedStarted);
    assert_eq!(server.import_count(), 0);
    assert_eq!(app_plugin.calls_of(PluginAction::Start), 2);
    assert_eq!(app_plugin.calls_of(PluginAction::Stop), 0);
    assert_eq!(
        db_tree
            .status(&InstancePath::parse("/db-vm/mysql").unwrap())
            .unwrap(),
        InstanceStatus::DeployedStopped
    );
}

#[tokio::test]
async fn test_late_server_requests_exports() {
    let routing = Arc::new(RoutingContext::new());
    let app = application();
    let mut dm = Dm::new(&routing).await;

    let (_, db_plugins) = plugins();
    let (_, app_plugins) = plugins();
    let db_agent = Agent::start(config("/db-vm", "10.0.0.2"), routing.clone(), db_plugins, &app)
        .await
        .unwrap();

    dm.request("/db-vm", "/db-vm", InstanceStatus::DeployedStarted)
        .await;
    dm.request("/db-vm", "/db-vm/mysql", InstanceStatus::DeployedStarted)
        .await;
    dm.wait_for("/db-vm/mysql", InstanceStatus::DeployedStarted)
        .await;

    // Started after the database published: resolved on request
    let app_agent = Agent::start(config("/app-vm", "10.0.0.3"), routing.clone(), app_plugins, &app)
        .await
        .unwrap();
    dm.request("/app-vm", "/app-vm", InstanceStatus::DeployedStarted)
        .await;
    dm.request("/app-vm", "/app-vm/server", InstanceStatus::DeployedStarted)
        .await;
    dm.wait_for("/app-vm/server", InstanceStatus::DeployedStarted)
        .await;

    let app_tree = app_agent.stop().await.unwrap();
    db_agent.stop().await.unwrap();

    let server = app_tree
        .get(&InstancePath::parse("/app-vm/server").unwrap())
        .unwrap();
    let import = &server.imports["database"][0];
    assert_eq!(import.value("database.ip"), Some("10.0.0.2"));
    assert_eq!(import.value("database.port"), Some("3306"));
    assert_eq!(import.component_name.as_deref(), Some("mysql"));
}

#[tokio::test]
async fn test_heartbeat_and_reconfiguration() {
    let routing = Arc::new(RoutingContext::new());
    let app = application();
    let mut dm = Dm::new(&routing).await;
    let (_, registry) = plugins();

    let mut agent = Agent::start(config("/db-vm", "10.0.0.2"), routing.clone(), registry, &app)
        .await
        .unwrap();

    let heartbeat = tokio::time::timeout(Duration::from_secs(5), dm.inbox.recv())
        .await
        .unwrap();
    assert_eq!(
        heartbeat,
        Some(Message::NotifHeartbeat {
            application_name: APP.into(),
            root_instance_path: InstancePath::parse("/db-vm").unwrap(),
            ip_address: Some("10.0.0.2".into()),
        })
    );

    agent.reconfigure(APP, "/db-vm-2").await.unwrap();
    assert!(routing.subscriptions("shop /db-vm").is_empty());
    assert!(!routing.subscriptions("shop /db-vm-2").is_empty());

    // Commands now reach the agent under its new path
    dm.request("/db-vm-2", "/db-vm", InstanceStatus::DeployedStarted)
        .await;
    dm.wait_for("/db-vm", InstanceStatus::DeployedStarted).await;

    agent.stop().await.unwrap();
    assert!(routing.subscriptions("shop /db-vm-2").is_empty());
}
