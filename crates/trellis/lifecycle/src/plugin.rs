//! Plugins execute the actual work of a transition
//!
//! A component's `installer_name` selects the plugin in charge of its
//! instances. Plugin hooks are awaited by the state machine; a failing hook
//! leaves the instance in its previous status.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use trellis_model::{FileContents, Import, Instance, InstancePath};

/// Name of the built-in plugin that only logs
pub const LOGGER_INSTALLER: &str = "logger";

// ── Errors ─────────────────────────────────────────────────────────────

/// Hook a plugin was asked to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginAction {
    Initialize,
    Deploy,
    Start,
    Stop,
    Undeploy,
    Update,
}

impl fmt::Display for PluginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginAction::Initialize => "initialize",
            PluginAction::Deploy => "deploy",
            PluginAction::Start => "start",
            PluginAction::Stop => "stop",
            PluginAction::Undeploy => "undeploy",
            PluginAction::Update => "update",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin {plugin} failed to {action} {instance}: {reason}")]
    Execution {
        plugin: String,
        action: PluginAction,
        instance: InstancePath,
        reason: String,
    },

    #[error("No plugin registered for installer {0}")]
    NotFound(String),
}

impl PluginError {
    pub fn execution(
        plugin: impl Into<String>,
        action: PluginAction,
        instance: &Instance,
        reason: impl Into<String>,
    ) -> Self {
        PluginError::Execution {
            plugin: plugin.into(),
            action,
            instance: instance.path.clone(),
            reason: reason.into(),
        }
    }
}

pub type PluginResult<T> = std::result::Result<T, PluginError>;

// ── Plugin Trait ───────────────────────────────────────────────────────

/// Executes the lifecycle hooks of the instances of one installer.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Installer name this plugin handles
    fn name(&self) -> &str;

    /// Called once before the first deployment of an instance.
    async fn initialize(&self, _instance: &Instance) -> PluginResult<()> {
        Ok(())
    }

    async fn deploy(&self, instance: &Instance, files: &FileContents) -> PluginResult<()>;

    async fn start(&self, instance: &Instance, files: &FileContents) -> PluginResult<()>;

    async fn stop(&self, instance: &Instance, files: &FileContents) -> PluginResult<()>;

    async fn undeploy(&self, instance: &Instance, files: &FileContents) -> PluginResult<()>;

    /// Called when the imports of a started instance changed.
    async fn update(&self, _instance: &Instance, _changed: Option<&Import>) -> PluginResult<()> {
        Ok(())
    }
}

// ── Registry ───────────────────────────────────────────────────────────

/// Plugins indexed by installer name
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in [`LoggerPlugin`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LoggerPlugin));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, installer_name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(installer_name).cloned()
    }

    /// The plugin in charge of `instance`.
    pub fn for_instance(&self, instance: &Instance) -> PluginResult<Arc<dyn Plugin>> {
        self.get(instance.installer_name())
            .ok_or_else(|| PluginError::NotFound(instance.installer_name().to_string()))
    }

    pub fn installer_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// ── Logger Plugin ──────────────────────────────────────────────────────

/// Plugin that does nothing but log
pub struct LoggerPlugin;

#[async_trait]
impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        LOGGER_INSTALLER
    }

    async fn deploy(&self, instance: &Instance, files: &FileContents) -> PluginResult<()> {
        info!(instance = %instance.path, files = files.len(), "Deploying");
        Ok(())
    }

    async fn start(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        info!(instance = %instance.path, "Starting");
        Ok(())
    }

    async fn stop(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        info!(instance = %instance.path, "Stopping");
        Ok(())
    }

    async fn undeploy(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        info!(instance = %instance.path, "Undeploying");
        Ok(())
    }

    async fn update(&self, instance: &Instance, changed: Option<&Import>) -> PluginResult<()> {
        info!(
            instance = %instance.path,
            exporter = ?changed.map(|i| i.instance_path.as_str()),
            "Imports updated"
        );
        Ok(())
    }
}

// ── Simulated Plugin ───────────────────────────────────────────────────

/// A plugin that records every hook it runs.
///
/// Configurable to fail on chosen actions.
pub struct SimulatedPlugin {
    name: String,
    failing: Mutex<HashSet<PluginAction>>,
    calls: Mutex<Vec<(PluginAction, InstancePath)>>,
}

impl SimulatedPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make `action` fail until [`SimulatedPlugin::succeed`] is called.
    pub fn fail_on(&self, action: PluginAction) {
        self.failing.lock().insert(action);
    }

    pub fn succeed(&self, action: PluginAction) {
        self.failing.lock().remove(&action);
    }

    pub fn calls(&self) -> Vec<(PluginAction, InstancePath)> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, action: PluginAction) -> usize {
        self.calls.lock().iter().filter(|(a, _)| *a == action).count()
    }

    fn run(&self, action: PluginAction, instance: &Instance) -> PluginResult<()> {
        self.calls.lock().push((action, instance.path.clone()));
        if self.failing.lock().contains(&action) {
            return Err(PluginError::execution(
                &self.name,
                action,
                instance,
                "simulated failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for SimulatedPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, instance: &Instance) -> PluginResult<()> {
        self.run(PluginAction::Initialize, instance)
    }

    async fn deploy(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        self.run(PluginAction::Deploy, instance)
    }

    async fn start(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        self.run(PluginAction::Start, instance)
    }

    async fn stop(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        self.run(PluginAction::Stop, instance)
    }

    async fn undeploy(&self, instance: &Instance, _files: &FileContents) -> PluginResult<()> {
        self.run(PluginAction::Undeploy, instance)
    }

    async fn update(&self, instance: &Instance, _changed: Option<&Import>) -> PluginResult<()> {
        self.run(PluginAction::Update, instance)
    }
}
