//! Instances and the instance tree
//!
//! Instances live in an arena keyed by path. Parent/child links are paths,
//! which keeps the tree mutable from a single owner (the agent's message
//! loop) without shared references.

use crate::component::Component;
use crate::error::{ModelError, Result};
use crate::import::Import;
use crate::path::InstancePath;
use crate::status::InstanceStatus;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Data key holding the IP address of a root instance
pub const DATA_IP_ADDRESS: &str = "ip.address";

/// Imports held by an instance, grouped by declaring prefix
pub type ImportMap = BTreeMap<String, Vec<Import>>;

/// Files shipped with a transition request: relative path to content
pub type FileContents = BTreeMap<String, Vec<u8>>;

/// A runtime node of a component
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub component: Arc<Component>,
    pub status: InstanceStatus,
    pub path: InstancePath,
    pub parent: Option<InstancePath>,
    pub children: Vec<InstancePath>,
    /// Instance-specific values for exported variables
    pub overridden_exports: BTreeMap<String, String>,
    pub imports: ImportMap,
    /// Opaque bootstrap metadata
    pub data: BTreeMap<String, String>,
}

impl Instance {
    /// Create a detached instance. Its path is fixed when it joins a tree.
    pub fn new(name: impl Into<String>, component: Arc<Component>) -> Self {
        let name = name.into();
        Self {
            // Validated when the instance joins a tree
            path: InstancePath::detached(&name),
            name,
            component,
            status: InstanceStatus::NotDeployed,
            parent: None,
            children: Vec::new(),
            overridden_exports: BTreeMap::new(),
            imports: ImportMap::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overridden_exports.insert(name.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn component_name(&self) -> &str {
        &self.component.name
    }

    pub fn installer_name(&self) -> &str {
        &self.component.installer_name
    }

    pub fn import_count(&self) -> usize {
        self.imports.values().map(Vec::len).sum()
    }
}

/// The instances of an application (or of one agent's scope)
#[derive(Debug, Clone, Default)]
pub struct InstanceTree {
    nodes: HashMap<InstancePath, Instance>,
    roots: Vec<InstancePath>,
}

impl InstanceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root instance.
    pub fn insert_root(&mut self, mut instance: Instance) -> Result<InstancePath> {
        let path = InstancePath::root(&instance.name)?;
        if self.nodes.contains_key(&path) {
            return Err(ModelError::DuplicatePath(path.to_string()));
        }

        instance.path = path.clone();
        instance.parent = None;
        instance.children.clear();
        self.nodes.insert(path.clone(), instance);
        self.roots.push(path.clone());
        Ok(path)
    }

    /// Add an instance under `parent`.
    pub fn insert_child(
        &mut self,
        parent: &InstancePath,
        mut instance: Instance,
    ) -> Result<InstancePath> {
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or_else(|| ModelError::InstanceNotFound(parent.to_string()))?;

        if !parent_node.component.accepts_child(instance.component_name()) {
            return Err(ModelError::InvalidChild {
                parent: parent_node.component.name.clone(),
                child: instance.component.name.clone(),
            });
        }

        let path = parent.child(&instance.name)?;
        if self.nodes.contains_key(&path) {
            return Err(ModelError::DuplicatePath(path.to_string()));
        }

        instance.path = path.clone();
        instance.parent = Some(parent.clone());
        instance.children.clear();
        self.nodes.insert(path.clone(), instance);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(path.clone());
        }
        Ok(path)
    }

    /// Copy the subtree rooted at `root` into a new tree.
    pub fn subtree(&self, root: &InstancePath) -> Result<InstanceTree> {
        if !self.nodes.contains_key(root) {
            return Err(ModelError::InstanceNotFound(root.to_string()));
        }

        let mut result = InstanceTree::new();
        for path in self.descendants(root) {
            if let Some(node) = self.nodes.get(&path) {
                result.nodes.insert(path.clone(), node.clone());
            }
        }
        result.roots.push(root.clone());
        Ok(result)
    }

    /// Remove an instance and all its descendants. Returns the removed paths.
    pub fn remove(&mut self, path: &InstancePath) -> Vec<InstancePath> {
        if !self.nodes.contains_key(path) {
            return Vec::new();
        }

        let removed = self.descendants(path);
        for p in &removed {
            self.nodes.remove(p);
        }

        match path.parent() {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|c| c != path);
                }
            }
            None => self.roots.retain(|r| r != path),
        }
        removed
    }

    pub fn get(&self, path: &InstancePath) -> Option<&Instance> {
        self.nodes.get(path)
    }

    pub fn get_mut(&mut self, path: &InstancePath) -> Option<&mut Instance> {
        self.nodes.get_mut(path)
    }

    pub fn contains(&self, path: &InstancePath) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn status(&self, path: &InstancePath) -> Option<InstanceStatus> {
        self.nodes.get(path).map(|i| i.status)
    }

    pub fn roots(&self) -> &[InstancePath] {
        &self.roots
    }

    pub fn parent_of(&self, path: &InstancePath) -> Option<&Instance> {
        self.nodes
            .get(path)
            .and_then(|i| i.parent.as_ref())
            .and_then(|p| self.nodes.get(p))
    }

    /// The root ancestor of an instance.
    pub fn root_of(&self, path: &InstancePath) -> Option<&Instance> {
        self.nodes.get(&path.root_path())
    }

    pub fn children(&self, path: &InstancePath) -> Vec<&Instance> {
        self.nodes
            .get(path)
            .map(|i| {
                i.children
                    .iter()
                    .filter_map(|c| self.nodes.get(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `path` and every descendant, depth-first, parents before children.
    pub fn descendants(&self, path: &InstancePath) -> Vec<InstancePath> {
        let mut result = Vec::new();
        let mut stack = vec![path.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for child in node.children.iter().rev() {
                    stack.push(child.clone());
                }
                result.push(current);
            }
        }
        result
    }

    /// Every path of the tree, roots first, depth-first.
    pub fn all_paths(&self) -> Vec<InstancePath> {
        self.roots
            .iter()
            .flat_map(|root| self.descendants(root))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.nodes.values()
    }
}
