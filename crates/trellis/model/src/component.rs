//! Component types, facets and the component type graph
//!
//! Variable names are always fully qualified: `<component or facet>.<name>`.
//! A component inherits the declarations of its facets, and a facet those of
//! the facets it extends. The component's own declarations win on conflicts.

use crate::error::{ModelError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Exported variable declarations: fully-qualified name to default value
pub type ExportedVariables = BTreeMap<String, Option<String>>;

/// Imported variable declarations: fully-qualified name to flags
pub type ImportedVariables = BTreeMap<String, ImportedVariable>;

/// Suffix used to import every variable exported under a prefix
pub const WILDCARD: &str = "*";

/// Flags of an imported variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportedVariable {
    /// Optional imports never block resolution
    pub optional: bool,
    /// Resolved from another application
    pub external: bool,
}

impl ImportedVariable {
    pub fn required() -> Self {
        Self::default()
    }

    pub fn optional() -> Self {
        Self {
            optional: true,
            external: false,
        }
    }

    pub fn external(optional: bool) -> Self {
        Self {
            optional,
            external: true,
        }
    }
}

/// A named bundle of variable declarations
#[derive(Debug, Clone)]
pub struct Facet {
    pub name: String,
    pub exported_variables: ExportedVariables,
    pub imported_variables: ImportedVariables,
    pub extends: Vec<Arc<Facet>>,
}

impl Facet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exported_variables: ExportedVariables::new(),
            imported_variables: ImportedVariables::new(),
            extends: Vec::new(),
        }
    }

    pub fn export(mut self, name: impl Into<String>, default: Option<&str>) -> Self {
        self.exported_variables
            .insert(name.into(), default.map(str::to_string));
        self
    }

    pub fn import(mut self, name: impl Into<String>, flags: ImportedVariable) -> Self {
        self.imported_variables.insert(name.into(), flags);
        self
    }

    pub fn extend(mut self, facet: Arc<Facet>) -> Self {
        self.extends.push(facet);
        self
    }

    fn collect_exports(&self, into: &mut ExportedVariables) {
        // Extended facets first so this facet overrides them
        for parent in &self.extends {
            parent.collect_exports(into);
        }
        for (name, value) in &self.exported_variables {
            into.insert(name.clone(), value.clone());
        }
    }

    fn collect_imports(&self, into: &mut ImportedVariables) {
        for parent in &self.extends {
            parent.collect_imports(into);
        }
        for (name, flags) in &self.imported_variables {
            into.insert(name.clone(), *flags);
        }
    }

    fn collect_names(&self, into: &mut BTreeSet<String>) {
        if into.insert(self.name.clone()) {
            for parent in &self.extends {
                parent.collect_names(into);
            }
        }
    }
}

/// A type descriptor for a class of instances
#[derive(Debug, Clone)]
pub struct Component {
    pub name: String,
    /// Plugin family handling instances of this component
    pub installer_name: String,
    pub facets: Vec<Arc<Facet>>,
    pub exported_variables: ExportedVariables,
    pub imported_variables: ImportedVariables,
    /// Names of the component types that may be nested under this one
    pub children: BTreeSet<String>,
}

impl Component {
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder::new(name)
    }

    /// Names of the facets this component is associated with, extended ones included.
    pub fn facet_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for facet in &self.facets {
            facet.collect_names(&mut names);
        }
        names
    }

    /// Exported variables, inherited facet declarations included.
    pub fn all_exported_variables(&self) -> ExportedVariables {
        let mut result = ExportedVariables::new();
        for facet in &self.facets {
            facet.collect_exports(&mut result);
        }
        for (name, value) in &self.exported_variables {
            result.insert(name.clone(), value.clone());
        }
        result
    }

    /// Imported variables, inherited facet declarations included.
    pub fn all_imported_variables(&self) -> ImportedVariables {
        let mut result = ImportedVariables::new();
        for facet in &self.facets {
            facet.collect_imports(&mut result);
        }
        for (name, flags) in &self.imported_variables {
            result.insert(name.clone(), *flags);
        }
        result
    }

    pub fn accepts_child(&self, component_name: &str) -> bool {
        self.children.contains(component_name)
    }
}

/// Builder for [`Component`]
#[derive(Debug)]
pub struct ComponentBuilder {
    component: Component,
}

impl ComponentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            component: Component {
                name: name.into(),
                installer_name: "logger".to_string(),
                facets: Vec::new(),
                exported_variables: ExportedVariables::new(),
                imported_variables: ImportedVariables::new(),
                children: BTreeSet::new(),
            },
        }
    }

    pub fn installer(mut self, installer_name: impl Into<String>) -> Self {
        self.component.installer_name = installer_name.into();
        self
    }

    pub fn facet(mut self, facet: Arc<Facet>) -> Self {
        self.component.facets.push(facet);
        self
    }

    pub fn export(mut self, name: impl Into<String>, default: Option<&str>) -> Self {
        self.component
            .exported_variables
            .insert(name.into(), default.map(str::to_string));
        self
    }

    pub fn import(mut self, name: impl Into<String>, flags: ImportedVariable) -> Self {
        self.component.imported_variables.insert(name.into(), flags);
        self
    }

    pub fn child(mut self, component_name: impl Into<String>) -> Self {
        self.component.children.insert(component_name.into());
        self
    }

    pub fn build(self) -> Component {
        self.component
    }
}

/// The set of component types of an application
#[derive(Debug, Clone, Default)]
pub struct ComponentGraph {
    components: HashMap<String, Arc<Component>>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph and validate it.
    pub fn from_components(components: impl IntoIterator<Item = Component>) -> Result<Self> {
        let mut graph = Self::new();
        for component in components {
            graph.insert(component)?;
        }
        graph.validate()?;
        Ok(graph)
    }

    pub fn insert(&mut self, component: Component) -> Result<Arc<Component>> {
        if self.components.contains_key(&component.name) {
            return Err(ModelError::DuplicateComponent(component.name));
        }
        let component = Arc::new(component);
        self.components
            .insert(component.name.clone(), component.clone());
        Ok(component)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Component>> {
        self.components.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components that are nobody's child.
    pub fn roots(&self) -> Vec<Arc<Component>> {
        let nested: HashSet<&str> = self
            .components
            .values()
            .flat_map(|c| c.children.iter().map(String::as_str))
            .collect();

        let mut roots: Vec<_> = self
            .components
            .values()
            .filter(|c| !nested.contains(c.name.as_str()))
            .cloned()
            .collect();
        roots.sort_by(|a, b| a.name.cmp(&b.name));
        roots
    }

    /// Check that every declared child exists and that the graph has no cycle.
    pub fn validate(&self) -> Result<()> {
        for component in self.components.values() {
            for child in &component.children {
                if !self.components.contains_key(child) {
                    return Err(ModelError::UnknownComponent(child.clone()));
                }
            }
        }

        let mut done = HashSet::new();
        let mut names: Vec<&String> = self.components.keys().collect();
        names.sort();
        for name in names {
            let mut stack = Vec::new();
            self.visit(name, &mut stack, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(name.to_string());
            return Err(ModelError::Cycle(cycle.join(" -> ")));
        }

        stack.push(name);
        if let Some(component) = self.components.get(name) {
            for child in &component.children {
                self.visit(child, stack, done)?;
            }
        }
        stack.pop();
        done.insert(name);
        Ok(())
    }
}
