//! Variable names and the prefixes derived from them
//!
//! One topic exists per prefix (component or facet name), not per variable.

use std::collections::BTreeSet;
use trellis_model::{Import, ImportedVariables, Instance, InstancePath, VariableValues, WILDCARD};

/// Split a fully-qualified variable name on its first `.`.
///
/// A name without a dot has an empty prefix.
pub fn parse_variable_name(full_name: &str) -> (&str, &str) {
    match full_name.split_once('.') {
        Some((prefix, simple_name)) => (prefix, simple_name),
        None => ("", full_name),
    }
}

/// The prefix of a fully-qualified variable name.
pub fn variable_prefix(full_name: &str) -> &str {
    parse_variable_name(full_name).0
}

/// Prefixes of every variable the instance exports.
pub fn find_prefixes_for_exported_variables(instance: &Instance) -> BTreeSet<String> {
    instance
        .component
        .all_exported_variables()
        .keys()
        .chain(instance.overridden_exports.keys())
        .map(|name| variable_prefix(name).to_string())
        .collect()
}

/// Prefixes of every variable the instance imports.
pub fn find_prefixes_for_imported_variables(instance: &Instance) -> BTreeSet<String> {
    prefixes_where(&instance.component.all_imported_variables(), |_| true)
}

/// Prefixes with at least one required (non-optional) import.
pub fn find_prefixes_for_mandatory_imports(instance: &Instance) -> BTreeSet<String> {
    prefixes_where(&instance.component.all_imported_variables(), |flags| {
        !flags.optional
    })
}

/// Prefixes of the imports resolved from other applications.
pub fn find_prefixes_for_external_imports(instance: &Instance) -> BTreeSet<String> {
    prefixes_where(&instance.component.all_imported_variables(), |flags| {
        flags.external
    })
}

fn prefixes_where(
    imported: &ImportedVariables,
    keep: impl Fn(&trellis_model::ImportedVariable) -> bool,
) -> BTreeSet<String> {
    imported
        .iter()
        .filter(|(_, flags)| keep(flags))
        .map(|(name, _)| variable_prefix(name).to_string())
        .collect()
}

/// Whether every required import prefix holds at least one import.
///
/// Optional imports never block resolution.
pub fn has_all_required_imports(instance: &Instance) -> bool {
    let missing: Vec<String> = find_prefixes_for_mandatory_imports(instance)
        .into_iter()
        .filter(|prefix| {
            instance
                .imports
                .get(prefix)
                .map_or(true, |imports| imports.is_empty())
        })
        .collect();

    if !missing.is_empty() {
        tracing::debug!(
            instance = %instance.path,
            missing = ?missing,
            "Required imports are missing"
        );
    }
    missing.is_empty()
}

/// Whether the instance's component imports `variable_name`, directly or
/// through a `prefix.*` wildcard.
pub fn imports_variable(imported: &ImportedVariables, variable_name: &str) -> bool {
    if imported.contains_key(variable_name) {
        return true;
    }
    let prefix = variable_prefix(variable_name);
    imported.contains_key(&format!("{}.{}", prefix, WILDCARD))
}

/// Keep only the variables the importing instance declares as imports.
///
/// Unrelated exported variables never leak into a consumer.
pub fn build_tailored_import(
    instance: &Instance,
    source_path: &InstancePath,
    source_component: Option<&str>,
    raw_variables: &VariableValues,
) -> Import {
    let imported = instance.component.all_imported_variables();
    let exported_vars: VariableValues = raw_variables
        .iter()
        .filter(|(name, _)| imports_variable(&imported, name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let import = Import::new(source_path.clone(), exported_vars);
    match source_component {
        Some(component) => import.with_component(component),
        None => import,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use trellis_model::{Component, Facet, ImportedVariable};

    fn app_server() -> Instance {
        let facet = Arc::new(Facet::new("web").export("web.url", None));
        let component = Component::builder("app-server")
            .facet(facet)
            .export("app-server.port", Some("8080"))
            .import("database.ip", ImportedVariable::required())
            .import("database.port", ImportedVariable::required())
            .import("cache.*", ImportedVariable::optional())
            .import("billing.url", ImportedVariable::external(false))
            .build();
        Instance::new("appServer", Arc::new(component))
    }

    #[test]
    fn test_parse_variable_name() {
        assert_eq!(parse_variable_name("database.ip"), ("database", "ip"));
        assert_eq!(parse_variable_name("a.b.c"), ("a", "b.c"));
        assert_eq!(parse_variable_name("port"), ("", "port"));
    }

    proptest! {
        #[test]
        fn parse_then_join_is_identity(prefix in "[a-zA-Z0-9-]{1,12}", simple in "[a-zA-Z0-9.]{1,12}") {
            let full = format!("{}.{}", prefix, simple);
            let (p, s) = parse_variable_name(&full);
            prop_assert_eq!(p, prefix.as_str());
            prop_assert_eq!(s, simple.as_str());
        }
    }

    #[test]
    fn test_prefixes() {
        let instance = app_server();
        let exported: Vec<_> = find_prefixes_for_exported_variables(&instance)
            .into_iter()
            .collect();
        assert_eq!(exported, vec!["app-server", "web"]);

        let imported: Vec<_> = find_prefixes_for_imported_variables(&instance)
            .into_iter()
            .collect();
        assert_eq!(imported, vec!["billing", "cache", "database"]);

        let mandatory: Vec<_> = find_prefixes_for_mandatory_imports(&instance)
            .into_iter()
            .collect();
        assert_eq!(mandatory, vec!["billing", "database"]);

        let external: Vec<_> = find_prefixes_for_external_imports(&instance)
            .into_iter()
            .collect();
        assert_eq!(external, vec!["billing"]);
    }

    #[test]
    fn test_required_imports() {
        let mut instance = app_server();
        assert!(!has_all_required_imports(&instance));

        let db = InstancePath::root("db").unwrap();
        instance
            .imports
            .insert("database".into(), vec![Import::new(db.clone(), Default::default())]);
        assert!(!has_all_required_imports(&instance));

        // An empty set does not count
        instance.imports.insert("billing".into(), vec![]);
        assert!(!has_all_required_imports(&instance));

        instance
            .imports
            .insert("billing".into(), vec![Import::new(db, Default::default())]);
        assert!(has_all_required_imports(&instance));
    }

    #[test]
    fn test_optional_only_component_is_resolved() {
        let component = Component::builder("probe")
            .import("metrics.url", ImportedVariable::optional())
            .build();
        let instance = Instance::new("probe", Arc::new(component));
        assert!(has_all_required_imports(&instance));
    }

    #[test]
    fn test_tailored_import() {
        let instance = app_server();
        let source = InstancePath::root("db").unwrap();
        let raw: VariableValues = [
            ("database.ip", "10.0.0.2"),
            ("database.port", "3306"),
            ("database.password", "secret"),
            ("cache.host", "10.0.0.9"),
            ("cache.ttl", "60"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let import = build_tailored_import(&instance, &source, Some("mysql"), &raw);
        assert_eq!(import.exported_vars.len(), 4);
        assert!(import.value("database.password").is_none());
        assert_eq!(import.value("cache.ttl"), Some("60"));
        assert_eq!(import.component_name.as_deref(), Some("mysql"));
    }
}
