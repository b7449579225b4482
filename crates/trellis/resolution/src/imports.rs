//! Management of the imports held by an instance

use trellis_model::{Import, Instance, InstancePath};

/// Add an import under `prefix`.
///
/// An import from an exporter already known under this prefix replaces the
/// previous snapshot. Returns `true` when the held imports changed.
pub fn add_import(instance: &mut Instance, prefix: &str, import: Import) -> bool {
    let imports = instance.imports.entry(prefix.to_string()).or_default();

    match imports
        .iter_mut()
        .find(|existing| existing.instance_path == import.instance_path)
    {
        Some(existing) if *existing == import => false,
        Some(existing) => {
            *existing = import;
            true
        }
        None => {
            tracing::debug!(
                instance = %instance.path,
                prefix = prefix,
                exporter = %import.instance_path,
                "Import added"
            );
            imports.push(import);
            true
        }
    }
}

/// Remove the import published by `exporter` under `prefix`.
///
/// Returns the removed import, if any.
pub fn remove_import(
    instance: &mut Instance,
    prefix: &str,
    exporter: &InstancePath,
) -> Option<Import> {
    let imports = instance.imports.get_mut(prefix)?;
    let idx = imports.iter().position(|i| &i.instance_path == exporter)?;
    let removed = imports.remove(idx);
    if imports.is_empty() {
        instance.imports.remove(prefix);
    }

    tracing::debug!(
        instance = %instance.path,
        prefix = prefix,
        exporter = %exporter,
        "Import removed"
    );
    Some(removed)
}

/// Remove every import published by `exporter`, whatever the prefix.
pub fn remove_imports_from(instance: &mut Instance, exporter: &InstancePath) -> Vec<Import> {
    let prefixes: Vec<String> = instance.imports.keys().cloned().collect();
    prefixes
        .iter()
        .filter_map(|prefix| remove_import(instance, prefix, exporter))
        .collect()
}

/// Imports held under `prefix`.
pub fn imports_for<'a>(instance: &'a Instance, prefix: &str) -> &'a [Import] {
    instance
        .imports
        .get(prefix)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_model::{Component, VariableValues};

    fn instance() -> Instance {
        Instance::new("app", Arc::new(Component::builder("app").build()))
    }

    fn import(path: &str, ip: &str) -> Import {
        let mut vars = VariableValues::new();
        vars.insert("database.ip".into(), ip.into());
        Import::new(InstancePath::parse(path).unwrap(), vars)
    }

    #[test]
    fn test_fan_in() {
        let mut app = instance();
        assert!(add_import(&mut app, "database", import("/db1", "10.0.0.1")));
        assert!(add_import(&mut app, "database", import("/db2", "10.0.0.2")));
        assert_eq!(imports_for(&app, "database").len(), 2);
    }

    #[test]
    fn test_same_exporter_replaces() {
        let mut app = instance();
        add_import(&mut app, "database", import("/db1", "10.0.0.1"));
        assert!(!add_import(&mut app, "database", import("/db1", "10.0.0.1")));
        assert!(add_import(&mut app, "database", import("/db1", "10.0.0.7")));

        let held = imports_for(&app, "database");
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].value("database.ip"), Some("10.0.0.7"));
    }

    #[test]
    fn test_remove() {
        let mut app = instance();
        add_import(&mut app, "database", import("/db1", "10.0.0.1"));
        add_import(&mut app, "cache", import("/db1", "10.0.0.1"));

        let db1 = InstancePath::parse("/db1").unwrap();
        assert!(remove_import(&mut app, "database", &db1).is_some());
        assert!(remove_import(&mut app, "database", &db1).is_none());
        assert!(!app.imports.contains_key("database"));

        assert_eq!(remove_imports_from(&mut app, &db1).len(), 1);
        assert!(app.imports.is_empty());
    }
}
