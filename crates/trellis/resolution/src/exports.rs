//! Values published by an instance

use crate::variables::parse_variable_name;
use trellis_model::{Instance, InstancePath, InstanceTree, VariableValues, DATA_IP_ADDRESS};

/// Simple name of the variables filled with the host's IP address
pub const IP_VARIABLE: &str = "ip";

/// Resolved exported variables of an instance.
///
/// Component and facet defaults, then instance overrides. Variables named
/// `ip` without a value take `ip_address`. Variables that still have no value
/// are left out.
pub fn find_all_exported_variables(
    instance: &Instance,
    ip_address: Option<&str>,
) -> VariableValues {
    let mut result = VariableValues::new();
    for (name, default) in instance.component.all_exported_variables() {
        let value = instance
            .overridden_exports
            .get(&name)
            .cloned()
            .or(default)
            .filter(|v| !v.is_empty());

        let value = match value {
            Some(v) => Some(v),
            None if parse_variable_name(&name).1 == IP_VARIABLE => {
                ip_address.map(str::to_string)
            }
            None => None,
        };

        if let Some(v) = value {
            result.insert(name, v);
        }
    }
    result
}

/// Resolved exported variables of the instance at `path`, with the IP address
/// of the nearest instance of its ancestry that carries one.
///
/// Agents may hold a subtree rooted below the top level, so the lookup walks
/// up the paths present in `tree` rather than jumping to the top-level root.
pub fn exported_values(tree: &InstanceTree, path: &InstancePath) -> VariableValues {
    let Some(instance) = tree.get(path) else {
        return VariableValues::new();
    };
    let ip = std::iter::successors(Some(path.clone()), InstancePath::parent)
        .find_map(|p| tree.get(&p).and_then(|i| i.data.get(DATA_IP_ADDRESS)))
        .map(String::as_str);
    find_all_exported_variables(instance, ip)
}

/// The subset of `values` published under `prefix`.
pub fn exports_for_prefix(values: &VariableValues, prefix: &str) -> VariableValues {
    values
        .iter()
        .filter(|(name, _)| parse_variable_name(name).0 == prefix)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
