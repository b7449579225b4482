//! Instance-level overrides of exported variables
//!
//! Users may override an exported variable without its prefix. The bare name
//! is bound only when exactly one exported variable carries that simple name.

use crate::variables::parse_variable_name;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, warn};
use trellis_model::{Component, Instance};

/// Problem found while resolving an override
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideIssue {
    /// No exported variable matches the override
    NotOverriding { name: String },

    /// Several exported variables share the override's simple name
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
}

impl OverrideIssue {
    pub fn is_error(&self) -> bool {
        matches!(self, OverrideIssue::Ambiguous { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            OverrideIssue::NotOverriding { name } | OverrideIssue::Ambiguous { name, .. } => name,
        }
    }
}

impl fmt::Display for OverrideIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideIssue::NotOverriding { name } => {
                write!(f, "{} is not overriding any exported variable", name)
            }
            OverrideIssue::Ambiguous { name, candidates } => write!(
                f,
                "ambiguous override {}: matches {}",
                name,
                candidates.join(", ")
            ),
        }
    }
}

/// Overrides bound to fully-qualified names, plus what could not be bound
#[derive(Debug, Clone, Default)]
pub struct OverrideResolution {
    pub resolved: BTreeMap<String, String>,
    pub issues: Vec<OverrideIssue>,
}

impl OverrideResolution {
    pub fn errors(&self) -> impl Iterator<Item = &OverrideIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &OverrideIssue> {
        self.issues.iter().filter(|i| !i.is_error())
    }
}

/// Bind raw overrides to the component's exported variables.
pub fn resolve_overridden_exports(
    component: &Component,
    raw: &BTreeMap<String, String>,
) -> OverrideResolution {
    let exported = component.all_exported_variables();
    let mut resolution = OverrideResolution::default();

    for (name, value) in raw {
        if exported.contains_key(name) {
            resolution.resolved.insert(name.clone(), value.clone());
            continue;
        }

        let candidates: Vec<String> = exported
            .keys()
            .filter(|full| parse_variable_name(full).1 == name.as_str())
            .cloned()
            .collect();

        match candidates.as_slice() {
            [] => resolution
                .issues
                .push(OverrideIssue::NotOverriding { name: name.clone() }),
            [single] => {
                resolution.resolved.insert(single.clone(), value.clone());
            }
            _ => resolution.issues.push(OverrideIssue::Ambiguous {
                name: name.clone(),
                candidates,
            }),
        }
    }
    resolution
}

/// Resolve `raw` against the instance's component and store what binds.
///
/// Issues are logged and returned; unresolved overrides are not applied.
pub fn apply_overridden_exports(
    instance: &mut Instance,
    raw: &BTreeMap<String, String>,
) -> Vec<OverrideIssue> {
    let resolution = resolve_overridden_exports(&instance.component, raw);
    instance.overridden_exports.extend(resolution.resolved);

    for issue in &resolution.issues {
        if issue.is_error() {
            error!(instance = %instance.path, "{}", issue);
        } else {
            warn!(instance = %instance.path, "{}", issue);
        }
    }
    resolution.issues
}
