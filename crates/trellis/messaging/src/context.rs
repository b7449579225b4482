//! Addressing of messages
//!
//! A [`MessagingContext`] names a topic: the DM of an application, a single
//! agent, or the agents that export or import a given prefix. Contexts are
//! compared without their domain so subscription bookkeeping is not affected
//! by which helper built them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use trellis_model::Instance;
use trellis_resolution::{
    find_prefixes_for_exported_variables, find_prefixes_for_external_imports,
    find_prefixes_for_imported_variables, variable_prefix,
};

/// Family of the topics exported variables are published to
pub const THOSE_THAT_EXPORT: &str = "those.that.export.";

/// Family of the topics imported variables are listened to on
pub const THOSE_THAT_IMPORT: &str = "those.that.import.";

/// Prefix of the topics addressing a single agent
pub const MACHINE_PREFIX: &str = "machine.";

/// Who a message is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientKind {
    /// The deployment manager
    Dm,
    /// Agents of the same application
    Agents,
    /// Agents of other applications
    InterApp,
}

impl fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecipientKind::Dm => "dm",
            RecipientKind::Agents => "agents",
            RecipientKind::InterApp => "inter-app",
        };
        write!(f, "{}", name)
    }
}

/// Which side of an export/import exchange a topic reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThoseThat {
    Export,
    Import,
}

impl ThoseThat {
    pub fn topic_prefix(self) -> &'static str {
        match self {
            ThoseThat::Export => THOSE_THAT_EXPORT,
            ThoseThat::Import => THOSE_THAT_IMPORT,
        }
    }
}

/// A topic address.
///
/// Equality and hashing ignore the domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingContext {
    kind: RecipientKind,
    domain: String,
    application_name: Option<String>,
    component_or_facet_name: Option<String>,
    those_that: Option<ThoseThat>,
}

impl MessagingContext {
    pub fn new(
        kind: RecipientKind,
        domain: impl Into<String>,
        component_or_facet_name: Option<String>,
        those_that: Option<ThoseThat>,
        application_name: Option<String>,
    ) -> Self {
        Self {
            kind,
            domain: domain.into(),
            application_name,
            component_or_facet_name,
            those_that,
        }
    }

    /// The DM's topic for an application.
    pub fn for_dm(domain: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self::new(
            RecipientKind::Dm,
            domain,
            None,
            None,
            Some(application_name.into()),
        )
    }

    /// The topic of a single agent, addressed by its scoped instance path.
    pub fn for_agent(
        domain: impl Into<String>,
        application_name: impl Into<String>,
        scoped_instance_path: impl Into<String>,
    ) -> Self {
        Self::new(
            RecipientKind::Agents,
            domain,
            Some(scoped_instance_path.into()),
            None,
            Some(application_name.into()),
        )
    }

    /// The topic of the agents of an application that export or import
    /// `prefix`.
    pub fn for_agents(
        domain: impl Into<String>,
        application_name: impl Into<String>,
        prefix: impl Into<String>,
        those_that: ThoseThat,
    ) -> Self {
        Self::new(
            RecipientKind::Agents,
            domain,
            Some(prefix.into()),
            Some(those_that),
            Some(application_name.into()),
        )
    }

    /// A topic shared by every application of the domain.
    pub fn for_inter_app(
        domain: impl Into<String>,
        prefix: impl Into<String>,
        those_that: ThoseThat,
    ) -> Self {
        Self::new(
            RecipientKind::InterApp,
            domain,
            Some(prefix.into()),
            Some(those_that),
            None,
        )
    }

    pub fn kind(&self) -> RecipientKind {
        self.kind
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    pub fn component_or_facet_name(&self) -> Option<&str> {
        self.component_or_facet_name.as_deref()
    }

    pub fn those_that(&self) -> Option<ThoseThat> {
        self.those_that
    }

    /// Name of the topic this context addresses.
    pub fn topic_name(&self) -> String {
        let name = self.component_or_facet_name.as_deref().unwrap_or_default();
        match (self.kind, self.those_that) {
            (RecipientKind::Dm, _) => self.application_name.clone().unwrap_or_default(),
            (_, Some(those_that)) => format!("{}{}", those_that.topic_prefix(), name),
            (_, None) => format!("{}{}", MACHINE_PREFIX, name),
        }
    }
}

impl PartialEq for MessagingContext {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.application_name == other.application_name
            && self.component_or_facet_name == other.component_or_facet_name
            && self.those_that == other.those_that
    }
}

impl Eq for MessagingContext {}

impl Hash for MessagingContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.application_name.hash(state);
        self.component_or_facet_name.hash(state);
        self.those_that.hash(state);
    }
}

impl fmt::Display for MessagingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.application_name {
            Some(app) => write!(f, "{}[{}] {}", self.kind, app, self.topic_name()),
            None => write!(f, "{} {}", self.kind, self.topic_name()),
        }
    }
}

/// Contexts an instance publishes its exports to (or listens for requests
/// on, with [`ThoseThat::Export`]).
///
/// Every exported prefix gets an application-local context. Exported
/// variables bound to an external name in `external_exports` are also
/// offered to other applications under the prefix of that name.
pub fn for_exported_variables(
    domain: &str,
    application_name: &str,
    instance: &Instance,
    external_exports: &BTreeMap<String, String>,
    those_that: ThoseThat,
) -> HashSet<MessagingContext> {
    let mut result: HashSet<MessagingContext> = find_prefixes_for_exported_variables(instance)
        .into_iter()
        .map(|prefix| MessagingContext::for_agents(domain, application_name, prefix, those_that))
        .collect();

    let exported = instance.component.all_exported_variables();
    for (internal, external) in external_exports {
        if exported.contains_key(internal) {
            result.insert(MessagingContext::for_inter_app(
                domain,
                variable_prefix(external),
                those_that,
            ));
        }
    }
    result
}

/// Contexts an instance listens on for its imports (or sends requests to,
/// with [`ThoseThat::Export`]).
///
/// External imports are resolved from other applications only.
pub fn for_imported_variables(
    domain: &str,
    application_name: &str,
    instance: &Instance,
    those_that: ThoseThat,
) -> HashSet<MessagingContext> {
    let external = find_prefixes_for_external_imports(instance);
    find_prefixes_for_imported_variables(instance)
        .into_iter()
        .map(|prefix| {
            if external.contains(&prefix) {
                MessagingContext::for_inter_app(domain, prefix, those_that)
            } else {
                MessagingContext::for_agents(domain, application_name, prefix, those_that)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::sync::Arc;
    use trellis_model::{Component, ImportedVariable};

    fn hash_of(ctx: &MessagingContext) -> u64 {
        let mut hasher = DefaultHasher::new();
        ctx.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_topic_names() {
        let ctx = MessagingContext::for_agents("d", "app", "database", ThoseThat::Export);
        assert_eq!(ctx.topic_name(), "those.that.export.database");

        let ctx = MessagingContext::for_agents("d", "app", "database", ThoseThat::Import);
        assert_eq!(ctx.topic_name(), "those.that.import.database");

        let ctx = MessagingContext::for_agent("d", "app", "/vm1");
        assert_eq!(ctx.topic_name(), "machine./vm1");

        let ctx = MessagingContext::for_dm("d", "app");
        assert_eq!(ctx.topic_name(), "app");
        assert_eq!(ctx.kind(), RecipientKind::Dm);
    }

    #[test]
    fn test_equality_ignores_domain_and_constructor() {
        let a = MessagingContext::for_agents("d1", "app", "database", ThoseThat::Import);
        let b = MessagingContext::new(
            RecipientKind::Agents,
            "d2",
            Some("database".into()),
            Some(ThoseThat::Import),
            Some("app".into()),
        );
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = MessagingContext::for_agents("d1", "other", "database", ThoseThat::Import);
        assert_ne!(a, c);
    }

    #[test]
    fn test_inter_app_has_no_application() {
        let ctx = MessagingContext::for_inter_app("d", "billing", ThoseThat::Import);
        assert!(ctx.application_name().is_none());
        assert_eq!(ctx.topic_name(), "those.that.import.billing");
        assert_eq!(ctx.to_string(), "inter-app those.that.import.billing");
    }

    #[test]
    fn test_contexts_for_variables() {
        let component = Component::builder("app-server")
            .export("app-server.url", None)
            .import("database.ip", ImportedVariable::required())
            .import("billing.url", ImportedVariable::external(false))
            .build();
        let instance = Instance::new("server", Arc::new(component));

        let mut external = BTreeMap::new();
        external.insert("app-server.url".to_string(), "shop.url".to_string());
        external.insert("app-server.unknown".to_string(), "shop.other".to_string());

        let exports = for_exported_variables("d", "app", &instance, &external, ThoseThat::Import);
        assert_eq!(exports.len(), 2);
        assert!(exports.contains(&MessagingContext::for_agents(
            "d",
            "app",
            "app-server",
            ThoseThat::Import
        )));
        assert!(exports.contains(&MessagingContext::for_inter_app(
            "d",
            "shop",
            ThoseThat::Import
        )));

        let imports = for_imported_variables("d", "app", &instance, ThoseThat::Import);
        assert_eq!(imports.len(), 2);
        assert!(imports.contains(&MessagingContext::for_agents(
            "d",
            "app",
            "database",
            ThoseThat::Import
        )));
        assert!(imports.contains(&MessagingContext::for_inter_app(
            "d",
            "billing",
            ThoseThat::Import
        )));
        assert!(!imports.contains(&MessagingContext::for_agents(
            "d",
            "app",
            "billing",
            ThoseThat::Import
        )));
    }
}
