//! Instance paths
//!
//! A path joins the names of an instance and its ancestors: `/vm/server/app`.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = '/';

/// Identity of an instance within an application
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstancePath(String);

impl InstancePath {
    /// Path of a root instance.
    pub fn root(name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self(format!("{}{}", SEPARATOR, name)))
    }

    pub(crate) fn detached(name: &str) -> Self {
        Self(format!("{}{}", SEPARATOR, name))
    }

    /// Parse a full path such as `/vm/server`.
    pub fn parse(path: &str) -> Result<Self> {
        let rest = path
            .strip_prefix(SEPARATOR)
            .ok_or_else(|| ModelError::InvalidName(path.to_string()))?;
        for segment in rest.split(SEPARATOR) {
            validate_name(segment)?;
        }
        Ok(Self(path.to_string()))
    }

    /// Path of a child of this instance.
    pub fn child(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self(format!("{}{}{}", self.0, SEPARATOR, name)))
    }

    pub fn name(&self) -> &str {
        self.0
            .rsplit(SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }

    pub fn parent(&self) -> Option<InstancePath> {
        let idx = self.0.rfind(SEPARATOR)?;
        if idx == 0 {
            None
        } else {
            Some(Self(self.0[..idx].to_string()))
        }
    }

    /// Path of the root ancestor (the instance itself for a root).
    pub fn root_path(&self) -> InstancePath {
        match self.0[1..].find(SEPARATOR) {
            Some(idx) => Self(self.0[..idx + 1].to_string()),
            None => self.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Whether `self` is `other` or one of its descendants.
    pub fn is_within(&self, other: &InstancePath) -> bool {
        self == other
            || (self.0.starts_with(&other.0)
                && self.0[other.0.len()..].starts_with(SEPARATOR))
    }

    pub fn depth(&self) -> usize {
        self.0.matches(SEPARATOR).count()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(SEPARATOR) {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstancePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation() {
        let vm = InstancePath::root("vm").unwrap();
        let app = vm.child("server").unwrap().child("app").unwrap();

        assert_eq!(app.as_str(), "/vm/server/app");
        assert_eq!(app.name(), "app");
        assert_eq!(app.parent().unwrap().as_str(), "/vm/server");
        assert_eq!(app.root_path(), vm);
        assert_eq!(app.depth(), 3);
        assert!(vm.parent().is_none());
        assert!(app.is_within(&vm));
        assert!(!vm.is_within(&app));
    }

    #[test]
    fn test_prefix_is_not_ancestry() {
        let vm = InstancePath::root("vm").unwrap();
        let vm2 = InstancePath::root("vm2").unwrap();
        assert!(!vm2.is_within(&vm));
    }

    #[test]
    fn test_invalid_names() {
        assert!(InstancePath::root("").is_err());
        assert!(InstancePath::root("a/b").is_err());
        assert!(InstancePath::parse("vm/server").is_err());
        assert!(InstancePath::parse("/vm//server").is_err());
        assert_eq!(
            InstancePath::parse("/vm/server").unwrap(),
            InstancePath::root("vm").unwrap().child("server").unwrap()
        );
    }
}
