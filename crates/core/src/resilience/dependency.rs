//! Dependency identity

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::config::{ConfigError, ConfigResult};

/// Name of a remote dependency, e.g. `payment-service`
///
/// Keys every piece of per-dependency state. Cloning bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyName(Arc<str>);

impl DependencyName {
    /// Parse a name, rejecting empty or whitespace-only input
    pub fn parse(name: impl AsRef<str>) -> ConfigResult<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(ConfigError::invalid("dependency", "name must not be empty"));
        }
        Ok(Self(Arc::from(name)))
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shared handle to the underlying string
    pub fn shared(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl fmt::Display for DependencyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DependencyName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DependencyName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DependencyName {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for DependencyName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&DependencyName> for Arc<str> {
    fn from(name: &DependencyName) -> Self {
        name.shared()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn parse_trims_and_rejects_empty() {
        assert_eq!(DependencyName::parse("  payments ").unwrap().as_str(), "payments");
        assert!(DependencyName::parse("").is_err());
        assert!(DependencyName::parse("   ").is_err());
    }

    #[test]
    fn lookup_by_str_matches_owned_key() {
        let mut map = HashMap::new();
        map.insert(DependencyName::from("inventory"), 1);
        assert_eq!(map.get("inventory"), Some(&1));
    }

    #[test]
    fn clones_share_storage() {
        let name = DependencyName::from("search");
        let shared = name.shared();
        assert!(Arc::ptr_eq(&shared, &name.clone().shared()));
        assert_eq!(name.to_string(), "search");
    }
}
