//! Access scopes.
//!
//! Scope names are drawn from a fixed, system-registered set of roles. Only
//! some roles may be granted to OAuth2 clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Registered roles as `(name, oauth2_eligible)`.
pub const REGISTERED_SCOPES: &[(&str, bool)] = &[
    ("read", true),
    ("write", true),
    ("manage_bot", true),
    ("openid", true),
    ("profile", true),
    ("admin", false),
    ("user", false),
    ("bot", false),
];

/// Returns true if `name` is a registered role that OAuth2 clients may request.
pub fn is_oauth2_scope(name: &str) -> bool {
    REGISTERED_SCOPES
        .iter()
        .any(|(scope, eligible)| *eligible && *scope == name)
}

/// A single scope name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessScope(pub String);

impl AccessScope {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered list of distinct scopes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessScopes(pub Vec<AccessScope>);

impl AccessScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, scope: &AccessScope) -> bool {
        self.0.contains(scope)
    }

    /// Adds a scope unless already present.
    pub fn add(&mut self, scope: AccessScope) {
        if !self.contains(&scope) {
            self.0.push(scope);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccessScope> {
        self.0.iter()
    }

    /// Scopes present in both `self` and `other`, in `other`'s order.
    pub fn intersect(&self, other: &AccessScopes) -> AccessScopes {
        AccessScopes(other.iter().filter(|s| self.contains(s)).cloned().collect())
    }

    /// True if every scope of `other` is contained in `self`.
    pub fn covers(&self, other: &AccessScopes) -> bool {
        other.iter().all(|s| self.contains(s))
    }
}

impl fmt::Display for AccessScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(AccessScope::as_str).collect();
        f.write_str(&joined.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for AccessScopes {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut scopes = AccessScopes::new();
        for s in iter {
            scopes.add(AccessScope::new(s));
        }
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        assert!(is_oauth2_scope("read"));
        assert!(is_oauth2_scope("manage_bot"));
        assert!(!is_oauth2_scope("admin"));
        assert!(!is_oauth2_scope("unknown"));
    }

    #[test]
    fn test_intersect_and_covers() {
        let client: AccessScopes = ["read", "write"].into_iter().collect();
        let requested: AccessScopes = ["write", "manage_bot"].into_iter().collect();

        assert_eq!(client.intersect(&requested).to_string(), "write");
        assert!(client.covers(&["read"].into_iter().collect()));
        assert!(!client.covers(&requested));
    }

    #[test]
    fn test_collect_dedups() {
        let scopes: AccessScopes = ["read", "read", "write"].into_iter().collect();
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes.to_string(), "read write");
    }
}
