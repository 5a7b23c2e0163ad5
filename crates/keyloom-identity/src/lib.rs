/*!
 * Keyloom Identity Model
 *
 * A consumer identity is a typed bag of string attributes identifying
 * who or what needs credentials: an OCI registry, a Vault server, an
 * object store. Identities are compared by an asymmetric wildcard rule
 * so a concrete request can match a pattern-bearing configured entry.
 */

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Mandatory attribute naming the identity's kind
pub const ATTR_TYPE: &str = "type";

/// Well-known attribute for path-scoped consumers (e.g. registry repos)
pub const ATTR_PATH: &str = "path";

/// Well-known attribute for host-scoped consumers
pub const ATTR_HOSTNAME: &str = "hostname";

/// A resolved credential map, key to secret value.
///
/// `BTreeMap` keeps merge and comparison order deterministic.
pub type CredentialMap = BTreeMap<String, String>;

/// A typed attribute bag identifying a credential consumer.
///
/// Attribute order is canonical (sorted by key), so two identities are
/// equal exactly when their attribute maps are equal and the canonical
/// string uniquely identifies an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(BTreeMap<String, String>);

impl Identity {
    /// Create an identity of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(ATTR_TYPE.to_string(), kind.into());
        Self(attrs)
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set an attribute in place.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up an attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The identity's kind: the mandatory `type` attribute.
    pub fn kind(&self) -> Option<&str> {
        self.attr(ATTR_TYPE)
    }

    /// Iterate attributes in canonical (sorted) order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical string form: attributes sorted by key, rendered as
    /// `key=value` and joined by commas.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }

    /// Asymmetric wildcard match: does this (concrete) identity match
    /// the (possibly pattern-bearing) `other`?
    ///
    /// Holds when both kinds are equal and, for every attribute of
    /// `self`, the attribute is absent on `other` or `other`'s value is
    /// a glob pattern (`*`, `?`, `[…]`) matching ours. The `path`
    /// attribute is ignored when empty on either side. Note the
    /// asymmetry: `a.matches(b)` says nothing about `b.matches(a)`.
    pub fn matches(&self, other: &Identity) -> bool {
        match (self.kind(), other.kind()) {
            (Some(a), Some(b)) if a == b => {}
            _ => return false,
        }

        for (key, value) in self.attrs() {
            if key == ATTR_TYPE {
                continue;
            }
            let Some(pattern) = other.attr(key) else {
                continue;
            };
            if key == ATTR_PATH && (value.is_empty() || pattern.is_empty()) {
                continue;
            }
            if !glob_match(pattern, value) {
                return false;
            }
        }

        true
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromIterator<(String, String)> for Identity {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Match `value` against a configured glob pattern. A value that does
/// not parse as a pattern participates as a literal string.
fn glob_match(pattern: &str, value: &str) -> bool {
    // Attribute values are path-like: `*` must not cross a separator.
    let mut options = glob::MatchOptions::new();
    options.require_literal_separator = true;

    match glob::Pattern::new(pattern) {
        Ok(p) => p.matches_with(value, options),
        Err(_) => pattern == value,
    }
}
