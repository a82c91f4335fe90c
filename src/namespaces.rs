//! XML namespace handling
//!
//! Qualified names, prefix contexts, and the scoped prefix stack the
//! encoder pushes and pops as it opens and closes elements.

use crate::error::{Error, Result};
use crate::XML_NAMESPACE;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// XML Namespace URI
pub type NamespaceUri = String;

/// Namespace prefix
pub type Prefix = String;

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName; an empty namespace is normalized to no namespace
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()).filter(|s| !s.is_empty()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(Some(namespace), local_name)
    }

    /// Namespace as a string slice, empty when unqualified
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    /// Parse Clark notation (`{uri}local` or plain `local`)
    pub fn parse_clark(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix('{') {
            let (ns, local) = rest
                .split_once('}')
                .ok_or_else(|| Error::Name(format!("Unterminated namespace in '{}'", s)))?;
            if local.is_empty() {
                return Err(Error::Name(format!("Missing local name in '{}'", s)));
            }
            Ok(QName::new(Some(ns), local))
        } else if s.is_empty() {
            Err(Error::Name("Empty qualified name".to_string()))
        } else {
            Ok(QName::local(s))
        }
    }

    /// Check whether two names agree, treating a missing namespace on
    /// either side as a wildcard
    pub fn matches(&self, other: &QName) -> bool {
        if self.local_name != other.local_name {
            return false;
        }
        match (&self.namespace, &other.namespace) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// Namespace context for resolving prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceContext {
    /// Mapping from prefix to namespace URI
    prefixes: IndexMap<Prefix, NamespaceUri>,
    /// Default namespace (no prefix)
    default_namespace: Option<NamespaceUri>,
}

impl NamespaceContext {
    /// Create a new empty namespace context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace prefix mapping; the empty prefix sets the default namespace
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        let prefix = prefix.into();
        if prefix.is_empty() {
            self.default_namespace = Some(namespace.into());
        } else {
            self.prefixes.insert(prefix, namespace.into());
        }
    }

    /// Set the default namespace
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        self.default_namespace = Some(namespace.into());
    }

    /// Get the namespace for a prefix
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        if prefix.is_empty() {
            return self.get_default_namespace();
        }
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    /// Get the default namespace
    pub fn get_default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Iterate over the prefixed mappings in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// True when nothing is declared
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.default_namespace.is_none()
    }

    /// Resolve a prefixed name to a QName
    pub fn resolve(&self, prefixed_name: &str) -> Result<QName> {
        if let Some((prefix, local)) = prefixed_name.split_once(':') {
            let namespace = self
                .get_namespace(prefix)
                .ok_or_else(|| Error::Namespace(format!("Unknown prefix: {}", prefix)))?;
            Ok(QName::namespaced(namespace, local))
        } else {
            Ok(QName::new(self.default_namespace.clone(), prefixed_name))
        }
    }
}

/// Stack of prefix contexts with XML scoping rules
///
/// Lookups search from the innermost context outwards; a prefix declared in
/// an inner context shadows outer declarations until that context is popped.
#[derive(Debug, Clone)]
pub struct NamespaceSupport {
    contexts: Vec<NamespaceContext>,
    generated: usize,
}

impl NamespaceSupport {
    /// Create a prefix stack with the `xml` prefix pre-bound
    pub fn new() -> Self {
        let mut root = NamespaceContext::new();
        root.add_prefix("xml", XML_NAMESPACE);
        Self {
            contexts: vec![root],
            generated: 0,
        }
    }

    /// Open a new scope
    pub fn push_context(&mut self) {
        self.contexts.push(NamespaceContext::new());
    }

    /// Close the innermost scope; the root scope is never removed
    pub fn pop_context(&mut self) {
        if self.contexts.len() > 1 {
            self.contexts.pop();
        }
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    /// Declare a prefix in the innermost scope; "" declares the default namespace
    pub fn declare_prefix(&mut self, prefix: &str, uri: &str) {
        if let Some(current) = self.contexts.last_mut() {
            current.add_prefix(prefix, uri);
        }
    }

    /// URI bound to a prefix ("" for the default namespace)
    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.contexts
            .iter()
            .rev()
            .find_map(|ctx| ctx.get_namespace(prefix))
    }

    /// A non-empty prefix currently bound to `uri`
    pub fn prefix(&self, uri: &str) -> Option<&str> {
        for ctx in self.contexts.iter().rev() {
            for (prefix, bound) in ctx.iter() {
                if bound == uri && self.uri(prefix) == Some(uri) {
                    return Some(prefix);
                }
            }
        }
        None
    }

    /// All visible non-empty prefixes, outermost first, without duplicates
    pub fn prefixes(&self) -> Vec<(String, String)> {
        let mut seen: IndexMap<String, String> = IndexMap::new();
        for ctx in &self.contexts {
            for (prefix, uri) in ctx.iter() {
                seen.insert(prefix.to_string(), uri.to_string());
            }
        }
        seen.into_iter().collect()
    }

    /// Pick an unused prefix for `uri`, preferring `hint`
    pub fn generate_prefix(&mut self, hint: Option<&str>) -> String {
        if let Some(hint) = hint {
            if self.uri(hint).is_none() {
                return hint.to_string();
            }
        }
        loop {
            let candidate = format!("ns{}", self.generated);
            self.generated += 1;
            if self.uri(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

impl Default for NamespaceSupport {
    fn default() -> Self {
        Self::new()
    }
}
