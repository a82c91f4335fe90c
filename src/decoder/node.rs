//! Parsed element content handed to bindings

use crate::namespaces::QName;
use crate::value::{Class, Value};
use indexmap::IndexMap;

/// A parsed child value
#[derive(Debug, Clone, PartialEq)]
pub struct ChildNode {
    /// Element name
    pub name: QName,
    /// Value produced by the child's binding chain
    pub value: Value,
    /// The child's particle allows more than one occurrence
    pub multiple: bool,
}

/// An element as seen by a binding's parse hook
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Element name
    pub name: QName,
    /// Name of the element's type, None for anonymous types
    pub type_name: Option<QName>,
    /// Parsed attribute values
    pub attributes: IndexMap<QName, Value>,
    /// Parsed children in document order
    pub children: Vec<ChildNode>,
    /// Character content, None when the element had none
    pub text: Option<String>,
    /// Comments found directly inside the element
    pub comments: Vec<String>,
    /// `xsi:nil="true"`
    pub nil: bool,
}

impl Node {
    /// An empty node
    pub fn new(name: QName) -> Self {
        Self {
            name,
            type_name: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            text: None,
            comments: Vec::new(),
            nil: false,
        }
    }

    /// Class for records built from this node: the type name, or the
    /// element name for anonymous types
    pub fn class(&self) -> Class {
        Class::new(self.type_name.clone().unwrap_or_else(|| self.name.clone()))
    }

    /// Attribute value by local name
    pub fn attribute(&self, local_name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(name, _)| name.local_name == local_name)
            .map(|(_, value)| value)
    }

    /// First child value with the given local name
    pub fn child_value(&self, local_name: &str) -> Option<&Value> {
        self.children
            .iter()
            .find(|child| child.name.local_name == local_name)
            .map(|child| &child.value)
    }

    /// Every child value with the given local name
    pub fn child_values(&self, local_name: &str) -> Vec<&Value> {
        self.children
            .iter()
            .filter(|child| child.name.local_name == local_name)
            .map(|child| &child.value)
            .collect()
    }

    /// True when there are no attributes and no children
    pub fn is_simple(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_by_local_name() {
        let mut node = Node::new(QName::namespaced("urn:test", "Root"));
        node.attributes
            .insert(QName::local("id"), Value::String("A1".into()));
        for text in ["x", "y"] {
            node.children.push(ChildNode {
                name: QName::namespaced("urn:test", "Item"),
                value: Value::String(text.into()),
                multiple: true,
            });
        }

        assert_eq!(node.attribute("id"), Some(&Value::String("A1".into())));
        assert_eq!(node.child_value("Item"), Some(&Value::String("x".into())));
        assert_eq!(node.child_values("Item").len(), 2);
        assert!(!node.is_simple());
        assert_eq!(node.class().name().local_name, "Root");
    }
}
