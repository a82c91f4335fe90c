//! Child property extraction
//!
//! Before encoding the children of an element, the encoder asks a
//! [`PropertyExtractor`] for `(particle, value)` pairs. The default
//! [`BindingPropertyExtractor`] walks the declared child particles of the
//! element's type in schema order and asks the binding chain for each one,
//! then maps any additional properties the bindings report onto wildcards,
//! global elements, or synthetic `xs:anyType` elements. Additional properties
//! reported more than once under one name are merged into a single unbounded
//! child.

use crate::binding::{chain_properties, chain_property, Binding};
use crate::error::Result;
use crate::namespaces::QName;
use crate::schema::{ElementDeclaration, ElementId, Occurs, Schema, TypeId};
use crate::value::Value;
use crate::XSDBIND_NAMESPACE;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::trace;

/// Pseudo element name under which a property is written as an XML comment
pub static COMMENT: Lazy<QName> = Lazy::new(|| QName::namespaced(XSDBIND_NAMESPACE, "comment"));

/// One child to encode
#[derive(Debug, Clone)]
pub struct ChildProperty {
    /// Declaration as it appears in the content model, None for synthetic children
    pub element: Option<ElementId>,
    /// Effective declaration (references resolved)
    pub declaration: ElementDeclaration,
    /// Effective occurrence bounds
    pub occurs: Occurs,
    /// Value, `Value::Null` when absent
    pub value: Value,
}

impl ChildProperty {
    /// Child for a declared element particle
    pub fn declared(schema: &Schema, element: ElementId, occurs: Occurs, value: Value) -> Self {
        Self {
            element: Some(element),
            declaration: schema.element(schema.resolved_element(element)).clone(),
            occurs,
            value,
        }
    }

    /// Child with no counterpart in the schema
    pub fn synthetic(declaration: ElementDeclaration, occurs: Occurs, value: Value) -> Self {
        Self {
            element: None,
            declaration,
            occurs,
            value,
        }
    }

    /// A comment to emit among the children
    pub fn comment(text: impl Into<String>) -> Self {
        let mut declaration = ElementDeclaration::new(COMMENT.clone(), TypeId::ANY_TYPE);
        declaration.global = false;
        Self::synthetic(declaration, Occurs::optional(), Value::String(text.into()))
    }

    /// Name of the child element
    pub fn name(&self) -> &QName {
        &self.declaration.name
    }
}

/// Produces the children of a value
pub trait PropertyExtractor: Send + Sync {
    /// True when this extractor knows how to take `value` apart
    fn can_handle(&self, value: &Value) -> bool;

    /// Children of `value` encoded as `element`; `chain` is the element's
    /// binding chain
    fn properties(
        &self,
        value: &Value,
        element: &ElementDeclaration,
        schema: &Schema,
        chain: &[Arc<dyn Binding>],
    ) -> Result<Vec<ChildProperty>>;
}

/// Extractor backed by the binding chain's property hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct BindingPropertyExtractor;

impl PropertyExtractor for BindingPropertyExtractor {
    fn can_handle(&self, _value: &Value) -> bool {
        true
    }

    fn properties(
        &self,
        value: &Value,
        element: &ElementDeclaration,
        schema: &Schema,
        chain: &[Arc<dyn Binding>],
    ) -> Result<Vec<ChildProperty>> {
        let mut properties = Vec::new();
        for particle in schema.child_element_particles(element.type_id, true) {
            let resolved = schema.element(schema.resolved_element(particle.element));
            let child = chain_property(chain, value, &resolved.name)?.unwrap_or(Value::Null);
            properties.push(ChildProperty::declared(schema, particle.element, particle.occurs, child));
        }

        let mut extras: IndexMap<QName, Vec<Value>> = IndexMap::new();
        for (name, extra) in chain_properties(chain, value, element)? {
            extras.entry(name).or_default().push(extra);
        }
        for (name, mut values) in extras {
            let repeated = values.len() > 1;
            let extra = if repeated {
                Value::List(values)
            } else {
                values.pop().unwrap_or(Value::Null)
            };
            if let Some(slot) = properties.iter_mut().find(|p| p.name() == &name) {
                slot.value = extra;
                if repeated {
                    slot.occurs.max = None;
                }
                continue;
            }
            trace!(%name, repeated, "mapping additional property");
            let mut property = map_additional(schema, element.type_id, name, extra);
            if repeated {
                property.occurs.max = None;
            }
            properties.push(property);
        }
        Ok(properties)
    }
}

fn map_additional(schema: &Schema, parent_type: TypeId, name: QName, value: Value) -> ChildProperty {
    if name == *COMMENT {
        return ChildProperty::synthetic(
            ElementDeclaration {
                global: false,
                ..ElementDeclaration::new(name, TypeId::ANY_TYPE)
            },
            Occurs::optional(),
            value,
        );
    }

    let global = schema.element_by_name(&name);
    let wildcard = schema
        .any_element_particles(parent_type)
        .into_iter()
        .find(|any| any.wildcard.allows(&name));

    let occurs = match (&wildcard, &value) {
        (Some(any), _) => any.occurs,
        (None, Value::List(_) | Value::Stream(_)) => Occurs::zero_or_more(),
        (None, _) => Occurs::optional(),
    };
    match global {
        Some(id) => ChildProperty::declared(schema, id, occurs, value),
        None => {
            let mut declaration = ElementDeclaration::new(name, TypeId::ANY_TYPE);
            declaration.global = false;
            ChildProperty::synthetic(declaration, occurs, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::builtins::AnyTypeBinding;
    use crate::loaders::Loader;
    use crate::locations::Location;
    use crate::schema::SchemaBuilder;
    use crate::value::{Class, Record};

    const XSD: &str = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        targetNamespace="urn:test" elementFormDefault="qualified">
      <xs:element name="Note" type="xs:string"/>
      <xs:complexType name="RootType">
        <xs:sequence>
          <xs:element name="Item" type="xs:string" maxOccurs="unbounded"/>
          <xs:element name="Count" type="xs:int" minOccurs="0"/>
          <xs:any namespace="##other" processContents="lax" minOccurs="0"/>
        </xs:sequence>
      </xs:complexType>
      <xs:element name="Root" type="RootType" xmlns="urn:test"/>
    </xs:schema>"###;

    fn schema() -> Schema {
        SchemaBuilder::new(Loader::new())
            .with_source(Location::inline("test.xsd", XSD))
            .build()
            .unwrap()
    }

    #[derive(Debug)]
    struct Extras;

    impl Binding for Extras {
        fn target(&self) -> QName {
            QName::namespaced("urn:test", "RootType")
        }
        fn properties(&self, _value: &Value, _element: &ElementDeclaration) -> Result<Vec<(QName, Value)>> {
            Ok(vec![
                (QName::namespaced("urn:test", "Count"), Value::Integer(2)),
                (QName::namespaced("urn:other", "Extra"), Value::String("e".into())),
                (QName::namespaced("urn:test", "Note"), Value::String("n".into())),
            ])
        }
    }

    #[test]
    fn test_declared_particles_in_schema_order() {
        let schema = schema();
        let root = schema.element(schema.element_by_name(&QName::namespaced("urn:test", "Root")).unwrap());
        let value = Value::Record(
            Record::new(Class::new(QName::namespaced("urn:test", "RootType")))
                .with("Item", Value::List(vec!["x".into(), "y".into()])),
        );
        let chain: Vec<Arc<dyn Binding>> = vec![Arc::new(AnyTypeBinding)];

        let properties = BindingPropertyExtractor
            .properties(&value, root, &schema, &chain)
            .unwrap();
        let names: Vec<&str> = properties.iter().map(|p| p.name().local_name.as_str()).collect();
        assert_eq!(names, vec!["Item", "Count"]);
        assert!(properties[0].occurs.is_multiple());
        assert_eq!(properties[1].value, Value::Null);
    }

    #[test]
    fn test_additional_properties() {
        let schema = schema();
        let root = schema.element(schema.element_by_name(&QName::namespaced("urn:test", "Root")).unwrap());
        let chain: Vec<Arc<dyn Binding>> = vec![Arc::new(AnyTypeBinding), Arc::new(Extras)];
        let value = Value::Record(Record::new(Class::new(QName::local("RootType"))));

        let properties = BindingPropertyExtractor
            .properties(&value, root, &schema, &chain)
            .unwrap();
        assert_eq!(properties.len(), 4);
        // replaces the declared slot
        assert_eq!(properties[1].value, Value::Integer(2));
        // wildcard
        assert_eq!(properties[2].name(), &QName::namespaced("urn:other", "Extra"));
        assert!(properties[2].element.is_none());
        assert_eq!(properties[2].declaration.type_id, TypeId::ANY_TYPE);
        // global element
        assert!(properties[3].element.is_some());
    }

    #[derive(Debug)]
    struct Repeated;

    impl Binding for Repeated {
        fn target(&self) -> QName {
            QName::namespaced("urn:test", "RootType")
        }
        fn properties(&self, _value: &Value, _element: &ElementDeclaration) -> Result<Vec<(QName, Value)>> {
            Ok(vec![
                (QName::namespaced("urn:other", "Tag"), Value::String("a".into())),
                (QName::namespaced("urn:other", "Tag"), Value::String("b".into())),
            ])
        }
    }

    #[test]
    fn test_repeated_additional_properties_are_grouped() {
        let schema = schema();
        let root = schema.element(schema.element_by_name(&QName::namespaced("urn:test", "Root")).unwrap());
        let chain: Vec<Arc<dyn Binding>> = vec![Arc::new(AnyTypeBinding), Arc::new(Repeated)];
        let value = Value::Record(Record::new(Class::new(QName::local("RootType"))));

        let properties = BindingPropertyExtractor
            .properties(&value, root, &schema, &chain)
            .unwrap();
        let tag = properties.last().unwrap();
        assert_eq!(tag.name(), &QName::namespaced("urn:other", "Tag"));
        assert_eq!(tag.value, Value::List(vec!["a".into(), "b".into()]));
        assert!(tag.occurs.is_unbounded());
    }

    #[test]
    fn test_comment_child() {
        let comment = ChildProperty::comment("generated");
        assert_eq!(comment.name(), &*COMMENT);
        assert_eq!(comment.value, Value::String("generated".into()));
    }
}
