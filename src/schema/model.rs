//! Schema component arena
//!
//! Type definitions, element and attribute declarations live in flat
//! vectors and refer to each other through [`TypeId`], [`ElementId`] and
//! [`AttributeId`]. Cross references (a type's base, an element's
//! substitution head, an element reference) are lookups into the arena, so
//! cyclic schema graphs need no shared ownership.

use super::particles::Occurs;
use crate::namespaces::QName;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Index of a type definition in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

impl TypeId {
    /// `xs:anyType`, always the first type of every arena
    pub const ANY_TYPE: TypeId = TypeId(0);
}

/// Index of an element declaration in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) usize);

/// Index of an attribute declaration in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(pub(crate) usize);

/// How a type was derived from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Derived by extension
    Extension,
    /// Derived by restriction
    Restriction,
}

/// Variety of a simple type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleVariety {
    /// Single values
    Atomic,
    /// Whitespace separated values of an item type
    List(TypeId),
    /// Values of one of the member types
    Union(Vec<TypeId>),
}

/// Content of a complex type
#[derive(Debug, Clone, PartialEq)]
pub enum ContentType {
    /// No content
    Empty,
    /// Simple (text) content of the given simple type
    Simple(TypeId),
    /// Element content
    Element(Particle),
}

/// Use of an attribute declaration by a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUse {
    /// The declaration
    pub attribute: AttributeId,
    /// `use="required"`
    pub required: bool,
}

/// Shape of a type definition
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Simple type
    Simple(SimpleVariety),
    /// Complex type
    Complex {
        /// Content model
        content: ContentType,
        /// Character data allowed between children
        mixed: bool,
        /// Declared abstract
        is_abstract: bool,
        /// Attribute uses declared on this type, attribute groups inlined
        attributes: Vec<AttributeUse>,
    },
}

/// A type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    /// Name, None for anonymous types
    pub name: Option<QName>,
    /// Base type; the root of the hierarchy is its own base
    pub base: TypeId,
    /// Derivation method from the base
    pub derivation: Derivation,
    /// Shape
    pub kind: TypeKind,
}

impl TypeDefinition {
    /// True for simple types
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, TypeKind::Simple(_))
    }

    /// Element content particle of a complex type
    pub fn particle(&self) -> Option<&Particle> {
        match &self.kind {
            TypeKind::Complex {
                content: ContentType::Element(particle),
                ..
            } => Some(particle),
            _ => None,
        }
    }

    /// Attribute uses declared directly on this type
    pub fn attribute_uses(&self) -> &[AttributeUse] {
        match &self.kind {
            TypeKind::Complex { attributes, .. } => attributes,
            TypeKind::Simple(_) => &[],
        }
    }

    /// True for mixed complex types
    pub fn is_mixed(&self) -> bool {
        matches!(self.kind, TypeKind::Complex { mixed: true, .. })
    }
}

/// Model group compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    /// `xs:sequence`
    Sequence,
    /// `xs:choice`
    Choice,
    /// `xs:all`
    All,
}

/// A model group
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGroup {
    /// Compositor
    pub compositor: Compositor,
    /// Member particles in declaration order
    pub particles: Vec<Particle>,
}

/// Namespace constraint of a wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardNamespace {
    /// `##any`
    Any,
    /// `##other`: any namespace except the target namespace
    Other(Option<String>),
    /// An explicit list; None stands for `##local`
    List(Vec<Option<String>>),
}

/// An `xs:any` wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    /// Namespace constraint
    pub namespace: WildcardNamespace,
    /// `processContents` is `skip`
    pub skip: bool,
}

impl Wildcard {
    /// Wildcard admitting anything
    pub fn any() -> Self {
        Self {
            namespace: WildcardNamespace::Any,
            skip: false,
        }
    }

    /// True when an element named `name` may appear in this wildcard
    pub fn allows(&self, name: &QName) -> bool {
        match &self.namespace {
            WildcardNamespace::Any => true,
            WildcardNamespace::Other(target) => {
                name.namespace.is_some() && name.namespace != *target
            }
            WildcardNamespace::List(namespaces) => namespaces.contains(&name.namespace),
        }
    }
}

/// Term of a particle
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// An element declaration (possibly a reference)
    Element(ElementId),
    /// A nested model group
    Group(ModelGroup),
    /// A wildcard
    Any(Wildcard),
}

/// Occurrence bounds over a term
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Occurrence bounds
    pub occurs: Occurs,
    /// Content
    pub term: Term,
}

impl Particle {
    /// Element particle
    pub fn element(element: ElementId, occurs: Occurs) -> Self {
        Self {
            occurs,
            term: Term::Element(element),
        }
    }
}

/// An element declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDeclaration {
    /// Element name; unqualified local elements have no namespace
    pub name: QName,
    /// Type of the element
    pub type_id: TypeId,
    /// Declared abstract
    pub is_abstract: bool,
    /// Declared nillable
    pub nillable: bool,
    /// Head of the substitution group this element belongs to
    pub substitution_head: Option<ElementId>,
    /// Declared at schema level
    pub global: bool,
    /// Name is namespace qualified in instances
    pub qualified: bool,
    /// Global declaration this one refers to (`ref="..."`)
    pub reference: Option<ElementId>,
    /// Default value
    pub default: Option<String>,
}

impl ElementDeclaration {
    /// A global, qualified declaration of `name` with type `type_id`
    pub fn new(name: QName, type_id: TypeId) -> Self {
        Self {
            name,
            type_id,
            is_abstract: false,
            nillable: false,
            substitution_head: None,
            global: true,
            qualified: true,
            reference: None,
            default: None,
        }
    }
}

/// An attribute declaration
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDeclaration {
    /// Attribute name
    pub name: QName,
    /// Simple type of the attribute
    pub type_id: TypeId,
    /// Declared at schema level
    pub global: bool,
    /// Default value
    pub default: Option<String>,
    /// Fixed value
    pub fixed: Option<String>,
}

/// A built schema
///
/// Everything except the substitution groups is immutable once built.
/// Substitution groups may be extended later (a schema that imports this one
/// can add members), so they sit behind a lock and queries hand out copies.
#[derive(Debug)]
pub struct Schema {
    pub(crate) target_namespace: Option<String>,
    pub(crate) prefixes: IndexMap<String, String>,
    pub(crate) types: Vec<TypeDefinition>,
    pub(crate) elements: Vec<ElementDeclaration>,
    pub(crate) attributes: Vec<AttributeDeclaration>,
    pub(crate) global_types: IndexMap<QName, TypeId>,
    pub(crate) global_elements: IndexMap<QName, ElementId>,
    pub(crate) global_attributes: IndexMap<QName, AttributeId>,
    pub(crate) element_form_qualified: bool,
    substitutions: RwLock<HashMap<ElementId, Vec<ElementId>>>,
}

impl Schema {
    /// An empty arena holding only the built-in types
    pub fn new() -> Self {
        let mut schema = Self {
            target_namespace: None,
            prefixes: IndexMap::new(),
            types: Vec::new(),
            elements: Vec::new(),
            attributes: Vec::new(),
            global_types: IndexMap::new(),
            global_elements: IndexMap::new(),
            global_attributes: IndexMap::new(),
            element_form_qualified: false,
            substitutions: RwLock::new(HashMap::new()),
        };
        super::builtins::register_builtins(&mut schema);
        schema
    }

    /// Target namespace of the root schema document
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Prefixes declared on the root schema document
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// `elementFormDefault="qualified"` on the root schema document
    pub fn element_form_qualified(&self) -> bool {
        self.element_form_qualified
    }

    /// The ur-type, `xs:anyType`
    pub fn any_type(&self) -> TypeId {
        TypeId::ANY_TYPE
    }

    /// Type definition by id
    pub fn type_definition(&self, id: TypeId) -> &TypeDefinition {
        &self.types[id.0]
    }

    /// Element declaration by id
    pub fn element(&self, id: ElementId) -> &ElementDeclaration {
        &self.elements[id.0]
    }

    /// Attribute declaration by id
    pub fn attribute(&self, id: AttributeId) -> &AttributeDeclaration {
        &self.attributes[id.0]
    }

    /// Name of a type, None for anonymous types
    pub fn type_name(&self, id: TypeId) -> Option<&QName> {
        self.type_definition(id).name.as_ref()
    }

    /// Base type; the root of the hierarchy returns itself
    pub fn base_type(&self, id: TypeId) -> TypeId {
        self.type_definition(id).base
    }

    /// Global type by name
    pub fn type_by_name(&self, name: &QName) -> Option<TypeId> {
        self.global_types.get(name).copied()
    }

    /// Global element by name
    pub fn element_by_name(&self, name: &QName) -> Option<ElementId> {
        self.global_elements.get(name).copied()
    }

    /// Global attribute by name
    pub fn attribute_by_name(&self, name: &QName) -> Option<AttributeId> {
        self.global_attributes.get(name).copied()
    }

    /// Global elements in declaration order
    pub fn global_elements(&self) -> impl Iterator<Item = (&QName, ElementId)> {
        self.global_elements.iter().map(|(n, id)| (n, *id))
    }

    /// Global types in declaration order, built-ins first
    pub fn global_types(&self) -> impl Iterator<Item = (&QName, TypeId)> {
        self.global_types.iter().map(|(n, id)| (n, *id))
    }

    /// Dereference an element reference
    pub fn resolved_element(&self, id: ElementId) -> ElementId {
        let mut current = id;
        let mut hops = 0;
        while let Some(target) = self.element(current).reference {
            current = target;
            hops += 1;
            if hops > self.elements.len() {
                break;
            }
        }
        current
    }

    /// Transitive members of the substitution group headed by `head`
    ///
    /// Returns a copy, so callers may iterate while the group is extended.
    pub fn substitution_group(&self, head: ElementId) -> Vec<ElementId> {
        let groups = self.substitutions.read();
        let mut members = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![self.resolved_element(head)];
        while let Some(current) = pending.pop() {
            if let Some(direct) = groups.get(&current) {
                for member in direct {
                    if seen.insert(*member) {
                        members.push(*member);
                        pending.push(*member);
                    }
                }
            }
        }
        members
    }

    /// Add `member` to the substitution group headed by `head`
    pub fn extend_substitution_group(&self, head: ElementId, member: ElementId) {
        let mut groups = self.substitutions.write();
        let entry = groups.entry(head).or_default();
        if !entry.contains(&member) {
            entry.push(member);
        }
    }

    /// Drop the substitution group members declared in `namespace`
    pub fn dispose_namespace(&self, namespace: &str) {
        let mut groups = self.substitutions.write();
        for members in groups.values_mut() {
            members.retain(|m| self.elements[m.0].name.namespace.as_deref() != Some(namespace));
        }
        groups.retain(|_, members| !members.is_empty());
        debug!(namespace, "disposed substitution group members");
    }

    pub(crate) fn add_type(&mut self, definition: TypeDefinition) -> TypeId {
        let id = TypeId(self.types.len());
        if let Some(name) = &definition.name {
            self.global_types.insert(name.clone(), id);
        }
        self.types.push(definition);
        id
    }

    pub(crate) fn replace_type(&mut self, id: TypeId, definition: TypeDefinition) {
        self.types[id.0] = definition;
    }

    pub(crate) fn add_element(&mut self, declaration: ElementDeclaration) -> ElementId {
        let id = ElementId(self.elements.len());
        if declaration.global {
            self.global_elements.insert(declaration.name.clone(), id);
        }
        self.elements.push(declaration);
        id
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> &mut ElementDeclaration {
        &mut self.elements[id.0]
    }

    pub(crate) fn add_attribute(&mut self, declaration: AttributeDeclaration) -> AttributeId {
        let id = AttributeId(self.attributes.len());
        if declaration.global {
            self.global_attributes.insert(declaration.name.clone(), id);
        }
        self.attributes.push(declaration);
        id
    }

    pub(crate) fn attribute_mut(&mut self, id: AttributeId) -> &mut AttributeDeclaration {
        &mut self.attributes[id.0]
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XSD_NAMESPACE;

    fn string_type(schema: &Schema) -> TypeId {
        schema
            .type_by_name(&QName::namespaced(XSD_NAMESPACE, "string"))
            .unwrap()
    }

    #[test]
    fn test_any_type_is_its_own_base() {
        let schema = Schema::new();
        let any = schema.any_type();
        assert_eq!(schema.base_type(any), any);
        assert_eq!(
            schema.type_name(any),
            Some(&QName::namespaced(XSD_NAMESPACE, "anyType"))
        );
    }

    #[test]
    fn test_substitution_group_is_transitive_snapshot() {
        let mut schema = Schema::new();
        let t = string_type(&schema);
        let head = schema.add_element(ElementDeclaration::new(QName::local("Head"), t));
        let a = schema.add_element(ElementDeclaration::new(QName::local("A"), t));
        let b = schema.add_element(ElementDeclaration::new(QName::local("B"), t));

        schema.extend_substitution_group(head, a);
        schema.extend_substitution_group(a, b);
        let snapshot = schema.substitution_group(head);
        assert_eq!(snapshot, vec![a, b]);

        // extending afterwards does not touch the snapshot
        let c = schema.add_element(ElementDeclaration::new(QName::namespaced("urn:c", "C"), t));
        schema.extend_substitution_group(head, c);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(schema.substitution_group(head).len(), 3);

        schema.dispose_namespace("urn:c");
        assert_eq!(schema.substitution_group(head), vec![a, b]);
    }

    #[test]
    fn test_resolved_element_follows_reference() {
        let mut schema = Schema::new();
        let t = string_type(&schema);
        let global = schema.add_element(ElementDeclaration::new(QName::local("G"), t));
        let mut local = ElementDeclaration::new(QName::local("G"), t);
        local.global = false;
        local.reference = Some(global);
        let reference = schema.add_element(local);

        assert_eq!(schema.resolved_element(reference), global);
        assert_eq!(schema.resolved_element(global), global);
    }

    #[test]
    fn test_wildcard_namespaces() {
        let any = Wildcard::any();
        assert!(any.allows(&QName::local("x")));

        let other = Wildcard {
            namespace: WildcardNamespace::Other(Some("urn:t".to_string())),
            skip: false,
        };
        assert!(other.allows(&QName::namespaced("urn:o", "x")));
        assert!(!other.allows(&QName::namespaced("urn:t", "x")));
        assert!(!other.allows(&QName::local("x")));

        let local = Wildcard {
            namespace: WildcardNamespace::List(vec![None]),
            skip: true,
        };
        assert!(local.allows(&QName::local("x")));
    }
}
