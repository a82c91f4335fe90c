//! Building schemas from XSD documents
//!
//! Building happens in two phases. First every document the schema needs
//! (the sources, their imports and includes) is fetched and scanned, with
//! no lock held. Then the arena is built while holding
//! [`SCHEMA_BUILD_LOCK`]: all builds in the process are serialized there,
//! since the substitution groups they populate may be shared by schemas
//! that import each other.

use super::model::{
    AttributeDeclaration, AttributeId, AttributeUse, Compositor, ContentType, Derivation,
    ElementDeclaration, ElementId, ModelGroup, Particle, Schema, SimpleVariety, Term,
    TypeDefinition, TypeId, TypeKind, Wildcard, WildcardNamespace,
};
use super::particles::parse_occurs;
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::names::split_qname;
use crate::namespaces::QName;
use crate::XSD_NAMESPACE;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use roxmltree::Node;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Process-wide lock held while a schema arena is built
pub static SCHEMA_BUILD_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const GROUP: &str = "group";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const ANNOTATION: &str = "annotation";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const REDEFINE: &str = "redefine";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const ANY: &str = "any";
}

/// XSD attribute names
mod xsd_attrs {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const TARGET_NAMESPACE: &str = "targetNamespace";
    pub const ELEMENT_FORM_DEFAULT: &str = "elementFormDefault";
    pub const ATTRIBUTE_FORM_DEFAULT: &str = "attributeFormDefault";
    pub const FORM: &str = "form";
    pub const NILLABLE: &str = "nillable";
    pub const DEFAULT: &str = "default";
    pub const FIXED: &str = "fixed";
    pub const BASE: &str = "base";
    pub const MIXED: &str = "mixed";
    pub const ABSTRACT: &str = "abstract";
    pub const SUBSTITUTION_GROUP: &str = "substitutionGroup";
    pub const NAMESPACE: &str = "namespace";
    pub const SCHEMA_LOCATION: &str = "schemaLocation";
    pub const ITEM_TYPE: &str = "itemType";
    pub const MEMBER_TYPES: &str = "memberTypes";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const USE: &str = "use";
    pub const PROCESS_CONTENTS: &str = "processContents";
}

/// A fetched schema document
#[derive(Debug, Clone)]
struct SourceDocument {
    location: Location,
    text: String,
    /// Namespace adopted by a chameleon include
    chameleon: Option<String>,
}

/// Pending fetch in the worklist
struct PendingFetch {
    location: Location,
    chameleon: Option<String>,
    depth: usize,
    required: bool,
    fallback: Option<Location>,
}

/// Builds a [`Schema`] from one or more XSD documents
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    loader: Loader,
    sources: Vec<Location>,
    namespace_locations: HashMap<String, Location>,
    ignore_schema_locations: bool,
}

impl SchemaBuilder {
    /// Create a builder fetching documents through `loader`
    pub fn new(loader: Loader) -> Self {
        Self {
            loader,
            ..Self::default()
        }
    }

    /// Add a source document; the first source is the root schema
    pub fn with_source(mut self, location: Location) -> Self {
        self.sources.push(location);
        self
    }

    /// Where to find the schema for `namespace` when an import names no location
    pub fn with_namespace_location(mut self, namespace: impl Into<String>, location: Location) -> Self {
        self.namespace_locations.insert(namespace.into(), location);
        self
    }

    /// Resolve imports through the namespace locations only
    pub fn ignore_schema_locations(mut self, ignore: bool) -> Self {
        self.ignore_schema_locations = ignore;
        self
    }

    /// Fetch every document and build the arena
    pub fn build(self) -> Result<Schema> {
        let documents = self.fetch()?;
        debug!(documents = documents.len(), "building schema");

        let _guard = SCHEMA_BUILD_LOCK.lock();
        let schema = build_arena(&documents, self.loader.limits())?;
        debug!(
            target_namespace = schema.target_namespace().unwrap_or(""),
            elements = schema.global_elements.len(),
            "schema built"
        );
        Ok(schema)
    }

    fn fetch(&self) -> Result<Vec<SourceDocument>> {
        let mut documents = Vec::new();
        let mut visited: HashSet<(String, Option<String>)> = HashSet::new();
        let mut queue: VecDeque<PendingFetch> = self
            .sources
            .iter()
            .map(|location| PendingFetch {
                location: location.clone(),
                chameleon: None,
                depth: 0,
                required: true,
                fallback: None,
            })
            .collect();

        while let Some(pending) = queue.pop_front() {
            if !visited.insert((pending.location.key(), pending.chameleon.clone())) {
                continue;
            }
            self.loader.limits().check_schema_depth(pending.depth)?;

            let text = match self.loader.load(&pending.location) {
                Ok(text) => text,
                Err(err) if !pending.required => {
                    match pending.fallback {
                        Some(fallback) => {
                            debug!(location = %pending.location, "falling back to {}", fallback);
                            queue.push_back(PendingFetch {
                                location: fallback,
                                chameleon: None,
                                depth: pending.depth,
                                required: false,
                                fallback: None,
                            });
                        }
                        None => warn!(location = %pending.location, "skipping unresolved import: {}", err),
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };

            let doc = parse_document(&text, &pending.location)?;
            let root = doc.root_element();
            let own_namespace = root.attribute(xsd_attrs::TARGET_NAMESPACE).map(str::to_string);
            if let (Some(own), Some(expected)) = (&own_namespace, &pending.chameleon) {
                if own != expected {
                    return Err(ParseError::new(format!(
                        "Included schema has different targetNamespace '{}', expected '{}'",
                        own, expected
                    ))
                    .with_location(pending.location.to_string())
                    .into());
                }
            }
            let effective_namespace = own_namespace.clone().or_else(|| pending.chameleon.clone());

            for child in xsd_children(root) {
                match child.tag_name().name() {
                    xsd_elements::IMPORT => {
                        let namespace = child.attribute(xsd_attrs::NAMESPACE).unwrap_or("");
                        let fallback = self.namespace_locations.get(namespace).cloned();
                        let explicit = match child.attribute(xsd_attrs::SCHEMA_LOCATION) {
                            Some(reference) if !self.ignore_schema_locations => {
                                Some(pending.location.resolve(reference)?)
                            }
                            _ => None,
                        };
                        match (explicit, fallback) {
                            (Some(location), fallback) => queue.push_back(PendingFetch {
                                location,
                                chameleon: None,
                                depth: pending.depth + 1,
                                required: false,
                                fallback,
                            }),
                            (None, Some(location)) => queue.push_back(PendingFetch {
                                location,
                                chameleon: None,
                                depth: pending.depth + 1,
                                required: false,
                                fallback: None,
                            }),
                            (None, None) => {
                                debug!(namespace, "import names no location; skipped")
                            }
                        }
                    }
                    xsd_elements::INCLUDE | xsd_elements::REDEFINE => {
                        let reference = child.attribute(xsd_attrs::SCHEMA_LOCATION).ok_or_else(|| {
                            ParseError::new("include without schemaLocation")
                                .with_location(pending.location.to_string())
                        })?;
                        queue.push_back(PendingFetch {
                            location: pending.location.resolve(reference)?,
                            chameleon: effective_namespace.clone(),
                            depth: pending.depth + 1,
                            required: true,
                            fallback: None,
                        });
                    }
                    _ => {}
                }
            }

            drop(doc);
            documents.push(SourceDocument {
                location: pending.location,
                text,
                chameleon: pending.chameleon,
            });
        }
        Ok(documents)
    }
}

fn parse_document<'input>(text: &'input str, location: &Location) -> Result<roxmltree::Document<'input>> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(text, options)
        .map_err(|e| ParseError::from(e).with_location(location.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != xsd_elements::SCHEMA || root.tag_name().namespace() != Some(XSD_NAMESPACE) {
        return Err(ParseError::new(format!(
            "Expected xs:schema root element, got {}",
            root.tag_name().name()
        ))
        .with_location(location.to_string())
        .into());
    }
    Ok(doc)
}

fn xsd_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| {
        child.is_element()
            && child.tag_name().namespace() == Some(XSD_NAMESPACE)
            && child.tag_name().name() != xsd_elements::ANNOTATION
    })
}

fn bool_attr(node: Node, name: &str) -> bool {
    matches!(node.attribute(name).map(str::trim), Some("true") | Some("1"))
}

/// Per-document parsing state
struct DocContext<'a, 'input> {
    root: Node<'a, 'input>,
    location: String,
    target_namespace: Option<String>,
    chameleon: bool,
    element_qualified: bool,
    attribute_qualified: bool,
}

struct ArenaBuilder<'a, 'input> {
    schema: Schema,
    limits: Limits,
    docs: Vec<DocContext<'a, 'input>>,
    groups: HashMap<QName, (usize, Node<'a, 'input>)>,
    attribute_groups: HashMap<QName, (usize, Node<'a, 'input>)>,
}

fn build_arena(documents: &[SourceDocument], limits: &Limits) -> Result<Schema> {
    let parsed = documents
        .iter()
        .map(|d| parse_document(&d.text, &d.location))
        .collect::<Result<Vec<_>>>()?;

    let docs = parsed
        .iter()
        .zip(documents)
        .map(|(doc, source)| {
            let root = doc.root_element();
            let own = root.attribute(xsd_attrs::TARGET_NAMESPACE).map(str::to_string);
            DocContext {
                root,
                location: source.location.to_string(),
                chameleon: own.is_none() && source.chameleon.is_some(),
                target_namespace: own.or_else(|| source.chameleon.clone()),
                element_qualified: root.attribute(xsd_attrs::ELEMENT_FORM_DEFAULT) == Some("qualified"),
                attribute_qualified: root.attribute(xsd_attrs::ATTRIBUTE_FORM_DEFAULT)
                    == Some("qualified"),
            }
        })
        .collect::<Vec<_>>();

    let mut builder = ArenaBuilder {
        schema: Schema::new(),
        limits: limits.clone(),
        docs,
        groups: HashMap::new(),
        attribute_groups: HashMap::new(),
    };
    builder.build()?;
    Ok(builder.schema)
}

impl<'a, 'input> ArenaBuilder<'a, 'input> {
    fn build(&mut self) -> Result<()> {
        if let Some(root) = self.docs.first() {
            self.schema.target_namespace = root.target_namespace.clone();
            self.schema.element_form_qualified = root.element_qualified;
            for ns in root.root.namespaces() {
                if let Some(prefix) = ns.name() {
                    self.schema.prefixes.insert(prefix.to_string(), ns.uri().to_string());
                }
            }
        }

        let (types, elements, attributes) = self.declare_globals();

        for (doc, node, id) in types {
            let name = self.schema.type_definition(id).name.clone();
            let definition = match node.tag_name().name() {
                xsd_elements::COMPLEX_TYPE => self.complex_type(doc, node, name)?,
                _ => self.simple_type(doc, node, name)?,
            };
            self.schema.replace_type(id, definition);
        }

        for (doc, node, id) in attributes {
            let type_id = self.attribute_type(doc, node)?;
            let declaration = self.schema.attribute_mut(id);
            declaration.type_id = type_id;
            declaration.default = node.attribute(xsd_attrs::DEFAULT).map(str::to_string);
            declaration.fixed = node.attribute(xsd_attrs::FIXED).map(str::to_string);
        }

        let mut untyped = Vec::new();
        for (doc, node, id) in elements {
            let type_id = self.element_type(doc, node)?;
            let head = match node.attribute(xsd_attrs::SUBSTITUTION_GROUP) {
                Some(value) => {
                    let head_name = self.resolve_qname(doc, node, value)?;
                    let head = self.schema.element_by_name(&head_name);
                    if head.is_none() {
                        warn!(head = %head_name, "unknown substitution group head");
                    }
                    head
                }
                None => None,
            };
            if type_id.is_none() && head.is_some() {
                untyped.push(id);
            }
            let any_type = self.schema.any_type();
            let declaration = self.schema.element_mut(id);
            declaration.type_id = type_id.unwrap_or(any_type);
            declaration.is_abstract = bool_attr(node, xsd_attrs::ABSTRACT);
            declaration.nillable = bool_attr(node, xsd_attrs::NILLABLE);
            declaration.default = node.attribute(xsd_attrs::DEFAULT).map(str::to_string);
            declaration.substitution_head = head;
            if let Some(head) = head {
                self.schema.extend_substitution_group(head, id);
            }
        }

        // members without a type take the type of their head
        let pending: HashSet<ElementId> = untyped.iter().copied().collect();
        for id in untyped {
            let mut current = id;
            let mut hops = 0;
            while pending.contains(&current) && hops <= pending.len() {
                match self.schema.element(current).substitution_head {
                    Some(head) => current = head,
                    None => break,
                }
                hops += 1;
            }
            let type_id = self.schema.element(current).type_id;
            self.schema.element_mut(id).type_id = type_id;
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn declare_globals(
        &mut self,
    ) -> (
        Vec<(usize, Node<'a, 'input>, TypeId)>,
        Vec<(usize, Node<'a, 'input>, ElementId)>,
        Vec<(usize, Node<'a, 'input>, AttributeId)>,
    ) {
        let mut types = Vec::new();
        let mut elements = Vec::new();
        let mut attributes = Vec::new();
        let any_type = self.schema.any_type();

        for index in 0..self.docs.len() {
            let root = self.docs[index].root;
            let namespace = self.docs[index].target_namespace.clone();
            for child in xsd_children(root) {
                let Some(local) = child.attribute(xsd_attrs::NAME) else {
                    continue;
                };
                let name = QName::new(namespace.clone(), local);
                match child.tag_name().name() {
                    xsd_elements::COMPLEX_TYPE | xsd_elements::SIMPLE_TYPE => {
                        let id = self.schema.add_type(TypeDefinition {
                            name: Some(name),
                            base: any_type,
                            derivation: Derivation::Restriction,
                            kind: TypeKind::Simple(SimpleVariety::Atomic),
                        });
                        types.push((index, child, id));
                    }
                    xsd_elements::ELEMENT => {
                        let id = self.schema.add_element(ElementDeclaration::new(name, any_type));
                        elements.push((index, child, id));
                    }
                    xsd_elements::ATTRIBUTE => {
                        let id = self.schema.add_attribute(AttributeDeclaration {
                            name,
                            type_id: any_type,
                            global: true,
                            default: None,
                            fixed: None,
                        });
                        attributes.push((index, child, id));
                    }
                    xsd_elements::GROUP => {
                        self.groups.insert(name, (index, child));
                    }
                    xsd_elements::ATTRIBUTE_GROUP => {
                        self.attribute_groups.insert(name, (index, child));
                    }
                    _ => {}
                }
            }
        }
        (types, elements, attributes)
    }

    fn error(&self, doc: usize, node: Node, message: impl Into<String>) -> Error {
        let component = format!(
            "{} '{}'",
            node.tag_name().name(),
            node.attribute(xsd_attrs::NAME)
                .or_else(|| node.attribute(xsd_attrs::REF))
                .unwrap_or("")
        );
        ParseError::new(message)
            .with_location(self.docs[doc].location.clone())
            .with_component(component)
            .into()
    }

    fn resolve_qname(&self, doc: usize, node: Node, value: &str) -> Result<QName> {
        let (prefix, local) = split_qname(value.trim());
        let namespace = match prefix {
            Some(prefix) => Some(
                node.lookup_namespace_uri(Some(prefix))
                    .ok_or_else(|| Error::Namespace(format!("Unknown prefix: {}", prefix)))?
                    .to_string(),
            ),
            None => node.lookup_namespace_uri(None).map(str::to_string).or_else(|| {
                let ctx = &self.docs[doc];
                if ctx.chameleon {
                    ctx.target_namespace.clone()
                } else {
                    None
                }
            }),
        };
        Ok(QName::new(namespace, local))
    }

    fn resolve_type(&self, doc: usize, node: Node, value: &str) -> Result<TypeId> {
        let name = self.resolve_qname(doc, node, value)?;
        self.schema
            .type_by_name(&name)
            .ok_or(Error::UnresolvedType(name))
    }

    fn element_type(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<Option<TypeId>> {
        if let Some(value) = node.attribute(xsd_attrs::TYPE) {
            return self.resolve_type(doc, node, value).map(Some);
        }
        for child in xsd_children(node) {
            match child.tag_name().name() {
                xsd_elements::COMPLEX_TYPE => {
                    let definition = self.complex_type(doc, child, None)?;
                    return Ok(Some(self.schema.add_type(definition)));
                }
                xsd_elements::SIMPLE_TYPE => {
                    let definition = self.simple_type(doc, child, None)?;
                    return Ok(Some(self.schema.add_type(definition)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn attribute_type(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<TypeId> {
        if let Some(value) = node.attribute(xsd_attrs::TYPE) {
            return self.resolve_type(doc, node, value);
        }
        if let Some(child) = xsd_children(node).find(|c| c.tag_name().name() == xsd_elements::SIMPLE_TYPE) {
            let definition = self.simple_type(doc, child, None)?;
            return Ok(self.schema.add_type(definition));
        }
        let any_simple = QName::namespaced(XSD_NAMESPACE, "anySimpleType");
        Ok(self.schema.type_by_name(&any_simple).unwrap_or_else(|| self.schema.any_type()))
    }

    fn complex_type(&mut self, doc: usize, node: Node<'a, 'input>, name: Option<QName>) -> Result<TypeDefinition> {
        let mut mixed = bool_attr(node, xsd_attrs::MIXED);
        let is_abstract = bool_attr(node, xsd_attrs::ABSTRACT);
        let mut base = self.schema.any_type();
        let mut derivation = Derivation::Restriction;
        let mut content = ContentType::Empty;
        let mut attribute_source = node;

        for child in xsd_children(node) {
            match child.tag_name().name() {
                xsd_elements::SIMPLE_CONTENT | xsd_elements::COMPLEX_CONTENT => {
                    let simple = child.tag_name().name() == xsd_elements::SIMPLE_CONTENT;
                    mixed |= bool_attr(child, xsd_attrs::MIXED);
                    let derived = xsd_children(child)
                        .find(|c| {
                            matches!(c.tag_name().name(), xsd_elements::EXTENSION | xsd_elements::RESTRICTION)
                        })
                        .ok_or_else(|| self.error(doc, node, "content without extension or restriction"))?;
                    let base_name = derived
                        .attribute(xsd_attrs::BASE)
                        .ok_or_else(|| self.error(doc, derived, "derivation without base"))?;
                    base = self.resolve_type(doc, derived, base_name)?;
                    derivation = if derived.tag_name().name() == xsd_elements::EXTENSION {
                        Derivation::Extension
                    } else {
                        Derivation::Restriction
                    };
                    content = if simple {
                        ContentType::Simple(self.schema.simple_content_type(base).unwrap_or(base))
                    } else {
                        match self.model_group_child(doc, derived)? {
                            Some(particle) => ContentType::Element(particle),
                            None => ContentType::Empty,
                        }
                    };
                    attribute_source = derived;
                }
                xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL | xsd_elements::GROUP => {
                    if let Some(particle) = self.particle(doc, child, 0)? {
                        content = ContentType::Element(particle);
                    }
                }
                _ => {}
            }
        }

        let attributes = self.attribute_uses(doc, attribute_source, 0)?;
        Ok(TypeDefinition {
            name,
            base,
            derivation,
            kind: TypeKind::Complex {
                content,
                mixed,
                is_abstract,
                attributes,
            },
        })
    }

    fn model_group_child(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<Option<Particle>> {
        for child in xsd_children(node) {
            if matches!(
                child.tag_name().name(),
                xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL | xsd_elements::GROUP
            ) {
                return self.particle(doc, child, 0);
            }
        }
        Ok(None)
    }

    fn particle(&mut self, doc: usize, node: Node<'a, 'input>, depth: usize) -> Result<Option<Particle>> {
        let occurs = parse_occurs(
            node.attribute(xsd_attrs::MIN_OCCURS),
            node.attribute(xsd_attrs::MAX_OCCURS),
        )
        .map_err(|e| self.error(doc, node, e.to_string()))?;

        let term = match node.tag_name().name() {
            xsd_elements::ELEMENT => Term::Element(self.local_element(doc, node)?),
            xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL => {
                let compositor = match node.tag_name().name() {
                    xsd_elements::SEQUENCE => Compositor::Sequence,
                    xsd_elements::CHOICE => Compositor::Choice,
                    _ => Compositor::All,
                };
                let mut particles = Vec::new();
                for child in xsd_children(node) {
                    if let Some(particle) = self.particle(doc, child, depth)? {
                        particles.push(particle);
                    }
                }
                Term::Group(ModelGroup {
                    compositor,
                    particles,
                })
            }
            xsd_elements::GROUP => {
                self.limits.check_group_depth(depth + 1)?;
                let reference = node
                    .attribute(xsd_attrs::REF)
                    .ok_or_else(|| self.error(doc, node, "local group without ref"))?;
                let name = self.resolve_qname(doc, node, reference)?;
                let (group_doc, group_node) = *self
                    .groups
                    .get(&name)
                    .ok_or_else(|| self.error(doc, node, format!("unknown group {}", name)))?;
                let model = xsd_children(group_node)
                    .find(|c| {
                        matches!(
                            c.tag_name().name(),
                            xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL
                        )
                    })
                    .ok_or_else(|| self.error(group_doc, group_node, "group without model group"))?;
                match self.particle(group_doc, model, depth + 1)? {
                    Some(inner) => inner.term,
                    None => return Ok(None),
                }
            }
            xsd_elements::ANY => Term::Any(self.wildcard(doc, node)),
            _ => return Ok(None),
        };
        Ok(Some(Particle { occurs, term }))
    }

    fn wildcard(&self, doc: usize, node: Node) -> Wildcard {
        let target = self.docs[doc].target_namespace.clone();
        let namespace = match node.attribute(xsd_attrs::NAMESPACE).map(str::trim) {
            None | Some("##any") => WildcardNamespace::Any,
            Some("##other") => WildcardNamespace::Other(target),
            Some(list) => WildcardNamespace::List(
                list.split_whitespace()
                    .map(|token| match token {
                        "##targetNamespace" => target.clone(),
                        "##local" => None,
                        uri => Some(uri.to_string()),
                    })
                    .collect(),
            ),
        };
        Wildcard {
            namespace,
            skip: node.attribute(xsd_attrs::PROCESS_CONTENTS) == Some("skip"),
        }
    }

    fn local_element(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<ElementId> {
        if let Some(reference) = node.attribute(xsd_attrs::REF) {
            let name = self.resolve_qname(doc, node, reference)?;
            let target = self
                .schema
                .element_by_name(&name)
                .ok_or(Error::UnresolvedElement(name))?;
            let resolved = self.schema.element(target);
            let mut declaration = ElementDeclaration::new(resolved.name.clone(), resolved.type_id);
            declaration.global = false;
            declaration.reference = Some(target);
            return Ok(self.schema.add_element(declaration));
        }

        let local = node
            .attribute(xsd_attrs::NAME)
            .ok_or_else(|| self.error(doc, node, "element without name or ref"))?;
        let ctx = &self.docs[doc];
        let qualified = match node.attribute(xsd_attrs::FORM) {
            Some(form) => form == "qualified",
            None => ctx.element_qualified,
        };
        let namespace = if qualified { ctx.target_namespace.clone() } else { None };
        let type_id = match self.element_type(doc, node)? {
            Some(type_id) => type_id,
            None => self.schema.any_type(),
        };

        let mut declaration = ElementDeclaration::new(QName::new(namespace, local), type_id);
        declaration.global = false;
        declaration.qualified = qualified;
        declaration.nillable = bool_attr(node, xsd_attrs::NILLABLE);
        declaration.default = node.attribute(xsd_attrs::DEFAULT).map(str::to_string);
        Ok(self.schema.add_element(declaration))
    }

    fn simple_type(&mut self, doc: usize, node: Node<'a, 'input>, name: Option<QName>) -> Result<TypeDefinition> {
        let any_simple = self
            .schema
            .type_by_name(&QName::namespaced(XSD_NAMESPACE, "anySimpleType"))
            .unwrap_or_else(|| self.schema.any_type());

        for child in xsd_children(node) {
            match child.tag_name().name() {
                xsd_elements::RESTRICTION => {
                    let base = match child.attribute(xsd_attrs::BASE) {
                        Some(value) => self.resolve_type(doc, child, value)?,
                        None => self.inline_simple_type(doc, child)?.unwrap_or(any_simple),
                    };
                    let kind = match &self.schema.type_definition(base).kind {
                        TypeKind::Simple(variety) => TypeKind::Simple(variety.clone()),
                        TypeKind::Complex { .. } => TypeKind::Simple(SimpleVariety::Atomic),
                    };
                    return Ok(TypeDefinition {
                        name,
                        base,
                        derivation: Derivation::Restriction,
                        kind,
                    });
                }
                xsd_elements::LIST => {
                    let item = match child.attribute(xsd_attrs::ITEM_TYPE) {
                        Some(value) => self.resolve_type(doc, child, value)?,
                        None => self
                            .inline_simple_type(doc, child)?
                            .ok_or_else(|| self.error(doc, child, "list without item type"))?,
                    };
                    return Ok(TypeDefinition {
                        name,
                        base: any_simple,
                        derivation: Derivation::Restriction,
                        kind: TypeKind::Simple(SimpleVariety::List(item)),
                    });
                }
                xsd_elements::UNION => {
                    let mut members = Vec::new();
                    if let Some(value) = child.attribute(xsd_attrs::MEMBER_TYPES) {
                        for member in value.split_whitespace() {
                            members.push(self.resolve_type(doc, child, member)?);
                        }
                    }
                    for inline in xsd_children(child) {
                        if inline.tag_name().name() == xsd_elements::SIMPLE_TYPE {
                            let definition = self.simple_type(doc, inline, None)?;
                            members.push(self.schema.add_type(definition));
                        }
                    }
                    return Ok(TypeDefinition {
                        name,
                        base: any_simple,
                        derivation: Derivation::Restriction,
                        kind: TypeKind::Simple(SimpleVariety::Union(members)),
                    });
                }
                _ => {}
            }
        }
        Err(self.error(doc, node, "simple type without restriction, list or union"))
    }

    fn inline_simple_type(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<Option<TypeId>> {
        match xsd_children(node).find(|c| c.tag_name().name() == xsd_elements::SIMPLE_TYPE) {
            Some(child) => {
                let definition = self.simple_type(doc, child, None)?;
                Ok(Some(self.schema.add_type(definition)))
            }
            None => Ok(None),
        }
    }

    fn attribute_uses(&mut self, doc: usize, node: Node<'a, 'input>, depth: usize) -> Result<Vec<AttributeUse>> {
        let mut uses = Vec::new();
        for child in xsd_children(node) {
            match child.tag_name().name() {
                xsd_elements::ATTRIBUTE => {
                    let usage = child.attribute(xsd_attrs::USE).unwrap_or("optional");
                    if usage == "prohibited" {
                        continue;
                    }
                    let attribute = match child.attribute(xsd_attrs::REF) {
                        Some(reference) => {
                            let name = self.resolve_qname(doc, child, reference)?;
                            self.schema
                                .attribute_by_name(&name)
                                .ok_or_else(|| self.error(doc, child, format!("unknown attribute {}", name)))?
                        }
                        None => self.local_attribute(doc, child)?,
                    };
                    uses.push(AttributeUse {
                        attribute,
                        required: usage == "required",
                    });
                }
                xsd_elements::ATTRIBUTE_GROUP => {
                    self.limits.check_group_depth(depth + 1)?;
                    let reference = child
                        .attribute(xsd_attrs::REF)
                        .ok_or_else(|| self.error(doc, child, "local attribute group without ref"))?;
                    let name = self.resolve_qname(doc, child, reference)?;
                    let (group_doc, group_node) = *self
                        .attribute_groups
                        .get(&name)
                        .ok_or_else(|| self.error(doc, child, format!("unknown attribute group {}", name)))?;
                    uses.extend(self.attribute_uses(group_doc, group_node, depth + 1)?);
                }
                xsd_elements::ANY_ATTRIBUTE => {}
                _ => {}
            }
        }
        Ok(uses)
    }

    fn local_attribute(&mut self, doc: usize, node: Node<'a, 'input>) -> Result<AttributeId> {
        let local = node
            .attribute(xsd_attrs::NAME)
            .ok_or_else(|| self.error(doc, node, "attribute without name or ref"))?;
        let ctx = &self.docs[doc];
        let qualified = match node.attribute(xsd_attrs::FORM) {
            Some(form) => form == "qualified",
            None => ctx.attribute_qualified,
        };
        let namespace = if qualified { ctx.target_namespace.clone() } else { None };
        let type_id = self.attribute_type(doc, node)?;
        Ok(self.schema.add_attribute(AttributeDeclaration {
            name: QName::new(namespace, local),
            type_id,
            global: false,
            default: node.attribute(xsd_attrs::DEFAULT).map(str::to_string),
            fixed: node.attribute(xsd_attrs::FIXED).map(str::to_string),
        }))
    }
}
