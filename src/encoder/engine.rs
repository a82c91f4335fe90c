//! Explicit-stack traversal behind [`Encoder`](super::Encoder)

use super::{Diagnostic, DiagnosticKind, Encoder, ResolvedElement};
use crate::binding::{chain_property, Binding, BindingWalker};
use crate::documents::Element;
use crate::error::{Error, Result};
use crate::extract::{BindingPropertyExtractor, ChildProperty, PropertyExtractor, COMMENT};
use crate::names::remove_invalid_xml_chars;
use crate::namespaces::{NamespaceSupport, QName};
use crate::sax::{Attributes, ContentHandler};
use crate::schema::{ElementDeclaration, ElementId, Occurs, Schema, TypeId};
use crate::value::{SingleIter, Value, ValueIter, ValueType, TEXT_KEY};
use crate::{XML_NAMESPACE, XSD_NAMESPACE, XSI_NAMESPACE};
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace, warn};

type Chain = Vec<Arc<dyn Binding>>;

/// Open cursor over the values of one child particle
struct ChildCursor {
    element: ResolvedElement,
    occurs: Occurs,
    iter: Box<dyn ValueIter>,
}

/// One element being encoded
struct EncodingEntry {
    value: Value,
    element: ResolvedElement,
    /// Built element, None until the entry has been opened
    encoding: Option<Element>,
    /// Name as written to the output
    qname: String,
    /// Prefixes declared on this element
    declared: Vec<String>,
    children: VecDeque<ChildCursor>,
}

impl EncodingEntry {
    fn new(value: Value, element: ResolvedElement) -> Self {
        Self {
            value,
            element,
            encoding: None,
            qname: String::new(),
            declared: Vec::new(),
            children: VecDeque::new(),
        }
    }
}

enum Step {
    Next(Value, ResolvedElement, Occurs),
    Exhausted,
    Finished,
}

/// State of a single encode call
pub(super) struct EncodeRun<'e, 'h> {
    encoder: &'e Encoder,
    handler: &'h mut dyn ContentHandler,
    namespaces: NamespaceSupport,
    stack: Vec<EncodingEntry>,
    diagnostics: Vec<Diagnostic>,
    chains: HashMap<(QName, TypeId, bool), Chain>,
    extractors: Vec<Arc<dyn PropertyExtractor>>,
}

impl<'e, 'h> EncodeRun<'e, 'h> {
    pub(super) fn new(encoder: &'e Encoder, handler: &'h mut dyn ContentHandler) -> Self {
        let mut extractors: Vec<Arc<dyn PropertyExtractor>> = vec![Arc::new(BindingPropertyExtractor)];
        extractors.extend(
            encoder
                .context
                .all::<Arc<dyn PropertyExtractor>>()
                .into_iter()
                .map(|extractor| (*extractor).clone()),
        );
        Self {
            encoder,
            handler,
            namespaces: NamespaceSupport::new(),
            stack: Vec::new(),
            diagnostics: Vec::new(),
            chains: HashMap::new(),
            extractors,
        }
    }

    /// Encode `value` as `root`; on failure every open child cursor is closed
    pub(super) fn run(mut self, value: Value, root: ResolvedElement) -> Result<Vec<Diagnostic>> {
        match self.traverse(value, root) {
            Ok(()) => Ok(self.diagnostics),
            Err(err) => {
                self.cleanup();
                Err(err)
            }
        }
    }

    fn traverse(&mut self, value: Value, root: ResolvedElement) -> Result<()> {
        let inline = self.encoder.options.inline;
        if !inline {
            self.handler.start_document()?;
        }
        let root_prefixes = self.setup_namespaces()?;

        self.stack.push(EncodingEntry::new(value, root));
        while let Some(index) = self.stack.len().checked_sub(1) {
            if self.stack[index].encoding.is_none() {
                self.open(index)?;
                continue;
            }

            let step = match self.stack[index].children.front_mut() {
                None => Step::Finished,
                Some(cursor) => match cursor.iter.next_value()? {
                    Some(next) => Step::Next(next, cursor.element.clone(), cursor.occurs),
                    None => Step::Exhausted,
                },
            };
            match step {
                Step::Next(next, element, occurs) => self.child(next, element, occurs)?,
                Step::Exhausted => {
                    if let Some(mut cursor) = self.stack[index].children.pop_front() {
                        cursor.iter.close()?;
                    }
                }
                Step::Finished => self.finish()?,
            }
        }

        for prefix in root_prefixes.iter().rev() {
            self.handler.end_prefix_mapping(prefix)?;
        }
        if !inline {
            self.handler.end_document()?;
        }
        Ok(())
    }

    /// Bind the user and schema prefixes around the root element
    fn setup_namespaces(&mut self) -> Result<Vec<String>> {
        let encoder = self.encoder;
        if !encoder.options.namespace_aware {
            return Ok(Vec::new());
        }

        let mut declared: Vec<(String, String)> = Vec::new();
        for (prefix, uri) in encoder.namespaces.iter() {
            if prefix == "xml" {
                continue;
            }
            declared.push((prefix.to_string(), uri.to_string()));
            self.namespaces.declare_prefix(prefix, uri);
        }
        if let Some(uri) = encoder.namespaces.get_default_namespace() {
            declared.push((String::new(), uri.to_string()));
            self.namespaces.declare_prefix("", uri);
        }

        for (prefix, uri) in encoder.schema.prefixes() {
            if uri == XSD_NAMESPACE || uri == XML_NAMESPACE || prefix == "xml" {
                continue;
            }
            if self.namespaces.prefix(uri).is_some() || self.namespaces.uri(prefix).is_some() {
                continue;
            }
            declared.push((prefix.to_string(), uri.to_string()));
            self.namespaces.declare_prefix(prefix, uri);
        }

        if self.namespaces.uri("").is_none() {
            if let Some(target) = encoder.schema.target_namespace() {
                declared.push((String::new(), target.to_string()));
                self.namespaces.declare_prefix("", target);
            }
        }

        for (prefix, uri) in &declared {
            self.handler.start_prefix_mapping(prefix, uri)?;
        }
        Ok(declared.into_iter().map(|(prefix, _)| prefix).collect())
    }

    /// Build and start the element of the entry at `index`, then open the
    /// cursors over its children
    fn open(&mut self, index: usize) -> Result<()> {
        let value = std::mem::replace(&mut self.stack[index].value, Value::Null);
        let element = self.substitute(&value, self.stack[index].element.clone())?;
        let decl = &element.decl;

        let mut encoding = Element::new(decl.name.clone());
        let mut chain = Vec::new();
        if value.is_null() {
            encoding.set_attribute(QName::namespaced(XSI_NAMESPACE, "nil"), "true");
        } else {
            chain = self.chain(decl)?;
            for binding in &chain {
                binding.encode(&value, &mut encoding)?;
            }
            self.encode_text(&value, decl.type_id, &chain, &mut encoding)?;
            self.encode_attributes(&value, decl.type_id, &chain, &mut encoding)?;
        }
        if index == 0 {
            self.schema_locations(&mut encoding);
        }

        let (qname, declared) = self.start(&encoding, decl.global || decl.qualified)?;
        let children = if value.is_null() {
            VecDeque::new()
        } else {
            self.open_children(&value, &element, &chain, &encoding)?
        };

        let entry = &mut self.stack[index];
        entry.value = value;
        entry.element = element;
        entry.encoding = Some(encoding);
        entry.qname = qname;
        entry.declared = declared;
        entry.children = children;
        Ok(())
    }

    /// Push the next child value, or emit it directly when it is a comment
    /// or a self-encoding fragment
    fn child(&mut self, value: Value, element: ResolvedElement, occurs: Occurs) -> Result<()> {
        if element.decl.name == *COMMENT {
            if let Some(text) = value.to_lexical() {
                self.handler.comment(&remove_invalid_xml_chars(&text))?;
            }
            return Ok(());
        }
        if let Value::Fragment(delegate) = &value {
            return delegate
                .encode(&mut *self.handler)
                .map_err(|err| Error::delegate("Error encoding object to xml-element", err));
        }
        if value.is_null() && !element.decl.nillable {
            if occurs.min > 0 {
                self.required_value_missing(&element.decl.name);
            }
            return Ok(());
        }

        if self.encoder.options.relaxed {
            if let Some(nested) = self.nested_values(&value, &element) {
                trace!(element = %element.decl.name, count = nested.len(), "flattening nested values");
                // reversed so the first nested value is encoded first
                for item in nested.into_iter().rev() {
                    self.push(EncodingEntry::new(item, element.clone()))?;
                }
                return Ok(());
            }
        }
        self.push(EncodingEntry::new(value, element))
    }

    fn push(&mut self, entry: EncodingEntry) -> Result<()> {
        self.encoder.limits.check_xml_depth(self.stack.len() + 1)?;
        self.stack.push(entry);
        Ok(())
    }

    /// Close the top element and pop it
    fn finish(&mut self) -> Result<()> {
        if let Some(entry) = self.stack.pop() {
            if let Some(element) = &entry.encoding {
                self.end(element, &entry.qname, &entry.declared)?;
            }
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        while let Some(mut entry) = self.stack.pop() {
            for mut cursor in entry.children.drain(..) {
                if let Err(err) = cursor.iter.close() {
                    warn!(element = %cursor.element.decl.name, %err, "failed to close child iterator");
                }
            }
        }
    }

    fn chain(&mut self, decl: &ElementDeclaration) -> Result<Chain> {
        let key = (decl.name.clone(), decl.type_id, decl.global);
        if let Some(chain) = self.chains.get(&key) {
            return Ok(chain.clone());
        }
        let encoder = self.encoder;
        let chain = BindingWalker::new(&encoder.schema, &encoder.loader).element_chain(decl, &encoder.context)?;
        self.chains.insert(key, chain.clone());
        Ok(chain)
    }

    fn type_chain(&self, type_id: TypeId) -> Result<Chain> {
        let encoder = self.encoder;
        BindingWalker::new(&encoder.schema, &encoder.loader).type_chain(type_id, &encoder.context)
    }

    /// Replace an abstract element by the substitution group member whose
    /// binding accepts the value
    fn substitute(&mut self, value: &Value, element: ResolvedElement) -> Result<ResolvedElement> {
        if !element.decl.is_abstract || value.is_null() {
            return Ok(element);
        }
        let Some(head) = element.id else {
            return Ok(element);
        };
        let encoder = self.encoder;
        let schema: &Schema = &encoder.schema;

        let mut candidates: Vec<(ElementId, ValueType, Option<i64>)> = Vec::new();
        for member in schema.substitution_group(head) {
            let declaration = schema.element(member);
            if declaration.is_abstract {
                continue;
            }
            let mut binding = encoder.loader.load_binding(&declaration.name, &encoder.context)?;
            if binding.is_none() {
                if let Some(type_name) = schema.type_name(declaration.type_id) {
                    binding = encoder.loader.load_binding(type_name, &encoder.context)?;
                }
            }
            let Some(binding) = binding else {
                continue;
            };
            match binding.value_type() {
                Some(value_type) if value_type.is_assignable_from(value) => {
                    candidates.push((member, value_type, binding.ordering()));
                }
                Some(_) => {}
                None => trace!(member = %declaration.name, "binding declares no value type"),
            }
        }

        if candidates.len() > 1 {
            candidates.sort_by_key(|(member, value_type, ordering)| {
                (
                    Reverse(value_type.specificity()),
                    ordering.unwrap_or(i64::MAX),
                    schema.element(*member).name.to_string(),
                )
            });
            debug!(
                element = %element.decl.name,
                count = candidates.len(),
                picked = %schema.element(candidates[0].0).name,
                "several substitution group members match, using the most specific"
            );
        }
        match candidates.first() {
            Some((member, _, _)) => Ok(ResolvedElement {
                id: Some(*member),
                decl: schema.element(*member).clone(),
            }),
            None => {
                debug!(element = %element.decl.name, "no substitution group member matches the value");
                self.diagnostics.push(Diagnostic {
                    element: element.decl.name.clone(),
                    kind: DiagnosticKind::AbstractElementKept,
                    message: "no substitution group member matches the value".to_string(),
                });
                Ok(element)
            }
        }
    }

    /// Text content for simple, simple-content and mixed types
    fn encode_text(&self, value: &Value, type_id: TypeId, chain: &[Arc<dyn Binding>], encoding: &mut Element) -> Result<()> {
        if encoding.text.is_some() {
            return Ok(());
        }
        let schema = &self.encoder.schema;
        let simple = schema.simple_content_type(type_id);
        if simple.is_none() && !schema.type_definition(type_id).is_mixed() {
            return Ok(());
        }

        let text = match simple.and_then(|simple| schema.list_item_type(simple)) {
            Some(item_type) => self.list_text(value, item_type)?,
            None => fold_text(chain, value)?,
        };
        if let Some(text) = text {
            encoding.set_text(text);
        }
        Ok(())
    }

    /// Space separated items, each through the item type's chain
    fn list_text(&self, value: &Value, item_type: TypeId) -> Result<Option<String>> {
        let items = match value.simple_content() {
            Value::Null => return Ok(None),
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        };
        let chain = self.type_chain(item_type)?;
        let mut parts = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(text) = fold_text(&chain, item)? {
                parts.push(text);
            }
        }
        Ok(Some(parts.join(" ")))
    }

    /// Attributes the bindings did not set themselves
    fn encode_attributes(&self, value: &Value, type_id: TypeId, chain: &[Arc<dyn Binding>], encoding: &mut Element) -> Result<()> {
        let schema = &self.encoder.schema;
        for id in schema.attribute_declarations(type_id, true) {
            let attribute = schema.attribute(id);
            if encoding.has_attribute_value(&attribute.name) {
                continue;
            }
            let Some(property) = chain_property(chain, value, &attribute.name)? else {
                continue;
            };
            if property.is_null() {
                continue;
            }
            let text = match schema.list_item_type(attribute.type_id) {
                Some(item_type) => self.list_text(&property, item_type)?,
                None => fold_text(&self.type_chain(attribute.type_id)?, &property)?,
            };
            if let Some(text) = text {
                encoding.set_attribute(attribute.name.clone(), text);
            }
        }
        Ok(())
    }

    fn schema_locations(&self, encoding: &mut Element) {
        let locations = &self.encoder.options.schema_locations;
        if locations.is_empty() {
            return;
        }
        let pairs: Vec<String> = locations
            .iter()
            .map(|(namespace, location)| format!("{} {}", namespace, location))
            .collect();
        encoding.set_attribute(QName::namespaced(XSI_NAMESPACE, "schemaLocation"), pairs.join(" "));
    }

    /// Write the start tag, text and prebuilt children of `element`;
    /// returns the written name and the prefixes declared on it
    fn start(&mut self, element: &Element, qualified: bool) -> Result<(String, Vec<String>)> {
        let namespace_aware = self.encoder.options.namespace_aware;
        self.namespaces.push_context();
        let mut declared = Vec::new();

        let uri = element.namespace().unwrap_or("");
        let local = element.local_name();
        let qname = if namespace_aware {
            self.element_qname(uri, local, element.prefix.as_deref(), qualified, &mut declared)
        } else {
            local.to_string()
        };

        let mut attributes = Attributes::new();
        for (name, text) in &element.attributes {
            let attribute_qname = match name.namespace.as_deref() {
                Some(namespace) if namespace_aware && !namespace.is_empty() => {
                    let hint = (namespace == XSI_NAMESPACE).then_some("xsi");
                    let prefix = self.bind_prefix(namespace, hint, &mut declared);
                    format!("{}:{}", prefix, name.local_name)
                }
                _ => name.local_name.clone(),
            };
            attributes.push(
                name.namespace_str(),
                &name.local_name,
                &attribute_qname,
                &remove_invalid_xml_chars(text),
            );
        }

        for prefix in &declared {
            let bound = self.namespaces.uri(prefix).unwrap_or("").to_string();
            self.handler.start_prefix_mapping(prefix, &bound)?;
        }
        self.handler.start_element(uri, local, &qname, &attributes)?;
        if let Some(text) = &element.text {
            self.handler.characters(&remove_invalid_xml_chars(text))?;
        }
        for child in &element.children {
            let (child_qname, child_declared) = self.start(child, child.namespace().is_some())?;
            self.end(child, &child_qname, &child_declared)?;
        }
        Ok((qname, declared))
    }

    fn end(&mut self, element: &Element, qname: &str, declared: &[String]) -> Result<()> {
        self.handler
            .end_element(element.namespace().unwrap_or(""), element.local_name(), qname)?;
        for prefix in declared.iter().rev() {
            self.handler.end_prefix_mapping(prefix)?;
        }
        self.namespaces.pop_context();
        Ok(())
    }

    /// Written name of an element, declaring whatever binding it needs in
    /// the current scope
    fn element_qname(
        &mut self,
        uri: &str,
        local: &str,
        preferred: Option<&str>,
        qualified: bool,
        declared: &mut Vec<String>,
    ) -> String {
        if uri.is_empty() {
            if self.namespaces.uri("").map_or(false, |default| !default.is_empty()) {
                self.namespaces.declare_prefix("", "");
                declared.push(String::new());
            }
            return local.to_string();
        }
        if qualified {
            if let Some(prefix) = self.namespaces.prefix(uri) {
                return format!("{}:{}", prefix, local);
            }
        }
        if self.namespaces.uri("") == Some(uri) {
            return local.to_string();
        }
        let prefix = self.bind_prefix(uri, preferred, declared);
        format!("{}:{}", prefix, local)
    }

    /// A prefix bound to `uri`, declaring a new one when none is visible
    fn bind_prefix(&mut self, uri: &str, hint: Option<&str>, declared: &mut Vec<String>) -> String {
        if let Some(prefix) = self.namespaces.prefix(uri) {
            return prefix.to_string();
        }
        let prefix = self.namespaces.generate_prefix(hint);
        self.namespaces.declare_prefix(&prefix, uri);
        declared.push(prefix.clone());
        prefix
    }

    /// Cursors over the children of an opened element
    fn open_children(
        &mut self,
        value: &Value,
        element: &ResolvedElement,
        chain: &[Arc<dyn Binding>],
        encoding: &Element,
    ) -> Result<VecDeque<ChildCursor>> {
        let mut properties: Vec<ChildProperty> = Vec::new();
        for extractor in &self.extractors {
            if extractor.can_handle(value) {
                properties.extend(extractor.properties(value, &element.decl, &self.encoder.schema, chain)?);
            }
        }

        let mut children = VecDeque::new();
        for property in properties {
            if let Err(err) = self.open_child(property, encoding, &mut children) {
                close_all(&mut children);
                return Err(err);
            }
        }
        Ok(children)
    }

    fn open_child(&mut self, property: ChildProperty, encoding: &Element, children: &mut VecDeque<ChildCursor>) -> Result<()> {
        let name = property.name().clone();
        if name != *COMMENT && encoding.has_child(&name) {
            trace!(%name, "child already built by a binding");
            return Ok(());
        }
        if property.value.is_null() {
            if property.occurs.min == 0 || name == *COMMENT {
                return Ok(());
            }
            if !property.declaration.nillable {
                self.required_value_missing(&name);
                return Ok(());
            }
        }

        let schema = &self.encoder.schema;
        let element = ResolvedElement {
            id: property.element.map(|id| schema.resolved_element(id)),
            decl: property.declaration,
        };
        let iter: Box<dyn ValueIter> = if property.value.is_null() {
            Box::new(SingleIter::new(Value::Null))
        } else {
            property.value.into_cursor(property.occurs.is_multiple())?
        };
        children.push_back(ChildCursor {
            element,
            occurs: property.occurs,
            iter,
        });
        Ok(())
    }

    fn required_value_missing(&mut self, name: &QName) {
        warn!(element = %name, "required element has no value and is not nillable, skipping");
        self.diagnostics.push(Diagnostic {
            element: name.clone(),
            kind: DiagnosticKind::RequiredValueMissing,
            message: "required element has no value and is not nillable".to_string(),
        });
    }

    /// Values nested in a container of their own class, when the schema
    /// does not expect that nesting
    fn nested_values(&self, value: &Value, element: &ResolvedElement) -> Option<Vec<Value>> {
        let class = value.class()?;
        let nested: Vec<Value> = match value {
            Value::Record(record) => record
                .fields()
                .filter(|(name, _)| *name != TEXT_KEY)
                .map(|(_, field)| field.clone())
                .collect(),
            Value::Object(object) => object.properties().into_iter().map(|(_, field)| field).collect(),
            _ => return None,
        };
        let same_class = |item: &Value| item.class().map_or(false, |c| c.name() == class.name());
        if nested.is_empty() || !nested.iter().all(same_class) {
            return None;
        }

        let schema = &self.encoder.schema;
        let expected = schema
            .child_element_particles(element.decl.type_id, true)
            .into_iter()
            .filter(|particle| schema.element(particle.element).reference.is_some())
            .any(|particle| {
                let resolved = schema.element(schema.resolved_element(particle.element));
                schema.type_name(resolved.type_id) == Some(class.name())
            });
        if expected {
            return None;
        }
        Some(nested)
    }
}

/// Run `encode_text` over a chain, general to specific
fn fold_text(chain: &[Arc<dyn Binding>], value: &Value) -> Result<Option<String>> {
    chain
        .iter()
        .try_fold(None, |text, binding| binding.encode_text(value, text))
}

fn close_all(children: &mut VecDeque<ChildCursor>) {
    for mut cursor in children.drain(..) {
        if let Err(err) = cursor.iter.close() {
            warn!(element = %cursor.element.decl.name, %err, "failed to close child iterator");
        }
    }
}
