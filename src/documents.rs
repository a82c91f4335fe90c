//! XML document trees
//!
//! [`Element`] is the unit bindings populate during encoding: the encoder
//! asks each binding in a chain to fill in attributes, text, or prebuilt
//! children before the element is written. [`Document`] holds a parsed or
//! encoded tree; [`DomBuilder`] assembles one from document events.

use crate::error::{Error, Result};
use crate::namespaces::{NamespaceContext, QName};
use crate::sax::{Attributes, ContentHandler};
use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

/// XML Element in the document tree
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element qualified name
    pub qname: QName,
    /// Preferred prefix, if a binding or the source document chose one
    pub prefix: Option<String>,
    /// Element attributes in document order
    pub attributes: IndexMap<QName, String>,
    /// Text content (if any)
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
    /// Namespace declarations made on this element
    pub namespaces: NamespaceContext,
}

impl Element {
    /// Create a new element
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            prefix: None,
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
            namespaces: NamespaceContext::new(),
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.qname.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.qname.namespace.as_deref()
    }

    /// Get an attribute value by local name, ignoring namespaces
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(qname, _)| qname.local_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// Get an attribute value by qualified name
    pub fn get_attribute_qname(&self, qname: &QName) -> Option<&str> {
        self.attributes.get(qname).map(|s| s.as_str())
    }

    /// True when the attribute is present with a non-empty value
    pub fn has_attribute_value(&self, qname: &QName) -> bool {
        self.get_attribute_qname(qname)
            .map_or(false, |value| !value.is_empty())
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, qname: QName, value: impl Into<String>) {
        self.attributes.insert(qname, value.into());
    }

    /// Add a child element
    pub fn add_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Set text content
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    /// True when a child with this name has already been built
    pub fn has_child(&self, qname: &QName) -> bool {
        self.children.iter().any(|child| match &qname.namespace {
            Some(_) => child.qname == *qname,
            None => child.qname.local_name == qname.local_name,
        })
    }

    /// Find child elements by local name
    pub fn find_children(&self, local_name: &str) -> Vec<&Element> {
        self.children
            .iter()
            .filter(|e| e.local_name() == local_name)
            .collect()
    }
}

/// XML Document representation
#[derive(Debug, Default)]
pub struct Document {
    /// Root element of the document
    pub root: Option<Element>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a namespace-aware XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.trim_text(true);

        let mut doc = Document::new();
        let mut element_stack: Vec<Element> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let element = Self::parse_element(&e, &reader)?;
                    element_stack.push(element);
                }
                Event::End(_) => {
                    if let Some(current) = element_stack.pop() {
                        Self::attach(&mut doc, &mut element_stack, current);
                    }
                }
                Event::Empty(e) => {
                    let element = Self::parse_element(&e, &reader)?;
                    Self::attach(&mut doc, &mut element_stack, element);
                }
                Event::Text(e) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = e.unescape()?;
                        if !text.trim().is_empty() {
                            let mut joined = current.text.take().unwrap_or_default();
                            joined.push_str(&text);
                            current.set_text(joined);
                        }
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                        let mut joined = current.text.take().unwrap_or_default();
                        joined.push_str(&text);
                        current.set_text(joined);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !element_stack.is_empty() {
            return Err(Error::Xml("unexpected end of document".to_string()));
        }
        Ok(doc)
    }

    fn attach(doc: &mut Document, stack: &mut [Element], element: Element) {
        match stack.last_mut() {
            Some(parent) => parent.add_child(element),
            None => doc.root = Some(element),
        }
    }

    fn parse_element(start: &BytesStart, reader: &NsReader<&[u8]>) -> Result<Element> {
        let (ns, local) = reader.resolve_element(start.name());
        let qname = QName::new(
            resolved_namespace(ns)?,
            String::from_utf8_lossy(local.as_ref()).to_string(),
        );

        let mut element = Element::new(qname);
        element.prefix = start
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).to_string());

        for attr_result in start.attributes() {
            let attr =
                attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
            let raw_name = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr.unescape_value()?.to_string();

            if raw_name == "xmlns" {
                element.namespaces.set_default_namespace(value);
            } else if let Some(prefix) = raw_name.strip_prefix("xmlns:") {
                element.namespaces.add_prefix(prefix, value);
            } else {
                let (ns, local) = reader.resolve_attribute(attr.key);
                let attr_name = QName::new(
                    resolved_namespace(ns)?,
                    String::from_utf8_lossy(local.as_ref()).to_string(),
                );
                element.attributes.insert(attr_name, value);
            }
        }

        Ok(element)
    }

    /// Get the root element
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }
}

/// Convert a reader namespace resolution into an owned URI
pub(crate) fn resolved_namespace(result: ResolveResult<'_>) -> Result<Option<String>> {
    match result {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.as_ref()).to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(Error::Namespace(format!(
            "Unknown prefix: {}",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// Handler assembling a [`Document`] from document events
#[derive(Debug, Default)]
pub struct DomBuilder {
    stack: Vec<Element>,
    pending: NamespaceContext,
    document: Document,
}

impl DomBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished document
    pub fn into_document(self) -> Document {
        self.document
    }
}

impl ContentHandler for DomBuilder {
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.pending.add_prefix(prefix, uri);
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn start_element(
        &mut self,
        uri: &str,
        local: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        let mut element = Element::new(QName::new(Some(uri), local));
        element.prefix = qname.split_once(':').map(|(p, _)| p.to_string());
        element.namespaces = std::mem::take(&mut self.pending);
        for attribute in attributes.iter() {
            element.set_attribute(
                QName::new(Some(attribute.uri.as_str()), attribute.local.as_str()),
                attribute.value.as_str(),
            );
        }
        self.stack.push(element);
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if let Some(current) = self.stack.last_mut() {
            let mut joined = current.text.take().unwrap_or_default();
            joined.push_str(text);
            current.set_text(joined);
        }
        Ok(())
    }

    fn end_element(&mut self, _uri: &str, _local: &str, qname: &str) -> Result<()> {
        let element = self
            .stack
            .pop()
            .ok_or_else(|| Error::Encode(format!("unbalanced end tag '{}'", qname)))?;
        Document::attach(&mut self.document, &mut self.stack, element);
        Ok(())
    }
}
