//! XML to object decoding
//!
//! [`Decoder`] streams a document with `quick_xml`, resolves each element
//! against the schema and runs the element's binding chain over a [`Node`]
//! once the element is closed. Children are decoded before their parent, so
//! a parent's bindings see fully parsed child values.

pub mod node;

pub use node::{ChildNode, Node};

use crate::binding::{Binding, BindingLoader, BindingWalker};
use crate::config::{Configuration, ParserProperty};
use crate::context::Context;
use crate::documents::resolved_namespace;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::QName;
use crate::schema::{ElementDeclaration, ElementId, Schema, TypeId};
use crate::value::Value;
use crate::XSI_NAMESPACE;
use quick_xml::events::{BytesStart, Event};
use quick_xml::NsReader;
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, trace};

/// Decodes XML documents into values
pub struct Decoder {
    configuration: Arc<Configuration>,
    schema: Arc<Schema>,
    loader: BindingLoader,
    context: Arc<Context>,
    limits: Limits,
}

impl Decoder {
    /// Create a decoder for the schema and bindings of `configuration`
    pub fn new(configuration: Arc<Configuration>) -> Result<Self> {
        let schema = configuration.schema()?;
        let loader = BindingLoader::new(configuration.binding_map()?);
        let context = Arc::new(configuration.context()?);
        Ok(Self {
            limits: configuration.loader().limits().clone(),
            configuration,
            schema,
            loader,
            context,
        })
    }

    /// Replace the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Schema in use
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Decode a document held in memory
    pub fn parse(&self, xml: &str) -> Result<Value> {
        self.limits.check_xml_size(xml.len())?;
        self.parse_reader(xml.as_bytes())
    }

    /// Decode a document from a reader
    pub fn parse_reader<R: BufRead>(&self, input: R) -> Result<Value> {
        self.decode(input).map(|(_, value)| value)
    }

    /// Decode a document, returning the root element name with the value
    pub fn decode<R: BufRead>(&self, input: R) -> Result<(QName, Value)> {
        let mut reader = NsReader::from_reader(input);
        reader.trim_text(false);
        let mut run = DecodeRun {
            decoder: self,
            stack: Vec::new(),
            skipping: 0,
            result: None,
        };

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(start) => run.start(&reader, &start)?,
                Event::Empty(start) => {
                    run.start(&reader, &start)?;
                    run.end()?;
                }
                Event::End(_) => run.end()?,
                Event::Text(text) => run.text(&text.unescape()?),
                Event::CData(data) => run.text(&String::from_utf8_lossy(&data.into_inner())),
                Event::Comment(comment) => run.comment(&comment.unescape()?),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !run.stack.is_empty() {
            return Err(Error::Xml("unexpected end of document".to_string()));
        }
        run.result
            .ok_or_else(|| Error::Decode("document has no root element".to_string()))
    }

    fn walker(&self) -> BindingWalker<'_> {
        BindingWalker::new(&self.schema, &self.loader)
    }

    /// Parse lexical `text` as a value of the simple type `type_id`
    fn parse_simple(&self, name: &QName, type_id: TypeId, text: String) -> Result<Value> {
        if let Some(item_type) = self.schema.list_item_type(type_id) {
            let items = text
                .split_whitespace()
                .map(|item| self.parse_simple(name, item_type, item.to_string()))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::List(items));
        }
        let mut node = Node::new(name.clone());
        node.type_name = self.schema.type_name(type_id).cloned();
        node.text = Some(text.clone());
        let chain = self.walker().type_chain(type_id, &self.context)?;
        run_parse(&chain, &node, Value::String(text))
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("namespace", &self.configuration.namespace())
            .finish()
    }
}

/// An element being decoded
struct Frame {
    type_id: TypeId,
    multiple: bool,
    node: Node,
    text: String,
    chain: Vec<Arc<dyn Binding>>,
    context: Arc<Context>,
}

struct DecodeRun<'d> {
    decoder: &'d Decoder,
    stack: Vec<Frame>,
    /// Depth inside an element that is being skipped
    skipping: usize,
    result: Option<(QName, Value)>,
}

impl DecodeRun<'_> {
    fn start<R>(&mut self, reader: &NsReader<R>, start: &BytesStart<'_>) -> Result<()> {
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        let decoder = self.decoder;
        let schema = &decoder.schema;
        decoder.limits.check_xml_depth(self.stack.len() + 1)?;

        let (namespace, local) = reader.resolve_element(start.name());
        let name = QName::new(
            resolved_namespace(namespace)?,
            String::from_utf8_lossy(local.as_ref()).to_string(),
        );
        let Some((declaration, multiple)) = self.declaration(&name)? else {
            debug!(%name, "skipping undeclared element");
            self.skipping = 1;
            return Ok(());
        };

        let mut node = Node::new(name);
        let mut type_id = declaration.type_id;
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute =
                attribute.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
            let key = attribute.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let (namespace, local) = reader.resolve_attribute(attribute.key);
            let attribute_name = QName::new(
                resolved_namespace(namespace)?,
                String::from_utf8_lossy(local.as_ref()).to_string(),
            );
            let text = attribute.unescape_value()?.into_owned();
            if attribute_name.namespace.as_deref() == Some(XSI_NAMESPACE) {
                match attribute_name.local_name.as_str() {
                    "nil" => node.nil = matches!(text.trim(), "true" | "1"),
                    "type" => type_id = xsi_type(reader, schema, &text)?,
                    _ => {}
                }
                continue;
            }
            attributes.push((attribute_name, text));
        }
        decoder.limits.check_attributes(attributes.len())?;

        node.type_name = schema.type_name(type_id).cloned();
        for (attribute_name, text) in attributes {
            if let Some(value) = self.attribute_value(type_id, &attribute_name, text)? {
                node.attributes.insert(attribute_name, value);
            }
        }

        let chain = decoder
            .walker()
            .chain(Some(&declaration), type_id, &decoder.context)?;
        let parent = self
            .stack
            .last()
            .map_or_else(|| decoder.context.clone(), |frame| frame.context.clone());
        let mut context = Context::child(parent);
        for binding in &chain {
            binding.initialize(&node, &mut context)?;
        }

        self.stack.push(Frame {
            type_id,
            multiple,
            node,
            text: String::new(),
            chain,
            context: Arc::new(context),
        });
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        let mut frame = self
            .stack
            .pop()
            .ok_or_else(|| Error::Xml("unexpected end tag".to_string()))?;
        let decoder = self.decoder;
        let schema = &decoder.schema;

        let simple = schema.simple_content_type(frame.type_id);
        let text = std::mem::take(&mut frame.text);
        frame.node.text = match simple {
            Some(_) if !text.is_empty() => Some(text),
            None if !text.trim().is_empty() => Some(text),
            _ => None,
        };

        let value = if frame.node.nil {
            Value::Null
        } else {
            let text = frame.node.text.clone().unwrap_or_default();
            let initial = match simple {
                // list content is split and parsed item by item
                Some(simple) if schema.list_item_type(simple).is_some() => {
                    decoder.parse_simple(&frame.node.name, simple, text)?
                }
                Some(_) => Value::String(text),
                None => Value::Null,
            };
            run_parse(&frame.chain, &frame.node, initial)?
        };

        let name = frame.node.name;
        match self.stack.last_mut() {
            Some(parent) => parent.node.children.push(ChildNode {
                name,
                value,
                multiple: frame.multiple,
            }),
            None => self.result = Some((name, value)),
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if self.skipping > 0 {
            return;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(text);
        }
    }

    fn comment(&mut self, text: &str) {
        if self.skipping > 0 {
            return;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.node.comments.push(text.trim().to_string());
        }
    }

    /// Declaration of an element found at the current position and whether
    /// its particle repeats; None when the element should be skipped
    fn declaration(&self, name: &QName) -> Result<Option<(ElementDeclaration, bool)>> {
        let decoder = self.decoder;
        let schema = &decoder.schema;
        let parse_unknown = decoder
            .configuration
            .has_property(ParserProperty::ParseUnknownElements);

        let Some(parent) = self.stack.last() else {
            return match schema.element_by_name(name) {
                Some(id) => Ok(Some((schema.element(schema.resolved_element(id)).clone(), false))),
                None if parse_unknown => Ok(Some((open_declaration(schema, name), false))),
                None => Err(Error::UnresolvedElement(name.clone())),
            };
        };

        if let Some(id) = schema.child_element_declaration(parent.type_id, name) {
            let multiple = particle_repeats(schema, parent.type_id, id);
            return Ok(Some((schema.element(id).clone(), multiple)));
        }
        if let Some(any) = schema
            .any_element_particles(parent.type_id)
            .into_iter()
            .find(|any| any.wildcard.allows(name))
        {
            return Ok(Some((open_declaration(schema, name), any.occurs.is_multiple())));
        }
        if parent.type_id == TypeId::ANY_TYPE || parse_unknown {
            return Ok(Some((open_declaration(schema, name), false)));
        }
        Ok(None)
    }

    fn attribute_value(&self, type_id: TypeId, name: &QName, text: String) -> Result<Option<Value>> {
        let decoder = self.decoder;
        let schema = &decoder.schema;
        let declared = schema
            .attribute_declarations(type_id, true)
            .into_iter()
            .map(|id| schema.attribute(id))
            .find(|attribute| attribute.name == *name);
        match declared {
            Some(attribute) => decoder.parse_simple(name, attribute.type_id, text).map(Some),
            None if decoder
                .configuration
                .has_property(ParserProperty::ParseUnknownAttributes) =>
            {
                Ok(Some(Value::String(text)))
            }
            None => {
                trace!(attribute = %name, "ignoring undeclared attribute");
                Ok(None)
            }
        }
    }
}

/// Thread `value` through the parse hook of every binding, general first
fn run_parse(chain: &[Arc<dyn Binding>], node: &Node, value: Value) -> Result<Value> {
    chain
        .iter()
        .try_fold(value, |value, binding| binding.parse(node, value))
}

/// Global declaration of `name`, else a local `xs:anyType` declaration
fn open_declaration(schema: &Schema, name: &QName) -> ElementDeclaration {
    match schema.element_by_name(name) {
        Some(id) => schema.element(schema.resolved_element(id)).clone(),
        None => ElementDeclaration {
            global: false,
            ..ElementDeclaration::new(name.clone(), TypeId::ANY_TYPE)
        },
    }
}

fn particle_repeats(schema: &Schema, parent_type: TypeId, element: ElementId) -> bool {
    schema
        .child_element_particles(parent_type, true)
        .into_iter()
        .find(|particle| {
            let resolved = schema.resolved_element(particle.element);
            resolved == element || schema.substitution_group(resolved).contains(&element)
        })
        .map_or(false, |particle| particle.occurs.is_multiple())
}

fn xsi_type<R>(reader: &NsReader<R>, schema: &Schema, text: &str) -> Result<TypeId> {
    let (namespace, local) = reader.resolve_element(quick_xml::name::QName(text.trim().as_bytes()));
    let type_name = QName::new(
        resolved_namespace(namespace)?,
        String::from_utf8_lossy(local.as_ref()).to_string(),
    );
    schema
        .type_by_name(&type_name)
        .ok_or(Error::UnresolvedType(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locations::Location;
    use crate::value::Record;

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns:t="urn:test" targetNamespace="urn:test" elementFormDefault="qualified">
      <xs:simpleType name="Codes">
        <xs:list itemType="xs:int"/>
      </xs:simpleType>
      <xs:complexType name="RootType">
        <xs:sequence>
          <xs:element name="Item" type="xs:string" maxOccurs="unbounded"/>
          <xs:element name="Count" type="xs:int" minOccurs="0" nillable="true"/>
          <xs:element name="Codes" type="t:Codes" minOccurs="0"/>
        </xs:sequence>
        <xs:attribute name="id" type="xs:string"/>
        <xs:attribute name="flag" type="xs:boolean"/>
      </xs:complexType>
      <xs:element name="Root" type="t:RootType"/>
    </xs:schema>"#;

    fn decoder(configure: impl FnOnce(Configuration) -> Configuration) -> Decoder {
        let configuration = Configuration::new("urn:test").with_schema(Location::inline("test.xsd", XSD));
        Decoder::new(Arc::new(configure(configuration))).unwrap()
    }

    fn record(value: &Value) -> &Record {
        value.as_record().unwrap()
    }

    #[test]
    fn test_decode_record() {
        let decoder = decoder(|c| c);
        let value = decoder
            .parse(r#"<t:Root xmlns:t="urn:test" id="A1" flag="true"><t:Item>x</t:Item><t:Item>y</t:Item><t:Count>3</t:Count></t:Root>"#)
            .unwrap();

        let root = record(&value);
        assert_eq!(root.class().name(), &QName::namespaced("urn:test", "RootType"));
        assert_eq!(root.get("id"), Some(&Value::String("A1".into())));
        assert_eq!(root.get("flag"), Some(&Value::Bool(true)));
        assert_eq!(root.get("Item"), Some(&Value::List(vec!["x".into(), "y".into()])));
        assert_eq!(root.get("Count"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_single_occurrence_of_repeating_particle_is_a_list() {
        let decoder = decoder(|c| c);
        let value = decoder
            .parse(r#"<Root xmlns="urn:test"><Item>x</Item></Root>"#)
            .unwrap();
        assert_eq!(record(&value).get("Item"), Some(&Value::List(vec!["x".into()])));
    }

    #[test]
    fn test_list_type_is_split() {
        let decoder = decoder(|c| c);
        let value = decoder
            .parse(r#"<Root xmlns="urn:test"><Item>x</Item><Codes> 1 2  3 </Codes></Root>"#)
            .unwrap();
        assert_eq!(
            record(&value).get("Codes"),
            Some(&Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]))
        );
    }

    #[test]
    fn test_nil_element() {
        let decoder = decoder(|c| c);
        let value = decoder
            .parse(r#"<Root xmlns="urn:test" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><Item>x</Item><Count xsi:nil="true"/></Root>"#)
            .unwrap();
        assert_eq!(record(&value).get("Count"), Some(&Value::Null));
    }

    #[test]
    fn test_unknown_elements_follow_the_parser_property() {
        let xml = r#"<Root xmlns="urn:test" extra="e"><Item>x</Item><Other>o</Other></Root>"#;

        let strict = decoder(|c| c).parse(xml).unwrap();
        assert!(record(&strict).get("Other").is_none());
        assert!(record(&strict).get("extra").is_none());

        let lenient = decoder(|c| {
            c.with_property(ParserProperty::ParseUnknownElements)
                .with_property(ParserProperty::ParseUnknownAttributes)
        })
        .parse(xml)
        .unwrap();
        assert_eq!(record(&lenient).get("Other"), Some(&Value::String("o".into())));
        assert_eq!(record(&lenient).get("extra"), Some(&Value::String("e".into())));
    }

    #[test]
    fn test_unknown_root_is_an_error() {
        let decoder = decoder(|c| c);
        assert!(matches!(
            decoder.parse(r#"<Nope xmlns="urn:test"/>"#),
            Err(Error::UnresolvedElement(_))
        ));
    }

    #[test]
    fn test_invalid_value_propagates_binding_error() {
        let decoder = decoder(|c| c);
        let result = decoder.parse(r#"<Root xmlns="urn:test"><Item>x</Item><Count>many</Count></Root>"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_depth_limit() {
        let decoder = decoder(|c| c).with_limits(Limits {
            max_xml_depth: 1,
            ..Limits::default()
        });
        let result = decoder.parse(r#"<Root xmlns="urn:test"><Item>x</Item></Root>"#);
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }
}
