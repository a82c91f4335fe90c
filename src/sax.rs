//! SAX-style output events
//!
//! The encoder drives a [`ContentHandler`]; the serializer, the DOM builder
//! and the test recorder all sit behind it.

use crate::error::{Error, Result};
use crate::names;

/// One attribute of a start-element event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Namespace URI, empty when unqualified
    pub uri: String,
    /// Local name
    pub local: String,
    /// Prefixed name as written
    pub qname: String,
    /// Attribute value
    pub value: String,
}

/// Ordered attribute list passed with start-element events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    items: Vec<Attribute>,
}

impl Attributes {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute
    pub fn push(&mut self, uri: &str, local: &str, qname: &str, value: &str) {
        self.items.push(Attribute {
            uri: uri.to_string(),
            local: local.to_string(),
            qname: qname.to_string(),
            value: value.to_string(),
        });
    }

    /// Look up an attribute value by namespace and local name
    pub fn value(&self, uri: &str, local: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|a| a.uri == uri && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Iterate in order
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.items.iter()
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when there are no attributes
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Receiver of document events
pub trait ContentHandler {
    /// Document start
    fn start_document(&mut self) -> Result<()>;

    /// Document end
    fn end_document(&mut self) -> Result<()>;

    /// A prefix becomes bound for the next element and its descendants
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()>;

    /// A prefix binding goes out of scope
    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()>;

    /// Element start
    fn start_element(&mut self, uri: &str, local: &str, qname: &str, attributes: &Attributes)
        -> Result<()>;

    /// Character data
    fn characters(&mut self, text: &str) -> Result<()>;

    /// Element end
    fn end_element(&mut self, uri: &str, local: &str, qname: &str) -> Result<()>;

    /// Comment (lexical event); ignored unless the handler cares
    fn comment(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// A recorded document event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaxEvent {
    /// `start_document`
    StartDocument,
    /// `end_document`
    EndDocument,
    /// `start_prefix_mapping`
    StartPrefixMapping(String, String),
    /// `end_prefix_mapping`
    EndPrefixMapping(String),
    /// `start_element`
    StartElement {
        /// Namespace URI
        uri: String,
        /// Local name
        local: String,
        /// Prefixed name
        qname: String,
        /// Attributes
        attributes: Attributes,
    },
    /// `characters`
    Characters(String),
    /// `end_element`
    EndElement {
        /// Namespace URI
        uri: String,
        /// Local name
        local: String,
        /// Prefixed name
        qname: String,
    },
    /// `comment`
    Comment(String),
}

/// Handler that records every event
#[derive(Debug, Default)]
pub struct EventRecorder {
    /// Events in arrival order
    pub events: Vec<SaxEvent>,
}

impl EventRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the recorded events into another handler
    pub fn replay(&self, handler: &mut dyn ContentHandler) -> Result<()> {
        for event in &self.events {
            match event {
                SaxEvent::StartDocument => handler.start_document()?,
                SaxEvent::EndDocument => handler.end_document()?,
                SaxEvent::StartPrefixMapping(p, u) => handler.start_prefix_mapping(p, u)?,
                SaxEvent::EndPrefixMapping(p) => handler.end_prefix_mapping(p)?,
                SaxEvent::StartElement {
                    uri,
                    local,
                    qname,
                    attributes,
                } => handler.start_element(uri, local, qname, attributes)?,
                SaxEvent::Characters(text) => handler.characters(text)?,
                SaxEvent::EndElement { uri, local, qname } => {
                    handler.end_element(uri, local, qname)?
                }
                SaxEvent::Comment(text) => handler.comment(text)?,
            }
        }
        Ok(())
    }
}

impl ContentHandler for EventRecorder {
    fn start_document(&mut self) -> Result<()> {
        self.events.push(SaxEvent::StartDocument);
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.events.push(SaxEvent::EndDocument);
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        self.events
            .push(SaxEvent::StartPrefixMapping(prefix.to_string(), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.events.push(SaxEvent::EndPrefixMapping(prefix.to_string()));
        Ok(())
    }

    fn start_element(
        &mut self,
        uri: &str,
        local: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.events.push(SaxEvent::StartElement {
            uri: uri.to_string(),
            local: local.to_string(),
            qname: qname.to_string(),
            attributes: attributes.clone(),
        });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.events.push(SaxEvent::Characters(text.to_string()));
        Ok(())
    }

    fn end_element(&mut self, uri: &str, local: &str, qname: &str) -> Result<()> {
        self.events.push(SaxEvent::EndElement {
            uri: uri.to_string(),
            local: local.to_string(),
            qname: qname.to_string(),
        });
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.events.push(SaxEvent::Comment(text.to_string()));
        Ok(())
    }
}

/// Handler wrapper rejecting lexically invalid element and attribute names
pub struct QNameValidatingHandler<'a> {
    inner: &'a mut dyn ContentHandler,
}

impl<'a> QNameValidatingHandler<'a> {
    /// Wrap `inner`
    pub fn new(inner: &'a mut dyn ContentHandler) -> Self {
        Self { inner }
    }

    fn check(qname: &str, what: &str) -> Result<()> {
        if names::is_valid_qname(qname) {
            Ok(())
        } else {
            Err(Error::Name(format!("invalid {} name '{}'", what, qname)))
        }
    }
}

impl ContentHandler for QNameValidatingHandler<'_> {
    fn start_document(&mut self) -> Result<()> {
        self.inner.start_document()
    }

    fn end_document(&mut self) -> Result<()> {
        self.inner.end_document()
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if !prefix.is_empty() && !names::is_valid_ncname(prefix) {
            return Err(Error::Name(format!("invalid prefix '{}'", prefix)));
        }
        self.inner.start_prefix_mapping(prefix, uri)
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<()> {
        self.inner.end_prefix_mapping(prefix)
    }

    fn start_element(
        &mut self,
        uri: &str,
        local: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        Self::check(qname, "element")?;
        for attribute in attributes.iter() {
            Self::check(&attribute.qname, "attribute")?;
        }
        self.inner.start_element(uri, local, qname, attributes)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.inner.characters(text)
    }

    fn end_element(&mut self, uri: &str, local: &str, qname: &str) -> Result<()> {
        Self::check(qname, "element")?;
        self.inner.end_element(uri, local, qname)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.inner.comment(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_collects_events() {
        let mut recorder = EventRecorder::new();
        let mut atts = Attributes::new();
        atts.push("", "id", "id", "A1");
        recorder.start_element("", "Root", "Root", &atts).unwrap();
        recorder.characters("x").unwrap();
        recorder.end_element("", "Root", "Root").unwrap();

        assert_eq!(recorder.events.len(), 3);
        match &recorder.events[0] {
            SaxEvent::StartElement { attributes, .. } => {
                assert_eq!(attributes.value("", "id"), Some("A1"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_validating_handler_rejects_bad_names() {
        let mut recorder = EventRecorder::new();
        let mut handler = QNameValidatingHandler::new(&mut recorder);
        assert!(handler
            .start_element("", "Root", "Root", &Attributes::new())
            .is_ok());
        let err = handler
            .start_element("", "1Root", "1Root", &Attributes::new())
            .unwrap_err();
        assert!(matches!(err, Error::Name(_)));

        let mut atts = Attributes::new();
        atts.push("", "bad name", "bad name", "v");
        assert!(handler.start_element("", "Root", "Root", &atts).is_err());
    }

    #[test]
    fn test_replay() {
        let mut first = EventRecorder::new();
        first.start_document().unwrap();
        first.comment("note").unwrap();
        first.end_document().unwrap();

        let mut second = EventRecorder::new();
        first.replay(&mut second).unwrap();
        assert_eq!(first.events, second.events);
    }
}
