//! Error types for xsdbind
//!
//! This module defines all error types used throughout the library.
//! Fatal conditions (unresolved root element, cyclic configurations,
//! malformed schema locations) surface as variants of [`Error`]; degraded
//! conditions are logged and never reach this type.

use crate::namespaces::QName;
use std::fmt;
use thiserror::Error;

/// Result type alias using xsdbind Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsdbind operations
#[derive(Error, Debug)]
pub enum Error {
    /// XML Schema parsing/building error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Two configurations depend on each other
    #[error("cyclic dependency between configurations '{first}' and '{second}'")]
    CyclicDependency {
        /// Namespace of the configuration whose edge closed the cycle
        first: String,
        /// Namespace of the configuration it points back to
        second: String,
    },

    /// No element declaration is known for a name
    #[error("could not find element declaration for: {0}")]
    UnresolvedElement(QName),

    /// No type definition is known for a name
    #[error("could not find type definition for: {0}")]
    UnresolvedType(QName),

    /// A schema location could not be parsed as a URI
    #[error("malformed schema location '{location}': {reason}")]
    SchemaLocation {
        /// The offending location string
        location: String,
        /// Why it was rejected
        reason: String,
    },

    /// Binding registration or instantiation error
    #[error("binding error: {0}")]
    Binding(String),

    /// Value error (invalid lexical value for a type)
    #[error("value error: {0}")]
    Value(String),

    /// Encoding error (object to XML)
    #[error("encoding error: {0}")]
    Encode(String),

    /// Decoding error (XML to object)
    #[error("decoding error: {0}")]
    Decode(String),

    /// A self-encoding value failed; the original error is chained
    #[error("{message}")]
    Delegate {
        /// Context message
        message: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML tokenizer error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an error raised by a self-encoding value
    pub fn delegate(message: impl Into<String>, source: Error) -> Self {
        Error::Delegate {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

/// XML Schema parsing error
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Location of the schema document
    pub location: Option<String>,
    /// Schema component that caused the error
    pub component: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            component: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the offending component
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(ref component) = self.component {
            write!(f, " (in {})", component)?;
        }

        if let Some(ref loc) = self.location {
            write!(f, "\n\nLocation: {}", loc)?;
        }

        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<roxmltree::Error> for ParseError {
    fn from(err: roxmltree::Error) -> Self {
        ParseError::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unknown base type")
            .with_location("schema.xsd")
            .with_component("complexType 'Root'");

        let msg = format!("{}", err);
        assert!(msg.contains("unknown base type"));
        assert!(msg.contains("Location: schema.xsd"));
        assert!(msg.contains("complexType 'Root'"));
    }

    #[test]
    fn test_cycle_error_names_both_configurations() {
        let err = Error::CyclicDependency {
            first: "urn:a".to_string(),
            second: "urn:b".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("urn:a"));
        assert!(msg.contains("urn:b"));
    }

    #[test]
    fn test_delegate_keeps_source() {
        let err = Error::delegate(
            "Error encoding object to xml-element",
            Error::Encode("boom".to_string()),
        );
        assert_eq!(err.to_string(), "Error encoding object to xml-element");
        let source = err.source().unwrap();
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_unresolved_element_uses_clark_notation() {
        let err = Error::UnresolvedElement(QName::namespaced("urn:x", "Root"));
        assert_eq!(
            err.to_string(),
            "could not find element declaration for: {urn:x}Root"
        );
    }
}
