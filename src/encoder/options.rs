//! Encoder settings

use crate::namespaces::QName;
use crate::serializer::{OutputEncoding, OutputFormat};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Environment variable switching the relaxed nesting mode off process-wide
pub const RELAXED_ENV: &str = "XSDBIND_ENCODER_RELAXED";

static RELAXED_DEFAULT: Lazy<bool> = Lazy::new(|| {
    std::env::var(RELAXED_ENV)
        .map(|value| !value.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(true)
});

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    /// Break lines and indent nested elements
    pub indent: bool,
    /// Spaces per nesting level
    pub indent_size: usize,
    /// Wrap attributes of start tags longer than this
    pub line_width: usize,
    /// Skip the XML declaration
    pub omit_xml_declaration: bool,
    /// Output character encoding
    pub encoding: OutputEncoding,
    /// Type of the root element when it is not declared globally
    pub root_element_type: Option<QName>,
    /// Namespace to schema location pairs for the root's `xsi:schemaLocation`
    pub schema_locations: IndexMap<String, String>,
    /// Flatten containers whose nested values all share the container's class
    pub relaxed: bool,
    /// Write qualified names and namespace declarations
    pub namespace_aware: bool,
    /// Emit a fragment: no document start and end events
    pub inline: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            indent: false,
            indent_size: 2,
            line_width: 72,
            omit_xml_declaration: false,
            encoding: OutputEncoding::Utf8,
            root_element_type: None,
            schema_locations: IndexMap::new(),
            relaxed: *RELAXED_DEFAULT,
            namespace_aware: true,
            inline: false,
        }
    }
}

impl EncoderOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set indentation
    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Set the indent width
    pub fn with_indent_size(mut self, size: usize) -> Self {
        self.indent_size = size;
        self
    }

    /// Set the line width
    pub fn with_line_width(mut self, width: usize) -> Self {
        self.line_width = width;
        self
    }

    /// Set whether to omit the XML declaration
    pub fn with_omit_xml_declaration(mut self, omit: bool) -> Self {
        self.omit_xml_declaration = omit;
        self
    }

    /// Set the output encoding
    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the root element type hint
    pub fn with_root_element_type(mut self, type_name: QName) -> Self {
        self.root_element_type = Some(type_name);
        self
    }

    /// Add a schema location for the root element
    pub fn with_schema_location(mut self, namespace: impl Into<String>, location: impl Into<String>) -> Self {
        self.schema_locations.insert(namespace.into(), location.into());
        self
    }

    /// Set relaxed nesting
    pub fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    /// Set namespace awareness
    pub fn with_namespace_aware(mut self, aware: bool) -> Self {
        self.namespace_aware = aware;
        self
    }

    /// Set fragment mode
    pub fn with_inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    /// Layout handed to the serializer
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat {
            indent: self.indent,
            indent_size: self.indent_size,
            line_width: self.line_width,
            // a fragment never carries a declaration
            omit_xml_declaration: self.omit_xml_declaration || self.inline,
            encoding: self.encoding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EncoderOptions::default();
        assert!(!options.indent);
        assert_eq!(options.indent_size, 2);
        assert_eq!(options.line_width, 72);
        assert!(options.namespace_aware);
        assert_eq!(options.encoding, OutputEncoding::Utf8);
    }

    #[test]
    fn test_deserialize_partial() {
        let options: EncoderOptions =
            serde_json::from_str(r#"{"indent": true, "schema_locations": {"urn:test": "test.xsd"}}"#).unwrap();
        assert!(options.indent);
        assert_eq!(options.indent_size, 2);
        assert_eq!(options.schema_locations.get("urn:test").map(String::as_str), Some("test.xsd"));
    }

    #[test]
    fn test_output_format() {
        let format = EncoderOptions::new()
            .with_inline(true)
            .with_encoding(OutputEncoding::Latin1)
            .output_format();
        assert!(format.omit_xml_declaration);
        assert_eq!(format.encoding, OutputEncoding::Latin1);
    }
}
