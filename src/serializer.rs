//! Streaming XML writer
//!
//! A [`ContentHandler`] that writes markup to any `std::io::Write`.
//! Start tags are held open until the next event so empty elements can be
//! written in self-closing form. Prefix mappings announced before a start
//! tag become `xmlns` attributes on it.

use crate::error::{Error, Result};
use crate::sax::{Attributes, ContentHandler};
use quick_xml::escape::{escape, partial_escape};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Write;

/// Character encoding of the produced document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputEncoding {
    /// UTF-8
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    /// ISO-8859-1; other characters become character references
    #[serde(rename = "ISO-8859-1")]
    Latin1,
    /// US-ASCII; other characters become character references
    #[serde(rename = "US-ASCII")]
    Ascii,
}

impl OutputEncoding {
    /// Name used in the XML declaration
    pub fn name(&self) -> &'static str {
        match self {
            OutputEncoding::Utf8 => "UTF-8",
            OutputEncoding::Latin1 => "ISO-8859-1",
            OutputEncoding::Ascii => "US-ASCII",
        }
    }

    /// Look up an encoding by (case-insensitive) name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(OutputEncoding::Utf8),
            "ISO-8859-1" | "LATIN1" | "LATIN-1" => Ok(OutputEncoding::Latin1),
            "US-ASCII" | "ASCII" => Ok(OutputEncoding::Ascii),
            other => Err(Error::Encode(format!("unsupported output encoding '{}'", other))),
        }
    }

    fn max_char(&self) -> u32 {
        match self {
            OutputEncoding::Utf8 => u32::MAX,
            OutputEncoding::Latin1 => 0xFF,
            OutputEncoding::Ascii => 0x7F,
        }
    }

    /// Decode bytes produced with this encoding
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            OutputEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Encode(format!("output is not UTF-8: {}", e))),
            OutputEncoding::Latin1 | OutputEncoding::Ascii => {
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
        }
    }
}

/// Layout settings for the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Break lines and indent nested elements
    pub indent: bool,
    /// Spaces per nesting level
    pub indent_size: usize,
    /// Start tags longer than this wrap their attributes (only when indenting)
    pub line_width: usize,
    /// Skip the `<?xml ...?>` declaration
    pub omit_xml_declaration: bool,
    /// Output character encoding
    pub encoding: OutputEncoding,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            indent: false,
            indent_size: 2,
            line_width: 72,
            omit_xml_declaration: false,
            encoding: OutputEncoding::Utf8,
        }
    }
}

#[derive(Debug, Default)]
struct OpenElement {
    has_children: bool,
    has_text: bool,
}

/// Streaming XML writer
pub struct XmlSerializer<W: Write> {
    out: W,
    format: OutputFormat,
    pending_namespaces: Vec<(String, String)>,
    open_tag: bool,
    stack: Vec<OpenElement>,
    started: bool,
}

impl<W: Write> XmlSerializer<W> {
    /// Create a writer with the given layout
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            pending_namespaces: Vec::new(),
            open_tag: false,
            stack: Vec::new(),
            started: false,
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        let max = self.format.encoding.max_char();
        if max == u32::MAX || s.is_ascii() {
            self.out.write_all(s.as_bytes())?;
            return Ok(());
        }
        let mut buf = Vec::with_capacity(s.len());
        for c in s.chars() {
            if (c as u32) <= max {
                buf.push(c as u32 as u8);
            } else {
                buf.extend_from_slice(format!("&#x{:X};", c as u32).as_bytes());
            }
        }
        self.out.write_all(&buf)?;
        Ok(())
    }

    fn close_open_tag(&mut self) -> Result<()> {
        if self.open_tag {
            self.open_tag = false;
            self.write_str(">")?;
        }
        Ok(())
    }

    fn indentation(&self, depth: usize) -> String {
        " ".repeat(depth * self.format.indent_size)
    }

    fn break_line(&mut self) -> Result<()> {
        if !self.format.indent || !self.started {
            return Ok(());
        }
        if self.stack.last().map_or(false, |e| e.has_text) {
            return Ok(());
        }
        let pad = self.indentation(self.stack.len());
        self.write_str("\n")?;
        self.write_str(&pad)
    }
}

impl<W: Write> ContentHandler for XmlSerializer<W> {
    fn start_document(&mut self) -> Result<()> {
        if !self.format.omit_xml_declaration {
            let decl = format!(
                "<?xml version=\"1.0\" encoding=\"{}\"?>",
                self.format.encoding.name()
            );
            self.write_str(&decl)?;
            self.started = true;
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.close_open_tag()?;
        if self.format.indent && self.started {
            self.write_str("\n")?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if !self.pending_namespaces.iter().any(|(p, _)| p == prefix) {
            self.pending_namespaces
                .push((prefix.to_string(), uri.to_string()));
        }
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn start_element(
        &mut self,
        _uri: &str,
        _local: &str,
        qname: &str,
        attributes: &Attributes,
    ) -> Result<()> {
        self.close_open_tag()?;
        self.break_line()?;
        if let Some(parent) = self.stack.last_mut() {
            parent.has_children = true;
        }

        let mut parts = Vec::with_capacity(self.pending_namespaces.len() + attributes.len());
        for (prefix, uri) in self.pending_namespaces.drain(..) {
            let name = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{}", prefix)
            };
            parts.push(format!("{}=\"{}\"", name, escape(uri.as_str())));
        }
        for attribute in attributes.iter() {
            parts.push(format!(
                "{}=\"{}\"",
                attribute.qname,
                escape(attribute.value.as_str())
            ));
        }

        let depth = self.stack.len();
        let one_line = 1 + qname.len() + parts.iter().map(|p| p.len() + 1).sum::<usize>();
        let separator = if self.format.indent
            && parts.len() > 1
            && depth * self.format.indent_size + one_line > self.format.line_width
        {
            format!("\n{}", self.indentation(depth + 2))
        } else {
            " ".to_string()
        };

        let mut tag = format!("<{}", qname);
        for (i, part) in parts.iter().enumerate() {
            tag.push_str(if i == 0 { " " } else { separator.as_str() });
            tag.push_str(part);
        }
        self.write_str(&tag)?;

        self.open_tag = true;
        self.started = true;
        self.stack.push(OpenElement::default());
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.close_open_tag()?;
        if let Some(current) = self.stack.last_mut() {
            current.has_text = true;
        }
        let escaped = partial_escape(text).into_owned();
        self.write_str(&escaped)
    }

    fn end_element(&mut self, _uri: &str, _local: &str, qname: &str) -> Result<()> {
        let element = self
            .stack
            .pop()
            .ok_or_else(|| Error::Encode(format!("unbalanced end tag '{}'", qname)))?;
        if self.open_tag {
            self.open_tag = false;
            return self.write_str("/>");
        }
        if element.has_children && !element.has_text {
            self.break_line()?;
        }
        self.write_str(&format!("</{}>", qname))
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.close_open_tag()?;
        self.break_line()?;
        if let Some(parent) = self.stack.last_mut() {
            parent.has_children = true;
        }
        self.started = true;
        self.write_str(&format!("<!--{}-->", comment_text(text)))
    }
}

/// Comment content that cannot end the comment early: `--` is split and a trailing `-` padded
fn comment_text(text: &str) -> Cow<'_, str> {
    if !text.contains("--") && !text.ends_with('-') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        if c == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(format: OutputFormat, f: impl FnOnce(&mut XmlSerializer<Vec<u8>>)) -> String {
        let encoding = format.encoding;
        let mut ser = XmlSerializer::new(Vec::new(), format);
        f(&mut ser);
        encoding.decode(&ser.into_inner()).unwrap()
    }

    fn no_decl() -> OutputFormat {
        OutputFormat {
            omit_xml_declaration: true,
            ..OutputFormat::default()
        }
    }

    #[test]
    fn test_flat_output() {
        let out = write(OutputFormat::default(), |s| {
            s.start_document().unwrap();
            let mut atts = Attributes::new();
            atts.push("", "id", "id", "A&1");
            s.start_element("", "Root", "Root", &atts).unwrap();
            s.start_element("", "Item", "Item", &Attributes::new()).unwrap();
            s.characters("x < y").unwrap();
            s.end_element("", "Item", "Item").unwrap();
            s.start_element("", "Empty", "Empty", &Attributes::new()).unwrap();
            s.end_element("", "Empty", "Empty").unwrap();
            s.end_element("", "Root", "Root").unwrap();
            s.end_document().unwrap();
        });
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Root id=\"A&amp;1\"><Item>x &lt; y</Item><Empty/></Root>"
        );
    }

    #[test]
    fn test_prefix_mappings_become_xmlns() {
        let out = write(no_decl(), |s| {
            s.start_prefix_mapping("t", "urn:t").unwrap();
            s.start_prefix_mapping("", "urn:d").unwrap();
            s.start_element("urn:t", "a", "t:a", &Attributes::new()).unwrap();
            s.end_element("urn:t", "a", "t:a").unwrap();
        });
        assert_eq!(out, "<t:a xmlns:t=\"urn:t\" xmlns=\"urn:d\"/>");
    }

    #[test]
    fn test_indentation() {
        let format = OutputFormat {
            indent: true,
            indent_size: 2,
            ..no_decl()
        };
        let out = write(format, |s| {
            s.start_element("", "a", "a", &Attributes::new()).unwrap();
            s.start_element("", "b", "b", &Attributes::new()).unwrap();
            s.characters("text").unwrap();
            s.end_element("", "b", "b").unwrap();
            s.comment(" note ").unwrap();
            s.end_element("", "a", "a").unwrap();
            s.end_document().unwrap();
        });
        assert_eq!(out, "<a>\n  <b>text</b>\n  <!-- note -->\n</a>\n");
    }

    #[test]
    fn test_long_start_tag_wraps_attributes() {
        let format = OutputFormat {
            indent: true,
            line_width: 20,
            ..no_decl()
        };
        let out = write(format, |s| {
            let mut atts = Attributes::new();
            atts.push("", "first", "first", "1111111");
            atts.push("", "second", "second", "2222222");
            s.start_element("", "a", "a", &atts).unwrap();
            s.end_element("", "a", "a").unwrap();
        });
        assert_eq!(out, "<a first=\"1111111\"\n    second=\"2222222\"/>");
    }

    #[test]
    fn test_latin1_uses_character_references() {
        let format = OutputFormat {
            encoding: OutputEncoding::Latin1,
            ..OutputFormat::default()
        };
        let out = write(format, |s| {
            s.start_document().unwrap();
            s.start_element("", "a", "a", &Attributes::new()).unwrap();
            s.characters("caf\u{e9} \u{20ac}").unwrap();
            s.end_element("", "a", "a").unwrap();
        });
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\u{e9} &#x20AC;</a>"
        );
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(OutputEncoding::from_name("utf-8").unwrap(), OutputEncoding::Utf8);
        assert_eq!(OutputEncoding::from_name("latin1").unwrap(), OutputEncoding::Latin1);
        assert!(OutputEncoding::from_name("EBCDIC").is_err());
    }

    #[test]
    fn test_comment_cannot_terminate_early() {
        let out = write(no_decl(), |s| {
            s.start_element("", "a", "a", &Attributes::new()).unwrap();
            s.comment("a--b---c-").unwrap();
            s.comment("plain").unwrap();
            s.end_element("", "a", "a").unwrap();
        });
        assert!(out.contains("<!--a- -b- - -c- -->"));
        assert!(out.contains("<!--plain-->"));
        assert!(roxmltree::Document::parse(&out).is_ok());
    }

    #[test]
    fn test_unbalanced_end_tag() {
        let mut ser = XmlSerializer::new(Vec::new(), no_decl());
        assert!(ser.end_element("", "a", "a").is_err());
    }
}
