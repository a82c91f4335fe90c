//! XML name validation and character data hygiene
//!
//! Lexical checks for Names, NCNames and QNames used by the validating
//! output handler, plus removal of characters XML 1.0 cannot carry.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

const NAME_START: &str = r"A-Z_a-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}\u{10000}-\u{EFFFF}";
const NAME_REST: &str = r"\-\.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "^[{start}][{start}{rest}]*$",
        start = NAME_START,
        rest = NAME_REST
    ))
    .expect("NCName pattern is valid")
});

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    !name.is_empty() && NCNAME.is_match(name)
}

/// Check if a string is a valid XML Name (colons allowed)
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(':')
        && name.split(':').all(|part| part.is_empty() || is_valid_ncname(part))
}

/// Check if a string is a valid QName (qualified name)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Validate a QName and return an error if invalid
pub fn validate_qname(name: &str) -> Result<()> {
    if is_valid_qname(name) {
        Ok(())
    } else {
        Err(Error::Name(format!("Invalid QName: '{}'", name)))
    }
}

/// Split a QName into prefix and local name
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    if let Some((prefix, local)) = qname.split_once(':') {
        (Some(prefix), local)
    } else {
        (None, qname)
    }
}

/// Check if a character is allowed in XML 1.0 documents
pub fn is_valid_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Drop characters that cannot appear in XML 1.0 character data
pub fn remove_invalid_xml_chars(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_valid_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|c| is_valid_xml_char(*c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ncname() {
        assert!(is_valid_ncname("element"));
        assert!(is_valid_ncname("my-element"));
        assert!(is_valid_ncname("_x.1"));
        assert!(is_valid_ncname("caf\u{e9}"));

        assert!(!is_valid_ncname(""));
        assert!(!is_valid_ncname("prefix:element"));
        assert!(!is_valid_ncname("123element"));
        assert!(!is_valid_ncname("-element"));
        assert!(!is_valid_ncname("has space"));
    }

    #[test]
    fn test_is_valid_qname() {
        assert!(is_valid_qname("element"));
        assert!(is_valid_qname("xs:schema"));

        assert!(!is_valid_qname(""));
        assert!(!is_valid_qname(":element"));
        assert!(!is_valid_qname("element:"));
        assert!(!is_valid_qname("null:element:x"));
        assert!(validate_qname("1bad").is_err());
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("a:b:c"));
        assert!(!is_valid_name(":a"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("element"), (None, "element"));
        assert_eq!(split_qname("xs:element"), (Some("xs"), "element"));
    }

    #[test]
    fn test_remove_invalid_xml_chars() {
        assert!(matches!(remove_invalid_xml_chars("plain"), Cow::Borrowed(_)));
        assert_eq!(remove_invalid_xml_chars("a\u{0}b\u{1B}c"), "abc");
        assert_eq!(remove_invalid_xml_chars("tab\there"), "tab\there");
    }
}
