//! Resource location resolution
//!
//! Schema documents are addressed by file path, URL or inline content.
//! Import and include references are resolved relative to the document
//! that declares them.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Resource location - a URL, a file path, or inline content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, ...)
    Url(Url),
    /// Inline document content, with a name used in diagnostics
    Inline {
        /// Name used in error messages and as the resolution key
        name: String,
        /// The document text
        content: String,
    },
}

impl Location {
    /// Parse a location string
    ///
    /// Strings carrying a scheme (`scheme://...`, `file:...`) must be valid
    /// URIs; anything else is taken as a file system path.
    pub fn parse(s: &str) -> Result<Self> {
        if looks_like_uri(s) {
            let url = Url::parse(s).map_err(|e| Error::SchemaLocation {
                location: s.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Self::from_url(url));
        }
        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Inline content location
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        Location::Inline {
            name: name.into(),
            content: content.into(),
        }
    }

    /// File path location
    pub fn path(path: impl AsRef<Path>) -> Self {
        Location::Path(path.as_ref().to_path_buf())
    }

    fn from_url(url: Url) -> Self {
        if url.scheme() == "file" {
            if let Ok(path) = url.to_file_path() {
                return Location::Path(path);
            }
        }
        Location::Url(url)
    }

    /// Resolve a reference found inside the document at this location
    pub fn resolve(&self, reference: &str) -> Result<Location> {
        if looks_like_uri(reference) {
            return Location::parse(reference);
        }
        match self {
            Location::Path(base) => {
                let candidate = Path::new(reference);
                if candidate.is_absolute() {
                    return Ok(Location::Path(candidate.to_path_buf()));
                }
                let dir = base.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Path(dir.join(candidate)))
            }
            Location::Url(base) => {
                let joined = base.join(reference).map_err(|e| Error::SchemaLocation {
                    location: reference.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Self::from_url(joined))
            }
            Location::Inline { .. } => Ok(Location::Path(PathBuf::from(reference))),
        }
    }

    /// Key identifying the resource, used to avoid loading it twice
    pub fn key(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::Inline { name, .. } => format!("inline:{}", name),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Path(p) => write!(f, "{}", p.display()),
            Location::Url(u) => write!(f, "{}", u),
            Location::Inline { name, .. } => write!(f, "<inline {}>", name),
        }
    }
}

fn looks_like_uri(s: &str) -> bool {
    if s.contains("://") || s.starts_with("file:") || s.starts_with("urn:") {
        return true;
    }
    // a single-letter scheme is a drive letter, not a URI
    match s.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::parse("http://example.com/schema.xsd").unwrap();
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::parse("/tmp/schema.xsd").unwrap();
        assert_eq!(loc, Location::Path(PathBuf::from("/tmp/schema.xsd")));
    }

    #[test]
    fn test_malformed_location() {
        let err = Location::parse("http://[::1/schema.xsd").unwrap_err();
        assert!(matches!(err, Error::SchemaLocation { .. }));
    }

    #[test]
    fn test_resolve_relative_to_path() {
        let base = Location::path("/schemas/main/root.xsd");
        let resolved = base.resolve("../common/types.xsd").unwrap();
        assert_eq!(
            resolved,
            Location::Path(PathBuf::from("/schemas/main/../common/types.xsd"))
        );
    }

    #[test]
    fn test_resolve_relative_to_url() {
        let base = Location::parse("http://example.com/a/root.xsd").unwrap();
        let resolved = base.resolve("types.xsd").unwrap();
        assert_eq!(resolved.key(), "http://example.com/a/types.xsd");
    }

    #[test]
    fn test_inline_key() {
        let loc = Location::inline("root", "<xs:schema/>");
        assert_eq!(loc.key(), "inline:root");
        assert_eq!(loc.to_string(), "<inline root>");
    }
}
