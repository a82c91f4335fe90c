//! Resource loading utilities
//!
//! Fetches schema documents. Remote locations are only served from the
//! in-memory resource table, so a schema build never blocks on the network.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::collections::HashMap;
use std::fs;

/// Resource loader for schema documents
#[derive(Debug, Clone, Default)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Pre-registered content keyed by location
    resources: HashMap<String, String>,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Serve `content` whenever `location` is requested
    pub fn with_resource(mut self, location: &Location, content: impl Into<String>) -> Self {
        self.resources.insert(location.key(), content.into());
        self
    }

    /// The limits applied by this loader
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Load a resource as a string
    pub fn load(&self, location: &Location) -> Result<String> {
        if let Some(content) = self.resources.get(&location.key()) {
            self.limits.check_xml_size(content.len())?;
            return Ok(content.clone());
        }
        let content = match location {
            Location::Path(path) => fs::read_to_string(path).map_err(|e| {
                Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
            })?,
            Location::Url(url) => {
                return Err(Error::Resource(format!(
                    "remote resource '{}' is not registered with the loader",
                    url
                )))
            }
            Location::Inline { content, .. } => content.clone(),
        };

        self.limits.check_xml_size(content.len())?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "<root>test</root>").unwrap();

        let location = Location::path(file.path());
        let content = Loader::new().load(&location).unwrap();

        assert!(content.contains("<root>test</root>"));
    }

    #[test]
    fn test_load_inline() {
        let location = Location::inline("doc", "<root>test</root>");
        let content = Loader::new().load(&location).unwrap();
        assert_eq!(content, "<root>test</root>");
    }

    #[test]
    fn test_remote_requires_registration() {
        let location = Location::parse("http://example.com/types.xsd").unwrap();
        assert!(Loader::new().load(&location).is_err());

        let loader = Loader::new().with_resource(&location, "<xs:schema/>");
        assert_eq!(loader.load(&location).unwrap(), "<xs:schema/>");
    }

    #[test]
    fn test_size_limit() {
        let mut file = NamedTempFile::new().unwrap();
        let large_content = "x".repeat(11 * 1024 * 1024); // 11 MB
        write!(file, "{}", large_content).unwrap();

        let location = Location::path(file.path());
        let loader = Loader::new().with_limits(Limits::strict());

        // Strict limits (10 MB max) should reject 11MB file
        assert!(loader.load(&location).is_err());
    }
}
