//! Limits and constraints for schema building, decoding and encoding
//!
//! Bounds on resource size, element nesting and import chains so that a
//! hostile schema or instance cannot exhaust memory or the encode stack.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Global limits configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum element nesting, checked by both the decoder and the encoder stack
    pub max_xml_depth: usize,

    /// Maximum size of a loaded resource in bytes
    pub max_xml_size: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum import/include chain length
    pub max_schema_depth: usize,

    /// Maximum number of model group references followed while expanding a type
    pub max_group_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_attributes: 1000,
            max_schema_depth: 100,
            max_group_depth: 64,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_attributes: 100,
            max_schema_depth: 20,
            max_group_depth: 16,
        }
    }

    /// Check if XML depth is within limits
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_xml_depth {
            Err(Error::LimitExceeded(format!(
                "XML depth {} exceeds maximum {}",
                depth, self.max_xml_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a resource size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "resource size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if number of attributes is within limits
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        if count > self.max_attributes {
            Err(Error::LimitExceeded(format!(
                "Attribute count {} exceeds maximum {}",
                count, self.max_attributes
            )))
        } else {
            Ok(())
        }
    }

    /// Check if an import/include chain is within limits
    pub fn check_schema_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_schema_depth {
            Err(Error::LimitExceeded(format!(
                "Schema import depth {} exceeds maximum {}",
                depth, self.max_schema_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if model group expansion is within limits
    pub fn check_group_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_group_depth {
            Err(Error::LimitExceeded(format!(
                "Model group nesting {} exceeds maximum {} (circular group reference?)",
                depth, self.max_group_depth
            )))
        } else {
            Ok(())
        }
    }
}
