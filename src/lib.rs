//! # xsdbind
//!
//! Schema-driven XML binding: values are encoded to and decoded from XML
//! through chains of pluggable bindings attached to XSD elements and types.
//!
//! A [`Configuration`](config::Configuration) names a target namespace, its
//! schema and the bindings it contributes; configurations depend on each
//! other and always on the built-in XSD configuration. From a configuration
//! an [`Encoder`](encoder::Encoder) or [`Decoder`](decoder::Decoder) is built.
//!
//! ## Features
//!
//! - Binding chains following the XSD type hierarchy, with override,
//!   before and after execution modes
//! - Substitution group resolution for abstract elements
//! - Streaming output through SAX-style content handlers
//! - Wildcard, global and synthetic element mapping for extra properties
//! - Protection against deep or oversized documents
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xsdbind::config::Configuration;
//! use xsdbind::encoder::Encoder;
//! use xsdbind::locations::Location;
//!
//! let configuration = Arc::new(
//!     Configuration::new("urn:example").with_schema(Location::parse("schemas/example.xsd")?),
//! );
//! let encoder = Encoder::new(configuration)?;
//! let xml = encoder.encode_as_string(&value, &QName::namespaced("urn:example", "Root"))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and resources
pub mod namespaces;
pub mod names;
pub mod locations;
pub mod loaders;

// Document model and output
pub mod documents;
pub mod sax;
pub mod serializer;

// Runtime values
pub mod value;
pub mod context;

// Schema model
pub mod schema;

// Bindings and configurations
pub mod binding;
pub mod config;
pub mod extract;

// Engines
pub mod encoder;
pub mod decoder;

// Re-exports for convenience
pub use binding::{Binding, ExecutionMode};
pub use config::{BindingConfigurer, Configuration, ParserProperty};
pub use decoder::Decoder;
pub use encoder::{Encoder, EncoderOptions};
pub use error::{Error, Result};
pub use namespaces::QName;
pub use value::Value;

/// Version of the xsdbind library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XML Schema namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Namespace of names private to this crate, such as the comment pseudo element
pub const XSDBIND_NAMESPACE: &str = "urn:xsdbind";
