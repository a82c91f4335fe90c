//! Object to XML encoding
//!
//! [`Encoder`] turns a [`Value`] into an XML document shaped by the schema of
//! a [`Configuration`]. The traversal keeps its own stack of frames instead
//! of recursing, so the child value iterators of every open frame can be
//! closed when encoding fails half way.
//!
//! ```rust,ignore
//! let encoder = Encoder::new(configuration)?;
//! let xml = encoder.encode_as_string(&value, &QName::namespaced("urn:test", "Root"))?;
//! ```

mod engine;
pub mod options;

pub use options::{EncoderOptions, RELAXED_ENV};

use crate::binding::BindingLoader;
use crate::config::Configuration;
use crate::context::Context;
use crate::documents::{Document, DomBuilder};
use crate::error::Result;
use crate::limits::Limits;
use crate::namespaces::{NamespaceContext, QName};
use crate::sax::{ContentHandler, QNameValidatingHandler};
use crate::schema::{ElementDeclaration, ElementId, Schema};
use crate::serializer::XmlSerializer;
use crate::value::Value;
use crate::Error;
use engine::EncodeRun;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// What kind of best-effort decision an encode made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A required, non-nillable child had no value and was left out
    RequiredValueMissing,
    /// No substitution group member matched the value of an abstract element
    AbstractElementKept,
    /// A value was left out because its element is not nillable
    NullSkipped,
}

/// A degraded condition recorded during an encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Element the condition concerns
    pub element: QName,
    /// Condition
    pub kind: DiagnosticKind,
    /// Human readable description
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.element, self.message)
    }
}

/// Declaration an encoding frame works against
#[derive(Debug, Clone)]
pub(crate) struct ResolvedElement {
    /// Arena id, None for synthetic declarations
    pub id: Option<ElementId>,
    pub decl: ElementDeclaration,
}

/// Encodes values as XML documents
pub struct Encoder {
    configuration: Arc<Configuration>,
    schema: Arc<Schema>,
    loader: BindingLoader,
    context: Arc<Context>,
    options: EncoderOptions,
    namespaces: NamespaceContext,
    limits: Limits,
}

impl Encoder {
    /// Create an encoder for the schema and bindings of `configuration`
    pub fn new(configuration: Arc<Configuration>) -> Result<Self> {
        let schema = configuration.schema()?;
        let loader = BindingLoader::new(configuration.binding_map()?);
        let context = Arc::new(configuration.context()?);
        let mut options = EncoderOptions::default();
        configuration.configure_encoder(&mut options)?;
        debug!(namespace = configuration.namespace(), "encoder ready");
        Ok(Self {
            limits: configuration.loader().limits().clone(),
            configuration,
            schema,
            loader,
            context,
            options,
            namespaces: NamespaceContext::new(),
        })
    }

    /// Replace the options
    pub fn with_options(mut self, options: EncoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Current options
    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    /// Mutable options
    pub fn options_mut(&mut self) -> &mut EncoderOptions {
        &mut self.options
    }

    /// Declare a prefix on the root element; "" declares the default namespace
    pub fn declare_prefix(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.add_prefix(prefix, uri);
    }

    /// Configuration this encoder was built from
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Schema in use
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Root binding context
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Encode `value` as the element `name`, writing the document to `out`
    pub fn encode<W: Write>(&self, value: &Value, name: &QName, out: &mut W) -> Result<()> {
        self.encode_with_diagnostics(value, name, out).map(|_| ())
    }

    /// Like [`Encoder::encode`], returning the degraded conditions met
    pub fn encode_with_diagnostics<W: Write>(
        &self,
        value: &Value,
        name: &QName,
        out: &mut W,
    ) -> Result<Vec<Diagnostic>> {
        let mut serializer = XmlSerializer::new(out, self.options.output_format());
        self.encode_to_handler(value, name, &mut serializer)
    }

    /// Encode `value` as the element `name`, driving `handler`
    pub fn encode_to_handler(
        &self,
        value: &Value,
        name: &QName,
        handler: &mut dyn ContentHandler,
    ) -> Result<Vec<Diagnostic>> {
        let root = self.root_declaration(name)?;
        let mut validating = QNameValidatingHandler::new(handler);
        EncodeRun::new(self, &mut validating).run(value.clone(), root)
    }

    /// Encode to a string in the configured output encoding
    pub fn encode_as_string(&self, value: &Value, name: &QName) -> Result<String> {
        let mut buffer = Vec::new();
        self.encode(value, name, &mut buffer)?;
        self.options.encoding.decode(&buffer)
    }

    /// Encode to a document tree
    pub fn encode_as_dom(&self, value: &Value, name: &QName) -> Result<Document> {
        let mut builder = DomBuilder::new();
        self.encode_to_handler(value, name, &mut builder)?;
        Ok(builder.into_document())
    }

    /// Global declaration of `name`, or a synthetic one built from the
    /// root element type hint
    fn root_declaration(&self, name: &QName) -> Result<ResolvedElement> {
        if let Some(id) = self.schema.element_by_name(name) {
            let id = self.schema.resolved_element(id);
            return Ok(ResolvedElement {
                id: Some(id),
                decl: self.schema.element(id).clone(),
            });
        }
        if let Some(type_name) = &self.options.root_element_type {
            let type_id = self
                .schema
                .type_by_name(type_name)
                .ok_or_else(|| Error::UnresolvedType(type_name.clone()))?;
            debug!(%name, %type_name, "using root element type hint");
            return Ok(ResolvedElement {
                id: None,
                decl: ElementDeclaration::new(name.clone(), type_id),
            });
        }
        Err(Error::UnresolvedElement(name.clone()))
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("namespace", &self.configuration.namespace())
            .field("options", &self.options)
            .finish()
    }
}
