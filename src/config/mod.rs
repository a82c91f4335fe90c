//! Binding configurations
//!
//! A [`Configuration`] describes one namespace: where its schema lives,
//! which configurations it depends on, and the [`BindingConfigurer`]s that
//! register its bindings. Configurations are identified by namespace, and
//! everything built from them (schemas, binding maps, contexts) is
//! assembled over the whole dependency closure in dependency order.

mod dependencies;
pub mod xs;

pub use dependencies::all_dependencies;
pub use xs::xs_configuration;

use crate::binding::{build_binding_map, BindingMap};
use crate::context::Context;
use crate::encoder::EncoderOptions;
use crate::error::Result;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::schema::{Schema, SchemaBuilder};
use crate::XSD_NAMESPACE;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Parser switches a configuration can turn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserProperty {
    /// Decode elements that match no declaration instead of failing
    ParseUnknownElements,
    /// Keep attributes that match no declaration
    ParseUnknownAttributes,
    /// Resolve imports through configured namespace locations only
    IgnoreSchemaLocation,
}

/// Contributes bindings and settings for a namespace
///
/// Every hook defaults to doing nothing.
pub trait BindingConfigurer: Send + Sync {
    /// First pass: register default bindings
    fn register_bindings(&self, _bindings: &mut BindingMap) {}

    /// Second pass, after every configuration registered its defaults:
    /// override or remove entries
    fn configure_bindings(&self, _bindings: &mut BindingMap) {}

    /// Register collaborators binding factories look up
    fn configure_context(&self, _context: &mut Context) {}

    /// Adjust encoder settings
    fn configure_encoder(&self, _options: &mut EncoderOptions) {}
}

/// Configuration of one namespace
pub struct Configuration {
    namespace: String,
    schema_location: Option<Location>,
    loader: Loader,
    dependencies: RwLock<Vec<Arc<Configuration>>>,
    properties: HashSet<ParserProperty>,
    configurers: Vec<Arc<dyn BindingConfigurer>>,
    schema: Mutex<Option<Arc<Schema>>>,
}

impl Configuration {
    /// Configuration for `namespace`; every configuration except the one
    /// for the XSD namespace itself depends on [`xs_configuration`]
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let dependencies = if namespace == XSD_NAMESPACE {
            Vec::new()
        } else {
            vec![xs_configuration()]
        };
        Self {
            namespace,
            schema_location: None,
            loader: Loader::new(),
            dependencies: RwLock::new(dependencies),
            properties: HashSet::new(),
            configurers: Vec::new(),
            schema: Mutex::new(None),
        }
    }

    /// Set the schema document for this namespace
    pub fn with_schema(mut self, location: Location) -> Self {
        self.schema_location = Some(location);
        self
    }

    /// Fetch schema documents through `loader`
    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    /// Add a dependency
    pub fn with_dependency(self, dependency: Arc<Configuration>) -> Self {
        self.add_dependency(dependency);
        self
    }

    /// Turn on a parser property
    pub fn with_property(mut self, property: ParserProperty) -> Self {
        self.properties.insert(property);
        self
    }

    /// Add a binding configurer
    pub fn with_configurer(mut self, configurer: impl BindingConfigurer + 'static) -> Self {
        self.configurers.push(Arc::new(configurer));
        self
    }

    /// Add a dependency to a shared configuration
    pub fn add_dependency(&self, dependency: Arc<Configuration>) {
        let mut dependencies = self.dependencies.write();
        if !dependencies.iter().any(|d| d.namespace == dependency.namespace) {
            dependencies.push(dependency);
        }
    }

    /// Namespace this configuration is for
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Schema document, if any
    pub fn schema_location(&self) -> Option<&Location> {
        self.schema_location.as_ref()
    }

    /// Direct dependencies
    pub fn dependencies(&self) -> Vec<Arc<Configuration>> {
        self.dependencies.read().clone()
    }

    /// True when `property` is turned on
    pub fn has_property(&self, property: ParserProperty) -> bool {
        self.properties.contains(&property)
    }

    /// Registered configurers
    pub fn configurers(&self) -> &[Arc<dyn BindingConfigurer>] {
        &self.configurers
    }

    /// The loader schema documents are fetched through
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// The schema for this namespace and its dependencies, built on first use
    pub fn schema(self: &Arc<Self>) -> Result<Arc<Schema>> {
        let mut cached = self.schema.lock();
        if let Some(schema) = cached.as_ref() {
            return Ok(schema.clone());
        }

        let mut builder = SchemaBuilder::new(self.loader.clone())
            .ignore_schema_locations(self.has_property(ParserProperty::IgnoreSchemaLocation));
        if let Some(location) = &self.schema_location {
            builder = builder.with_source(location.clone());
        }
        for dependency in all_dependencies(self)? {
            if Arc::ptr_eq(&dependency, self) {
                continue;
            }
            if let Some(location) = dependency.schema_location() {
                builder = builder
                    .with_namespace_location(dependency.namespace(), location.clone())
                    .with_source(location.clone());
            }
        }

        debug!(namespace = %self.namespace, "building schema");
        let schema = Arc::new(builder.build()?);
        *cached = Some(schema.clone());
        Ok(schema)
    }

    /// Drop the cached schema and the substitution group members this
    /// namespace contributed to it
    pub fn dispose_schema(&self) {
        if let Some(schema) = self.schema.lock().take() {
            schema.dispose_namespace(&self.namespace);
        }
    }

    /// Binding map over this configuration and its dependencies
    pub fn binding_map(self: &Arc<Self>) -> Result<BindingMap> {
        build_binding_map(self)
    }

    /// Root context configured by every configuration in dependency order
    pub fn context(self: &Arc<Self>) -> Result<Context> {
        let mut context = Context::new();
        for configuration in all_dependencies(self)? {
            for configurer in configuration.configurers() {
                configurer.configure_context(&mut context);
            }
        }
        Ok(context)
    }

    /// Apply every configuration's encoder settings, in dependency order
    pub fn configure_encoder(self: &Arc<Self>, options: &mut EncoderOptions) -> Result<()> {
        for configuration in all_dependencies(self)? {
            for configurer in configuration.configurers() {
                configurer.configure_encoder(options);
            }
        }
        Ok(())
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace
    }
}

impl Eq for Configuration {}

impl Hash for Configuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("namespace", &self.namespace)
            .field("schema_location", &self.schema_location)
            .field(
                "dependencies",
                &self
                    .dependencies
                    .read()
                    .iter()
                    .map(|d| d.namespace.clone())
                    .collect::<Vec<_>>(),
            )
            .field("properties", &self.properties)
            .field("configurers", &self.configurers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::namespaces::QName;

    const TEST_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:t="urn:test" targetNamespace="urn:test" elementFormDefault="qualified">
  <xs:element name="Label" type="xs:string"/>
</xs:schema>"#;

    #[derive(Debug)]
    struct LabelBinding;

    impl Binding for LabelBinding {
        fn target(&self) -> QName {
            QName::namespaced("urn:test", "Label")
        }
    }

    struct TestConfigurer;

    impl BindingConfigurer for TestConfigurer {
        fn register_bindings(&self, bindings: &mut BindingMap) {
            bindings.put(Arc::new(LabelBinding));
        }

        fn configure_encoder(&self, options: &mut EncoderOptions) {
            options.indent = true;
        }
    }

    fn configuration() -> Arc<Configuration> {
        Arc::new(
            Configuration::new("urn:test")
                .with_schema(Location::inline("test.xsd", TEST_XSD))
                .with_configurer(TestConfigurer),
        )
    }

    #[test]
    fn test_identity_is_the_namespace() {
        let a = Configuration::new("urn:a");
        let b = Configuration::new("urn:a").with_property(ParserProperty::ParseUnknownElements);
        assert_eq!(a, b);
        assert_ne!(a, Configuration::new("urn:b"));
    }

    #[test]
    fn test_xs_is_an_implicit_dependency() {
        let config = configuration();
        let namespaces: Vec<String> = config
            .dependencies()
            .iter()
            .map(|d| d.namespace().to_string())
            .collect();
        assert_eq!(namespaces, vec![XSD_NAMESPACE.to_string()]);
        assert!(xs_configuration().dependencies().is_empty());
    }

    #[test]
    fn test_schema_is_cached_until_disposed() {
        let config = configuration();
        let first = config.schema().unwrap();
        let second = config.schema().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first
            .element_by_name(&QName::namespaced("urn:test", "Label"))
            .is_some());

        config.dispose_schema();
        let third = config.schema().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_binding_map_includes_dependencies() {
        let map = configuration().binding_map().unwrap();
        assert!(map.contains(&QName::namespaced("urn:test", "Label")));
        assert!(map.contains(&crate::schema::builtins::xs("anyType")));
    }

    #[test]
    fn test_configure_encoder() {
        let mut options = EncoderOptions::default();
        configuration().configure_encoder(&mut options).unwrap();
        assert!(options.indent);
    }
}
