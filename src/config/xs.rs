//! Configuration of the XSD namespace itself

use super::{BindingConfigurer, Configuration};
use crate::binding::builtins::xs_bindings;
use crate::binding::BindingMap;
use crate::XSD_NAMESPACE;
use once_cell::sync::Lazy;
use std::sync::Arc;

static XS_CONFIGURATION: Lazy<Arc<Configuration>> =
    Lazy::new(|| Arc::new(Configuration::new(XSD_NAMESPACE).with_configurer(XsConfigurer)));

/// Registers the built-in type bindings
struct XsConfigurer;

impl BindingConfigurer for XsConfigurer {
    fn register_bindings(&self, bindings: &mut BindingMap) {
        for binding in xs_bindings() {
            bindings.put(binding.clone());
        }
    }
}

/// The shared configuration of the XSD namespace
pub fn xs_configuration() -> Arc<Configuration> {
    XS_CONFIGURATION.clone()
}
