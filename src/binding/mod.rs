//! Bindings between schema components and runtime values
//!
//! A [`Binding`] is registered under the qualified name of a type or a
//! global element. For any element the engine assembles a chain of
//! bindings by walking the element's type hierarchy ([`BindingWalker`]);
//! parsing and encoding run the chain from the most general type down,
//! property lookups run it from the most specific type up.

pub mod builtins;
pub mod loader;
pub mod registry;
pub mod walker;

pub use loader::BindingLoader;
pub use registry::{build_binding_map, BindingDescriptor, BindingFactory, BindingMap, ChainPolicy};
pub use walker::{chain_properties, chain_property, BindingWalker};

use crate::context::Context;
use crate::decoder::Node;
use crate::documents::Element;
use crate::error::Result;
use crate::namespaces::QName;
use crate::schema::ElementDeclaration;
use crate::value::{Value, ValueType};
use std::any::TypeId;
use std::fmt;

/// Where a binding runs relative to the bindings of its base types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run alone; base type bindings are not consulted
    Override,
    /// Run after the base type bindings
    #[default]
    After,
    /// Run before the base type bindings
    Before,
}

/// Strategy translating between one schema component and runtime values
///
/// Every hook has a pass-through default, so a binding implements only
/// the directions it supports. Errors raised by hooks are not caught by
/// the engine.
pub trait Binding: fmt::Debug + Send + Sync + 'static {
    /// Qualified name of the type or element this binding is for
    fn target(&self) -> QName;

    /// Identity within a chain: extending a chain with a binding whose
    /// identity is already registered there has no effect
    ///
    /// Defaults to the concrete type. Types whose instances behave
    /// differently depending on their fields should return a distinct
    /// identity per configuration.
    fn identity(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Type of the values this binding produces and accepts
    fn value_type(&self) -> Option<ValueType> {
        None
    }

    /// Placement relative to base type bindings
    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::After
    }

    /// Tie-breaker among equally specific bindings; lower sorts first
    fn ordering(&self) -> Option<i64> {
        None
    }

    /// Called when an element starts, before its children are parsed
    fn initialize(&self, _node: &Node, _context: &mut Context) -> Result<()> {
        Ok(())
    }

    /// Turn a parsed node into a value; `value` is what the previous
    /// binding in the chain produced
    fn parse(&self, _node: &Node, value: Value) -> Result<Value> {
        Ok(value)
    }

    /// Populate the element shell for `value`
    fn encode(&self, _value: &Value, _element: &mut Element) -> Result<()> {
        Ok(())
    }

    /// Lexical form of the simple content of `value`; `text` is what the
    /// previous binding in the chain produced
    fn encode_text(&self, _value: &Value, text: Option<String>) -> Result<Option<String>> {
        Ok(text)
    }

    /// Value of the child or attribute `name` of `value`
    ///
    /// `None` means this binding does not know the property;
    /// `Some(Value::Null)` means the property is known to be absent.
    fn property(&self, _value: &Value, _name: &QName) -> Result<Option<Value>> {
        Ok(None)
    }

    /// Additional child properties not tied to a declared particle
    fn properties(&self, _value: &Value, _element: &ElementDeclaration) -> Result<Vec<(QName, Value)>> {
        Ok(Vec::new())
    }
}
