//! Schema object model
//!
//! An arena of type definitions, element and attribute declarations built
//! from XSD documents, plus the hierarchy walker and the particle and
//! attribute queries the encoder and decoder run against it.

pub mod builtins;
pub mod model;
pub mod parsing;
pub mod particles;
pub mod walker;

pub use model::{
    AttributeDeclaration, AttributeId, AttributeUse, Compositor, ContentType, Derivation,
    ElementDeclaration, ElementId, ModelGroup, Particle, Schema, SimpleVariety, Term,
    TypeDefinition, TypeId, TypeKind, Wildcard, WildcardNamespace,
};
pub use parsing::{SchemaBuilder, SCHEMA_BUILD_LOCK};
pub use particles::Occurs;
pub use walker::{AnyParticle, Direction, ElementParticle, TypeWalker};
