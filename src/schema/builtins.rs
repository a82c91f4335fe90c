//! XSD built-in types
//!
//! Every arena starts with the built-in type hierarchy rooted at
//! `xs:anyType`, which is registered first and is its own base.

use super::model::{
    ContentType, Derivation, Particle, Schema, SimpleVariety, Term, TypeDefinition, TypeKind,
    Wildcard,
};
use super::particles::Occurs;
use crate::namespaces::QName;
use crate::XSD_NAMESPACE;

/// Atomic built-ins as (name, base) pairs; every base precedes its subtypes
const ATOMIC_TYPES: &[(&str, &str)] = &[
    ("anySimpleType", "anyType"),
    ("string", "anySimpleType"),
    ("normalizedString", "string"),
    ("token", "normalizedString"),
    ("language", "token"),
    ("NMTOKEN", "token"),
    ("Name", "token"),
    ("NCName", "Name"),
    ("ID", "NCName"),
    ("IDREF", "NCName"),
    ("ENTITY", "NCName"),
    ("boolean", "anySimpleType"),
    ("decimal", "anySimpleType"),
    ("integer", "decimal"),
    ("long", "integer"),
    ("int", "long"),
    ("short", "int"),
    ("byte", "short"),
    ("nonNegativeInteger", "integer"),
    ("positiveInteger", "nonNegativeInteger"),
    ("unsignedLong", "nonNegativeInteger"),
    ("unsignedInt", "unsignedLong"),
    ("unsignedShort", "unsignedInt"),
    ("unsignedByte", "unsignedShort"),
    ("nonPositiveInteger", "integer"),
    ("negativeInteger", "nonPositiveInteger"),
    ("double", "anySimpleType"),
    ("float", "anySimpleType"),
    ("date", "anySimpleType"),
    ("dateTime", "anySimpleType"),
    ("time", "anySimpleType"),
    ("duration", "anySimpleType"),
    ("gYear", "anySimpleType"),
    ("gYearMonth", "anySimpleType"),
    ("gMonth", "anySimpleType"),
    ("gMonthDay", "anySimpleType"),
    ("gDay", "anySimpleType"),
    ("base64Binary", "anySimpleType"),
    ("hexBinary", "anySimpleType"),
    ("anyURI", "anySimpleType"),
    ("QName", "anySimpleType"),
    ("NOTATION", "anySimpleType"),
];

/// List built-ins as (name, item type) pairs
const LIST_TYPES: &[(&str, &str)] = &[
    ("NMTOKENS", "NMTOKEN"),
    ("IDREFS", "IDREF"),
    ("ENTITIES", "ENTITY"),
];

/// Qualified name of a built-in type
pub fn xs(local: &str) -> QName {
    QName::namespaced(XSD_NAMESPACE, local)
}

pub(crate) fn register_builtins(schema: &mut Schema) {
    let any_type = schema.add_type(TypeDefinition {
        name: Some(xs("anyType")),
        base: super::model::TypeId(0),
        derivation: Derivation::Restriction,
        kind: TypeKind::Complex {
            content: ContentType::Element(Particle {
                occurs: Occurs::zero_or_more(),
                term: Term::Any(Wildcard::any()),
            }),
            mixed: true,
            is_abstract: false,
            attributes: Vec::new(),
        },
    });
    debug_assert_eq!(any_type, schema.any_type());

    for (name, base) in ATOMIC_TYPES {
        let base = schema.type_by_name(&xs(base)).unwrap_or(any_type);
        schema.add_type(TypeDefinition {
            name: Some(xs(name)),
            base,
            derivation: Derivation::Restriction,
            kind: TypeKind::Simple(SimpleVariety::Atomic),
        });
    }

    let any_simple = schema.type_by_name(&xs("anySimpleType")).unwrap_or(any_type);
    for (name, item) in LIST_TYPES {
        let item = schema.type_by_name(&xs(item)).unwrap_or(any_simple);
        schema.add_type(TypeDefinition {
            name: Some(xs(name)),
            base: any_simple,
            derivation: Derivation::Restriction,
            kind: TypeKind::Simple(SimpleVariety::List(item)),
        });
    }
}
