//! Type hierarchy walking and the schema queries built on it
//!
//! [`TypeWalker`] visits a type and its base types in either direction.
//! The particle and attribute queries collect across the whole chain,
//! base types first, so content declared by a base type precedes content
//! added by its extensions.

use super::model::{
    AttributeId, Compositor, ContentType, Derivation, ElementId, Particle, Schema, SimpleVariety,
    Term, TypeId, TypeKind, Wildcard,
};
use super::particles::Occurs;
use crate::namespaces::QName;
use std::collections::HashSet;

/// Walk direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the type towards the root of the hierarchy
    Up,
    /// From the root of the hierarchy down to the type
    Down,
}

/// Walks a type hierarchy, calling a visitor per level
pub struct TypeWalker<'s> {
    schema: &'s Schema,
}

impl<'s> TypeWalker<'s> {
    /// Create a walker over `schema`
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    /// The hierarchy of `start`, most specific first
    ///
    /// Ends at the first type that is its own base.
    pub fn hierarchy(&self, start: TypeId) -> Vec<TypeId> {
        let mut chain = vec![start];
        let mut seen = HashSet::from([start]);
        let mut current = start;
        loop {
            let base = self.schema.base_type(current);
            if base == current || !seen.insert(base) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Visit the hierarchy of `start` in `direction` until the visitor
    /// returns false
    pub fn walk(&self, start: TypeId, direction: Direction, mut visitor: impl FnMut(TypeId) -> bool) {
        let mut chain = self.hierarchy(start);
        if direction == Direction::Down {
            chain.reverse();
        }
        for type_id in chain {
            if !visitor(type_id) {
                break;
            }
        }
    }
}

/// An element particle with its effective occurrence bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementParticle {
    /// Element declaration as written in the content model (may be a reference)
    pub element: ElementId,
    /// Bounds after accounting for enclosing groups
    pub occurs: Occurs,
}

/// A wildcard particle with its effective occurrence bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyParticle {
    /// The wildcard
    pub wildcard: Wildcard,
    /// Bounds after accounting for enclosing groups
    pub occurs: Occurs,
}

fn flatten(
    particle: &Particle,
    outer: Occurs,
    in_choice: bool,
    elements: &mut Vec<ElementParticle>,
    wildcards: &mut Vec<AnyParticle>,
) {
    let mut occurs = particle.occurs.within(outer);
    if in_choice {
        occurs.min = 0;
    }
    match &particle.term {
        Term::Element(element) => elements.push(ElementParticle {
            element: *element,
            occurs,
        }),
        Term::Group(group) => {
            let choice = group.compositor == Compositor::Choice;
            for child in &group.particles {
                flatten(child, occurs, choice, elements, wildcards);
            }
        }
        Term::Any(wildcard) => wildcards.push(AnyParticle {
            wildcard: wildcard.clone(),
            occurs,
        }),
    }
}

impl Schema {
    fn content_levels(&self, type_id: TypeId, include_parents: bool) -> Vec<TypeId> {
        if !include_parents {
            return vec![type_id];
        }
        let mut levels = Vec::new();
        TypeWalker::new(self).walk(type_id, Direction::Down, |level| {
            // a restriction restates the whole content model
            if self.type_definition(level).derivation == Derivation::Restriction {
                levels.clear();
            }
            levels.push(level);
            true
        });
        levels
    }

    fn particles_of(&self, type_id: TypeId, include_parents: bool) -> (Vec<ElementParticle>, Vec<AnyParticle>) {
        let mut elements = Vec::new();
        let mut wildcards = Vec::new();
        for level in self.content_levels(type_id, include_parents) {
            if level == self.any_type() && type_id != level {
                continue;
            }
            if let Some(particle) = self.type_definition(level).particle() {
                flatten(particle, Occurs::once(), false, &mut elements, &mut wildcards);
            }
        }
        (elements, wildcards)
    }

    /// Element particles of a type's content model, flattened, in
    /// declaration order and without duplicates
    pub fn child_element_particles(&self, type_id: TypeId, include_parents: bool) -> Vec<ElementParticle> {
        let (elements, _) = self.particles_of(type_id, include_parents);
        let mut seen = HashSet::new();
        elements
            .into_iter()
            .filter(|p| seen.insert(self.resolved_element(p.element)))
            .collect()
    }

    /// Child element particle with the given local name
    pub fn child_element_particle(
        &self,
        type_id: TypeId,
        local_name: &str,
        include_parents: bool,
    ) -> Option<ElementParticle> {
        self.child_element_particles(type_id, include_parents)
            .into_iter()
            .find(|p| self.element(self.resolved_element(p.element)).name.local_name == local_name)
    }

    /// Wildcard particles of a type, base types included; the ur-type's
    /// own wildcard is never reported
    pub fn any_element_particles(&self, type_id: TypeId) -> Vec<AnyParticle> {
        if type_id == self.any_type() {
            return Vec::new();
        }
        self.particles_of(type_id, true).1
    }

    /// Attribute declarations of a type; a redeclaration in a derived type
    /// replaces the base declaration of the same name in place
    pub fn attribute_declarations(&self, type_id: TypeId, include_parents: bool) -> Vec<AttributeId> {
        let levels = if include_parents {
            let mut levels = TypeWalker::new(self).hierarchy(type_id);
            levels.reverse();
            levels
        } else {
            vec![type_id]
        };

        let mut result: Vec<AttributeId> = Vec::new();
        for level in levels {
            for attribute_use in self.type_definition(level).attribute_uses() {
                let name = &self.attribute(attribute_use.attribute).name;
                match result.iter().position(|a| self.attribute(*a).name == *name) {
                    Some(index) => result[index] = attribute_use.attribute,
                    None => result.push(attribute_use.attribute),
                }
            }
        }
        result
    }

    /// The type named `name` in the hierarchy of `type_id`, searching upwards
    pub fn base_type_definition(&self, type_id: TypeId, name: &QName) -> Option<TypeId> {
        let mut found = None;
        TypeWalker::new(self).walk(type_id, Direction::Up, |level| {
            if self.type_name(level) == Some(name) {
                found = Some(level);
                return false;
            }
            true
        });
        found
    }

    /// True when `base`'s type appears in the hierarchy of `derived`'s type
    pub fn is_base_type(&self, derived: ElementId, base: ElementId) -> bool {
        let derived_type = self.element(self.resolved_element(derived)).type_id;
        let base_type = self.element(self.resolved_element(base)).type_id;
        TypeWalker::new(self).hierarchy(derived_type).contains(&base_type)
    }

    /// Global elements whose type derives from the type of `element`
    pub fn derived_element_declarations(&self, element: ElementId) -> Vec<ElementId> {
        let element = self.resolved_element(element);
        self.global_elements()
            .map(|(_, id)| id)
            .filter(|id| *id != element && self.is_base_type(*id, element))
            .collect()
    }

    /// True when the (resolved) declaration's name agrees with `name`
    pub fn name_matches(&self, element: ElementId, name: &QName) -> bool {
        self.element(self.resolved_element(element)).name.matches(name)
    }

    /// Declaration of a child named `name` of an element of type
    /// `parent_type`: direct children first, then members of their
    /// substitution groups
    pub fn child_element_declaration(&self, parent_type: TypeId, name: &QName) -> Option<ElementId> {
        let children = self.child_element_particles(parent_type, true);
        for particle in &children {
            let resolved = self.resolved_element(particle.element);
            if self.element(resolved).name == *name {
                return Some(resolved);
            }
        }
        for particle in &children {
            if self.name_matches(particle.element, name) {
                return Some(self.resolved_element(particle.element));
            }
        }
        for particle in &children {
            for member in self.substitution_group(particle.element) {
                if self.name_matches(member, name) {
                    return Some(member);
                }
            }
        }
        None
    }

    /// Simple type carrying the text content of `type_id`
    pub fn simple_content_type(&self, type_id: TypeId) -> Option<TypeId> {
        match &self.type_definition(type_id).kind {
            TypeKind::Simple(_) => Some(type_id),
            TypeKind::Complex {
                content: ContentType::Simple(simple),
                ..
            } => Some(*simple),
            TypeKind::Complex { .. } => None,
        }
    }

    /// Item type when `type_id` is (derived from) a list type
    pub fn list_item_type(&self, type_id: TypeId) -> Option<TypeId> {
        TypeWalker::new(self)
            .hierarchy(type_id)
            .into_iter()
            .find_map(|level| match &self.type_definition(level).kind {
                TypeKind::Simple(SimpleVariety::List(item)) => Some(*item),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtins::xs;
    use crate::schema::model::{AttributeDeclaration, AttributeUse, ElementDeclaration, ModelGroup, TypeDefinition};

    fn sequence(particles: Vec<Particle>, occurs: Occurs) -> Particle {
        Particle {
            occurs,
            term: Term::Group(ModelGroup {
                compositor: Compositor::Sequence,
                particles,
            }),
        }
    }

    fn local(schema: &mut Schema, name: &str, type_id: TypeId) -> ElementId {
        let mut decl = ElementDeclaration::new(QName::local(name), type_id);
        decl.global = false;
        schema.add_element(decl)
    }

    fn attribute(schema: &mut Schema, name: &str) -> AttributeUse {
        let string = schema.type_by_name(&xs("string")).unwrap();
        let id = schema.add_attribute(AttributeDeclaration {
            name: QName::local(name),
            type_id: string,
            global: false,
            default: None,
            fixed: None,
        });
        AttributeUse {
            attribute: id,
            required: false,
        }
    }

    /// Base { a, b } with attribute x; Derived extends Base with { c } and
    /// redeclares x; Restricted restricts Base to { a }
    fn hierarchy() -> (Schema, TypeId, TypeId, TypeId) {
        let mut schema = Schema::new();
        let string = schema.type_by_name(&xs("string")).unwrap();
        let any = schema.any_type();

        let a = local(&mut schema, "a", string);
        let b = local(&mut schema, "b", string);
        let x = attribute(&mut schema, "x");
        let base = schema.add_type(TypeDefinition {
            name: Some(QName::local("Base")),
            base: any,
            derivation: Derivation::Restriction,
            kind: TypeKind::Complex {
                content: ContentType::Element(sequence(
                    vec![
                        Particle::element(a, Occurs::once()),
                        Particle::element(b, Occurs::optional()),
                    ],
                    Occurs::once(),
                )),
                mixed: false,
                is_abstract: false,
                attributes: vec![x],
            },
        });

        let c = local(&mut schema, "c", string);
        let x2 = attribute(&mut schema, "x");
        let y = attribute(&mut schema, "y");
        let derived = schema.add_type(TypeDefinition {
            name: Some(QName::local("Derived")),
            base,
            derivation: Derivation::Extension,
            kind: TypeKind::Complex {
                content: ContentType::Element(sequence(
                    vec![Particle::element(c, Occurs::once())],
                    Occurs::zero_or_more(),
                )),
                mixed: false,
                is_abstract: false,
                attributes: vec![y, x2],
            },
        });

        let a2 = local(&mut schema, "a", string);
        let restricted = schema.add_type(TypeDefinition {
            name: Some(QName::local("Restricted")),
            base,
            derivation: Derivation::Restriction,
            kind: TypeKind::Complex {
                content: ContentType::Element(sequence(
                    vec![Particle::element(a2, Occurs::once())],
                    Occurs::once(),
                )),
                mixed: false,
                is_abstract: false,
                attributes: Vec::new(),
            },
        });

        (schema, base, derived, restricted)
    }

    fn names(schema: &Schema, particles: &[ElementParticle]) -> Vec<String> {
        particles
            .iter()
            .map(|p| schema.element(p.element).name.local_name.clone())
            .collect()
    }

    #[test]
    fn test_walk_directions() {
        let (schema, base, derived, _) = hierarchy();
        let walker = TypeWalker::new(&schema);

        let mut up = Vec::new();
        walker.walk(derived, Direction::Up, |t| {
            up.push(t);
            true
        });
        assert_eq!(up, vec![derived, base, schema.any_type()]);

        let mut down = Vec::new();
        walker.walk(derived, Direction::Down, |t| {
            down.push(t);
            t != base
        });
        assert_eq!(down, vec![schema.any_type(), base]);
    }

    #[test]
    fn test_child_particles_base_first() {
        let (schema, base, derived, _) = hierarchy();
        let particles = schema.child_element_particles(derived, true);
        assert_eq!(names(&schema, &particles), vec!["a", "b", "c"]);
        // single particle inside a repeating group repeats with it
        assert_eq!(particles[2].occurs, Occurs::zero_or_more());
        assert_eq!(particles[1].occurs, Occurs::optional());

        let own = schema.child_element_particles(derived, false);
        assert_eq!(names(&schema, &own), vec!["c"]);
        assert_eq!(schema.child_element_particles(base, true).len(), 2);
    }

    #[test]
    fn test_restriction_replaces_base_particles() {
        let (schema, _, _, restricted) = hierarchy();
        let particles = schema.child_element_particles(restricted, true);
        assert_eq!(names(&schema, &particles), vec!["a"]);
    }

    #[test]
    fn test_attribute_redeclaration_replaces_in_place() {
        let (schema, _, derived, _) = hierarchy();
        let attributes = schema.attribute_declarations(derived, true);
        let names: Vec<_> = attributes
            .iter()
            .map(|a| schema.attribute(*a).name.local_name.clone())
            .collect();
        assert_eq!(names, vec!["x", "y"]);
        // the derived declaration wins
        assert_eq!(attributes[0], schema.attribute_declarations(derived, false)[1]);
    }

    #[test]
    fn test_base_type_definition() {
        let (schema, base, derived, _) = hierarchy();
        assert_eq!(schema.base_type_definition(derived, &QName::local("Base")), Some(base));
        assert_eq!(schema.base_type_definition(base, &QName::local("Derived")), None);
    }

    #[test]
    fn test_choice_members_are_optional() {
        let mut schema = Schema::new();
        let string = schema.type_by_name(&xs("string")).unwrap();
        let a = local(&mut schema, "a", string);
        let b = local(&mut schema, "b", string);
        let choice = Particle {
            occurs: Occurs::once(),
            term: Term::Group(ModelGroup {
                compositor: Compositor::Choice,
                particles: vec![
                    Particle::element(a, Occurs::once()),
                    Particle::element(b, Occurs::once()),
                ],
            }),
        };
        let any = schema.any_type();
        let t = schema.add_type(TypeDefinition {
            name: None,
            base: any,
            derivation: Derivation::Restriction,
            kind: TypeKind::Complex {
                content: ContentType::Element(choice),
                mixed: false,
                is_abstract: false,
                attributes: Vec::new(),
            },
        });
        let particles = schema.child_element_particles(t, true);
        assert!(particles.iter().all(|p| p.occurs == Occurs::optional()));
        assert!(schema.any_element_particles(t).is_empty());
        assert!(schema.any_element_particles(schema.any_type()).is_empty());
    }

    #[test]
    fn test_child_declaration_through_substitution() {
        let mut schema = Schema::new();
        let string = schema.type_by_name(&xs("string")).unwrap();
        let head = schema.add_element(ElementDeclaration::new(QName::namespaced("urn:t", "Head"), string));
        let member = schema.add_element(ElementDeclaration::new(QName::namespaced("urn:t", "Member"), string));
        schema.extend_substitution_group(head, member);

        let mut reference = ElementDeclaration::new(QName::namespaced("urn:t", "Head"), string);
        reference.global = false;
        reference.reference = Some(head);
        let reference = schema.add_element(reference);
        let any = schema.any_type();
        let parent = schema.add_type(TypeDefinition {
            name: None,
            base: any,
            derivation: Derivation::Restriction,
            kind: TypeKind::Complex {
                content: ContentType::Element(sequence(
                    vec![Particle::element(reference, Occurs::once())],
                    Occurs::once(),
                )),
                mixed: false,
                is_abstract: false,
                attributes: Vec::new(),
            },
        });

        assert_eq!(
            schema.child_element_declaration(parent, &QName::namespaced("urn:t", "Head")),
            Some(head)
        );
        assert_eq!(
            schema.child_element_declaration(parent, &QName::namespaced("urn:t", "Member")),
            Some(member)
        );
        assert_eq!(schema.child_element_declaration(parent, &QName::local("Other")), None);
        assert!(schema.is_base_type(member, head));
        assert_eq!(schema.derived_element_declarations(head), vec![member]);
    }
}
