//! Particle occurrence bounds
//!
//! Particles define occurrence constraints (minOccurs, maxOccurs) for
//! elements, groups and wildcards.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#p

use crate::error::{ParseError, Result};
use std::fmt;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if particle has maxOccurs == 1
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if maxOccurs is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }

    /// Check if particle can have multiple occurrences
    pub fn is_multiple(&self) -> bool {
        !self.is_empty() && !self.is_single()
    }

    /// Effective bounds of a particle nested in a group occurring `outer` times
    ///
    /// A single particle inside a repeating group repeats with the group;
    /// an optional group makes its content optional.
    pub fn within(self, outer: Occurs) -> Occurs {
        let min = if outer.min == 0 { 0 } else { self.min };
        let max = if self.is_single() { outer.max } else { self.max };
        Occurs::new(min, max)
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}..unbounded", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        match min_str.trim().parse::<u32>() {
            Ok(min) => occurs.min = min,
            Err(_) => {
                return Err(ParseError::new(
                    "minOccurs value is not a valid non-negative integer",
                )
                .into())
            }
        }
    }

    if let Some(max_str) = max_occurs {
        let max_str = max_str.trim();
        if max_str == "unbounded" {
            occurs.max = None;
        } else {
            match max_str.parse::<u32>() {
                Ok(max) => {
                    if occurs.min > max {
                        return Err(ParseError::new(
                            "maxOccurs must be 'unbounded' or greater than minOccurs",
                        )
                        .into());
                    }
                    occurs.max = Some(max);
                }
                Err(_) => {
                    return Err(ParseError::new(
                        "maxOccurs value must be a non-negative integer or 'unbounded'",
                    )
                    .into())
                }
            }
        }
    } else if occurs.min > 1 {
        // maxOccurs defaults to 1
        return Err(ParseError::new("minOccurs must be lesser or equal than maxOccurs").into());
    }

    Ok(occurs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs_predicates() {
        assert!(Occurs::once().is_single());
        assert!(Occurs::optional().is_emptiable());
        assert!(Occurs::zero_or_more().is_multiple());
        assert!(Occurs::zero_or_more().is_unbounded());
        assert!(Occurs::new(0, Some(0)).is_empty());
        assert!(!Occurs::new(0, Some(0)).is_multiple());
        assert!(Occurs::new(2, Some(3)).is_multiple());
    }

    #[test]
    fn test_parse_occurs() {
        assert_eq!(parse_occurs(None, None).unwrap(), Occurs::once());
        assert_eq!(
            parse_occurs(Some("0"), Some("unbounded")).unwrap(),
            Occurs::zero_or_more()
        );
        assert_eq!(
            parse_occurs(Some("2"), Some("5")).unwrap(),
            Occurs::new(2, Some(5))
        );
        assert!(parse_occurs(Some("-1"), None).is_err());
        assert!(parse_occurs(Some("3"), Some("2")).is_err());
        assert!(parse_occurs(Some("2"), None).is_err());
        assert!(parse_occurs(None, Some("many")).is_err());
    }

    #[test]
    fn test_single_particle_inherits_group_max() {
        let effective = Occurs::once().within(Occurs::zero_or_more());
        assert_eq!(effective, Occurs::zero_or_more());

        let effective = Occurs::new(1, Some(4)).within(Occurs::zero_or_more());
        assert_eq!(effective, Occurs::new(0, Some(4)));

        let effective = Occurs::once().within(Occurs::once());
        assert_eq!(effective, Occurs::once());
    }

    #[test]
    fn test_display() {
        assert_eq!(Occurs::zero_or_more().to_string(), "0..unbounded");
        assert_eq!(Occurs::once().to_string(), "1..1");
    }
}
