//! Built-in primitive types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of primitive types every project knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveType {
    None,
    Boolean,
    Integer,
    Real,
    String,
    Color,
    Vector2I,
    Vector2R,
    Vector3I,
    Vector3R,
    /// Id of another record
    Reference,
}

impl PrimitiveType {
    /// All primitives in declaration order
    pub const ALL: [PrimitiveType; 11] = [
        PrimitiveType::None,
        PrimitiveType::Boolean,
        PrimitiveType::Integer,
        PrimitiveType::Real,
        PrimitiveType::String,
        PrimitiveType::Color,
        PrimitiveType::Vector2I,
        PrimitiveType::Vector2R,
        PrimitiveType::Vector3I,
        PrimitiveType::Vector3R,
        PrimitiveType::Reference,
    ];

    /// Type name as used in type references
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::None => "None",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Integer => "Integer",
            PrimitiveType::Real => "Real",
            PrimitiveType::String => "String",
            PrimitiveType::Color => "Color",
            PrimitiveType::Vector2I => "Vector2I",
            PrimitiveType::Vector2R => "Vector2R",
            PrimitiveType::Vector3I => "Vector3I",
            PrimitiveType::Vector3R => "Vector3R",
            PrimitiveType::Reference => "Reference",
        }
    }

    /// Look up a primitive by its exact (case-sensitive) name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Vector2I
                | PrimitiveType::Vector2R
                | PrimitiveType::Vector3I
                | PrimitiveType::Vector3R
        )
    }

    /// Number of components for vector types, zero otherwise
    pub fn dimensions(&self) -> usize {
        match self {
            PrimitiveType::Vector2I | PrimitiveType::Vector2R => 2,
            PrimitiveType::Vector3I | PrimitiveType::Vector3R => 3,
            _ => 0,
        }
    }

    /// Whether vector components are integers
    pub fn has_integer_components(&self) -> bool {
        matches!(self, PrimitiveType::Vector2I | PrimitiveType::Vector3I)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrimitiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("'{}' is not a built-in type", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for t in PrimitiveType::ALL {
            assert_eq!(t.as_str().parse::<PrimitiveType>().unwrap(), t);
        }
    }

    #[test]
    fn test_names_are_case_sensitive() {
        assert!(PrimitiveType::from_name("integer").is_none());
        assert_eq!(PrimitiveType::from_name("Integer"), Some(PrimitiveType::Integer));
    }

    #[test]
    fn test_vectors() {
        let vectors: Vec<_> = PrimitiveType::ALL.iter().filter(|t| t.is_vector()).collect();
        assert_eq!(vectors.len(), 4);
        assert_eq!(PrimitiveType::Vector3R.dimensions(), 3);
        assert!(PrimitiveType::Vector2I.has_integer_components());
        assert!(!PrimitiveType::Vector2R.has_integer_components());
    }
}
