//! Facets: named constraints attached to derived types
//!
//! A facet narrows the values a derived type accepts. Each facet only applies
//! to one primitive, so a derived type may only carry facets whose target
//! matches the primitive its base type resolves to.

use serde_json::Value;

use super::builtin::PrimitiveType;
use crate::records::RecordGraph;

/// Everything a facet may need to check a value.
#[derive(Clone, Copy, Default)]
pub struct FacetContext<'a> {
    /// Record graph for reference facets; reference checks pass without it
    pub records: Option<&'a RecordGraph>,
}

impl<'a> FacetContext<'a> {
    pub fn new(records: &'a RecordGraph) -> Self {
        Self {
            records: Some(records),
        }
    }
}

/// The closed set of supported facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    MinimumIntegerValue,
    MaximumIntegerValue,
    MinimumRealValue,
    MaximumRealValue,
    MaximumStringLength,
    RequiredReferenceAncestor,
}

impl Facet {
    pub const ALL: [Facet; 6] = [
        Facet::MinimumIntegerValue,
        Facet::MaximumIntegerValue,
        Facet::MinimumRealValue,
        Facet::MaximumRealValue,
        Facet::MaximumStringLength,
        Facet::RequiredReferenceAncestor,
    ];

    /// Key used in derived type facet maps
    pub fn key(&self) -> &'static str {
        match self {
            Facet::MinimumIntegerValue => "MinimumIntegerValue",
            Facet::MaximumIntegerValue => "MaximumIntegerValue",
            Facet::MinimumRealValue => "MinimumRealValue",
            Facet::MaximumRealValue => "MaximumRealValue",
            Facet::MaximumStringLength => "MaximumStringLength",
            Facet::RequiredReferenceAncestor => "RequiredReferenceAncestor",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Facet::MinimumIntegerValue => "Minimum Value",
            Facet::MaximumIntegerValue => "Maximum Value",
            Facet::MinimumRealValue => "Minimum Value",
            Facet::MaximumRealValue => "Maximum Value",
            Facet::MaximumStringLength => "Maximum Length",
            Facet::RequiredReferenceAncestor => "Required Ancestor",
        }
    }

    /// The primitive this facet can be attached to
    pub fn target_type(&self) -> PrimitiveType {
        match self {
            Facet::MinimumIntegerValue | Facet::MaximumIntegerValue => PrimitiveType::Integer,
            Facet::MinimumRealValue | Facet::MaximumRealValue => PrimitiveType::Real,
            Facet::MaximumStringLength => PrimitiveType::String,
            Facet::RequiredReferenceAncestor => PrimitiveType::Reference,
        }
    }

    /// Check that the facet value itself is well-formed.
    pub fn check_facet_value(&self, facet_value: &Value) -> Result<(), String> {
        let ok = match self {
            Facet::MinimumIntegerValue | Facet::MaximumIntegerValue => facet_value.is_i64(),
            Facet::MinimumRealValue | Facet::MaximumRealValue => facet_value.is_number(),
            Facet::MaximumStringLength => facet_value.is_u64(),
            Facet::RequiredReferenceAncestor => {
                facet_value.as_str().map(|s| !s.is_empty()).unwrap_or(false)
            }
        };

        if ok {
            Ok(())
        } else {
            let expected = match self {
                Facet::MinimumIntegerValue | Facet::MaximumIntegerValue => "an integer",
                Facet::MinimumRealValue | Facet::MaximumRealValue => "a number",
                Facet::MaximumStringLength => "a non-negative integer",
                Facet::RequiredReferenceAncestor => "a record id",
            };
            Err(format!(
                "Facet {} expects {}, got {}",
                self.key(),
                expected,
                facet_value
            ))
        }
    }

    /// Human-readable summary of the constraint
    pub fn describe(&self, facet_value: &Value) -> String {
        match self {
            Facet::MinimumIntegerValue | Facet::MinimumRealValue => format!("Min {}", facet_value),
            Facet::MaximumIntegerValue | Facet::MaximumRealValue => format!("Max {}", facet_value),
            Facet::MaximumStringLength => format!("Max Length {}", facet_value),
            Facet::RequiredReferenceAncestor => {
                format!("Descendant of {}", facet_value.as_str().unwrap_or_default())
            }
        }
    }

    /// Check `value` against this facet. Returns a problem description if the
    /// value violates the constraint.
    ///
    /// Values of the wrong shape are not this facet's concern and pass.
    pub fn validate_value(
        &self,
        ctx: &FacetContext<'_>,
        value: &Value,
        facet_value: &Value,
    ) -> Option<String> {
        match self {
            Facet::MinimumIntegerValue => {
                let (v, min) = (value.as_i64()?, facet_value.as_i64()?);
                (v < min).then(|| format!("Value must be at least {}.", min))
            }
            Facet::MaximumIntegerValue => {
                let (v, max) = (value.as_i64()?, facet_value.as_i64()?);
                (v > max).then(|| format!("Value must be at most {}.", max))
            }
            Facet::MinimumRealValue => {
                let (v, min) = (value.as_f64()?, facet_value.as_f64()?);
                (v < min).then(|| format!("Value must be at least {}.", min))
            }
            Facet::MaximumRealValue => {
                let (v, max) = (value.as_f64()?, facet_value.as_f64()?);
                (v > max).then(|| format!("Value must be at most {}.", max))
            }
            Facet::MaximumStringLength => {
                let (s, max) = (value.as_str()?, facet_value.as_u64()?);
                let len = s.chars().count() as u64;
                (len > max).then(|| format!("Value must be at most {} characters long.", max))
            }
            Facet::RequiredReferenceAncestor => {
                let (id, ancestor) = (value.as_str()?, facet_value.as_str()?);
                // An empty reference is "no reference".
                if id.is_empty() {
                    return None;
                }
                let records = ctx.records?;
                if id == ancestor || records.is_ancestor_of(ancestor, id) {
                    None
                } else {
                    Some(format!("Referenced record must be a descendant of {}.", ancestor))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_round_trip() {
        for facet in Facet::ALL {
            assert_eq!(Facet::from_key(facet.key()), Some(facet));
        }
        assert_eq!(Facet::from_key("MinimumValue"), None);
    }

    #[test]
    fn test_minimum_integer_value() {
        let ctx = FacetContext::default();
        let facet = Facet::MinimumIntegerValue;
        assert!(facet.validate_value(&ctx, &json!(5), &json!(3)).is_none());
        assert!(facet.validate_value(&ctx, &json!(3), &json!(3)).is_none());
        assert!(facet.validate_value(&ctx, &json!(2), &json!(3)).is_some());
    }

    #[test]
    fn test_maximum_string_length_counts_chars() {
        let ctx = FacetContext::default();
        let facet = Facet::MaximumStringLength;
        assert!(facet.validate_value(&ctx, &json!("äöü"), &json!(3)).is_none());
        assert!(facet.validate_value(&ctx, &json!("abcd"), &json!(3)).is_some());
    }

    #[test]
    fn test_check_facet_value() {
        assert!(Facet::MinimumIntegerValue.check_facet_value(&json!(1)).is_ok());
        assert!(Facet::MinimumIntegerValue.check_facet_value(&json!(1.5)).is_err());
        assert!(Facet::MaximumStringLength.check_facet_value(&json!(-1)).is_err());
        assert!(Facet::RequiredReferenceAncestor.check_facet_value(&json!("")).is_err());
    }

    #[test]
    fn test_required_reference_ancestor() {
        let mut records = RecordGraph::new();
        records.add_record_set("Records").unwrap();
        records.add_record("Weapons", "Weapons", "Records").unwrap();
        records.add_record("Sword", "Sword", "Records").unwrap();
        records.add_record("Apple", "Apple", "Records").unwrap();
        records.reparent_record("Sword", Some("Weapons")).unwrap();

        let ctx = FacetContext::new(&records);
        let facet = Facet::RequiredReferenceAncestor;
        assert!(facet.validate_value(&ctx, &json!("Sword"), &json!("Weapons")).is_none());
        assert!(facet.validate_value(&ctx, &json!("Weapons"), &json!("Weapons")).is_none());
        assert!(facet.validate_value(&ctx, &json!("Apple"), &json!("Weapons")).is_some());
        assert!(facet.validate_value(&ctx, &json!(""), &json!("Weapons")).is_none());
    }
}
