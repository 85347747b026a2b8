//! Typed field values
//!
//! Values are stored as `serde_json::Value`, shaped by the primitive their
//! type resolves to:
//!
//! | Type              | Stored as                          | Canonical text |
//! |-------------------|------------------------------------|----------------|
//! | None              | `null`                             | empty          |
//! | Boolean           | bool                               | `True`/`False` |
//! | Integer / Real    | number                             | decimal        |
//! | String, Reference | string                             | raw            |
//! | Color             | `"#RRGGBB"` or `"#RRGGBBAA"`       | upper-cased    |
//! | Vector*           | `{"x":..,"y":..(,"z":..)}`         | `(x, y, z)`    |
//! | Enumeration       | string                             | raw            |
//! | List              | array                              | items joined by [`LIST_SEPARATOR`] |
//! | Map               | object keyed by canonical key text | `key: value` joined by [`LIST_SEPARATOR`] |

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

use crate::error::{Result, TomeError};
use crate::records::RecordGraph;
use crate::types::{CustomTypeKind, Facet, FacetContext, PrimitiveType, TypeRegistry};

/// Separator between rendered list items and map entries
pub const LIST_SEPARATOR: &str = ", ";

/// Separator between a rendered map key and its value
pub const MAP_ENTRY_SEPARATOR: &str = ": ";

const VECTOR_AXES: [&str; 3] = ["x", "y", "z"];

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^#([0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$").expect("color pattern is valid")
    })
}

/// Converts values between their stored and textual forms for a given
/// type registry.
pub struct ValueConverter<'a> {
    types: &'a TypeRegistry,
}

impl<'a> ValueConverter<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Self { types }
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render a value canonically. Values whose shape does not match the
    /// type fall back to their JSON text.
    pub fn value_to_string(&self, value: &Value, type_name: &str) -> String {
        if let Some(custom) = self.types.custom_type(type_name) {
            match &custom.kind {
                CustomTypeKind::List { item_type } => {
                    if let Value::Array(items) = value {
                        return items
                            .iter()
                            .map(|item| self.value_to_string(item, item_type))
                            .collect::<Vec<_>>()
                            .join(LIST_SEPARATOR);
                    }
                }
                CustomTypeKind::Map { value_type, .. } => {
                    if let Value::Object(entries) = value {
                        return entries
                            .iter()
                            .map(|(k, v)| {
                                format!("{}{}{}", k, MAP_ENTRY_SEPARATOR, self.value_to_string(v, value_type))
                            })
                            .collect::<Vec<_>>()
                            .join(LIST_SEPARATOR);
                    }
                }
                CustomTypeKind::Enumeration { .. } | CustomTypeKind::Derived { .. } => {}
            }
        }

        match self.types.resolve_primitive(type_name) {
            Some(primitive) => primitive_to_string(value, primitive),
            None => scalar_to_string(value),
        }
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    /// Parse string-encoded text (default values, imported cells) as a
    /// value of `type_name`.
    pub fn string_to_value(&self, text: &str, type_name: &str) -> Result<Value> {
        if let Some(custom) = self.types.custom_type(type_name) {
            match &custom.kind {
                CustomTypeKind::List { .. } => return parse_container(text, type_name, true),
                CustomTypeKind::Map { .. } => return parse_container(text, type_name, false),
                CustomTypeKind::Enumeration { .. } | CustomTypeKind::Derived { .. } => {}
            }
        }

        let primitive = self
            .types
            .resolve_primitive(type_name)
            .ok_or_else(|| TomeError::UnknownTypeReference(type_name.to_string()))?;
        parse_primitive(text, primitive, type_name)
    }

    /// Neutral value for a type: zero, empty string, empty container or the
    /// first enumeration value.
    pub fn default_value(&self, type_name: &str) -> Value {
        if let Some(custom) = self.types.custom_type(type_name) {
            match &custom.kind {
                CustomTypeKind::List { .. } => return Value::Array(Vec::new()),
                CustomTypeKind::Map { .. } => return Value::Object(Map::new()),
                CustomTypeKind::Enumeration { values } => {
                    return Value::String(values.first().cloned().unwrap_or_default())
                }
                CustomTypeKind::Derived { .. } => {}
            }
        }

        match self.types.resolve_primitive(type_name) {
            Some(PrimitiveType::Boolean) => Value::Bool(false),
            Some(PrimitiveType::Integer) => Value::from(0),
            Some(PrimitiveType::Real) => Value::from(0.0),
            Some(PrimitiveType::Color) => Value::String("#000000FF".to_string()),
            Some(p) if p.is_vector() => vector_value(p, &[0.0; 3][..p.dimensions()]),
            Some(PrimitiveType::String) | Some(PrimitiveType::Reference) => Value::String(String::new()),
            _ => Value::Null,
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check a stored value against its type: JSON shape, enumeration
    /// membership and the facets of every derived type in the chain.
    /// Returns one description per problem found.
    pub fn validate_value(&self, value: &Value, type_name: &str, records: Option<&RecordGraph>) -> Vec<String> {
        let mut problems = Vec::new();
        let ctx = FacetContext { records };
        self.collect_problems(value, type_name, &ctx, &mut problems);
        problems
    }

    fn collect_problems(&self, value: &Value, type_name: &str, ctx: &FacetContext<'_>, problems: &mut Vec<String>) {
        if let Some(custom) = self.types.custom_type(type_name) {
            match &custom.kind {
                CustomTypeKind::Enumeration { values } => {
                    match value.as_str() {
                        Some(s) if values.iter().any(|v| v == s) => {}
                        Some(s) => problems.push(format!("'{}' is not a value of {}.", s, type_name)),
                        None => problems.push(format!("Expected a value of {}, got {}.", type_name, value)),
                    }
                    return;
                }
                CustomTypeKind::List { item_type } => {
                    match value {
                        Value::Array(items) => {
                            for item in items {
                                self.collect_problems(item, item_type, ctx, problems);
                            }
                        }
                        other => problems.push(format!("Expected a list, got {}.", other)),
                    }
                    return;
                }
                CustomTypeKind::Map { key_type, value_type } => {
                    match value {
                        Value::Object(entries) => {
                            for (key, entry) in entries {
                                if self.string_to_value(key, key_type).is_err() {
                                    problems.push(format!("'{}' is not a valid {} key.", key, key_type));
                                }
                                self.collect_problems(entry, value_type, ctx, problems);
                            }
                        }
                        other => problems.push(format!("Expected a map, got {}.", other)),
                    }
                    return;
                }
                CustomTypeKind::Derived { .. } => {}
            }
        }

        let Some(primitive) = self.types.resolve_primitive(type_name) else {
            problems.push(format!("Type {} does not exist.", type_name));
            return;
        };
        if let Err(reason) = check_primitive_shape(value, primitive) {
            problems.push(reason);
            return;
        }

        for derived in self.types.derived_chain(type_name) {
            let CustomTypeKind::Derived { facets, .. } = &derived.kind else {
                continue;
            };
            for (key, facet_value) in facets {
                if let Some(facet) = Facet::from_key(key) {
                    if let Some(problem) = facet.validate_value(ctx, value, facet_value) {
                        problems.push(problem);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Primitive helpers
// =============================================================================

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn primitive_to_string(value: &Value, primitive: PrimitiveType) -> String {
    match primitive {
        PrimitiveType::None => String::new(),
        PrimitiveType::Boolean => match value.as_bool() {
            Some(true) => "True".to_string(),
            Some(false) => "False".to_string(),
            None => scalar_to_string(value),
        },
        PrimitiveType::Real => match value.as_f64() {
            Some(f) => f.to_string(),
            None => scalar_to_string(value),
        },
        PrimitiveType::Color => scalar_to_string(value).to_uppercase(),
        p if p.is_vector() => match value.as_object() {
            Some(components) => {
                let parts: Vec<String> = VECTOR_AXES[..p.dimensions()]
                    .iter()
                    .map(|axis| components.get(*axis).map(scalar_to_string).unwrap_or_default())
                    .collect();
                format!("({})", parts.join(", "))
            }
            None => scalar_to_string(value),
        },
        _ => scalar_to_string(value),
    }
}

fn vector_value(primitive: PrimitiveType, components: &[f64]) -> Value {
    let mut object = Map::new();
    for (axis, component) in VECTOR_AXES.iter().zip(components) {
        let number = if primitive.has_integer_components() {
            Value::from(*component as i64)
        } else {
            Number::from_f64(*component).map(Value::Number).unwrap_or(Value::Null)
        };
        object.insert(axis.to_string(), number);
    }
    Value::Object(object)
}

fn parse_primitive(text: &str, primitive: PrimitiveType, type_name: &str) -> Result<Value> {
    let invalid = |reason: &str| TomeError::invalid_value(type_name, text, reason);
    let trimmed = text.trim();

    match primitive {
        PrimitiveType::None => Ok(Value::Null),
        PrimitiveType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(invalid("expected True or False"))
            }
        }
        PrimitiveType::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("expected an integer")),
        PrimitiveType::Real => {
            let f = trimmed.parse::<f64>().map_err(|_| invalid("expected a number"))?;
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| invalid("expected a finite number"))
        }
        PrimitiveType::String | PrimitiveType::Reference => Ok(Value::String(text.to_string())),
        PrimitiveType::Color => {
            if color_pattern().is_match(trimmed) {
                Ok(Value::String(trimmed.to_uppercase()))
            } else {
                Err(invalid("expected #RRGGBB or #RRGGBBAA"))
            }
        }
        p => {
            let inner = trimmed.trim_start_matches('(').trim_end_matches(')');
            let parts: Vec<&str> = inner
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .collect();
            if parts.len() != p.dimensions() {
                return Err(invalid(&format!("expected {} components", p.dimensions())));
            }

            let mut components = Vec::with_capacity(parts.len());
            for part in parts {
                let component = if p.has_integer_components() {
                    part.parse::<i64>().map(|i| i as f64).map_err(|_| invalid("expected integer components"))?
                } else {
                    part.parse::<f64>().map_err(|_| invalid("expected numeric components"))?
                };
                components.push(component);
            }
            Ok(vector_value(p, &components))
        }
    }
}

fn parse_container(text: &str, type_name: &str, is_list: bool) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(if is_list {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        });
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| TomeError::invalid_value(type_name, text, e.to_string()))?;
    match (&value, is_list) {
        (Value::Array(_), true) | (Value::Object(_), false) => Ok(value),
        _ => Err(TomeError::invalid_value(
            type_name,
            text,
            if is_list { "expected a JSON array" } else { "expected a JSON object" },
        )),
    }
}

fn check_primitive_shape(value: &Value, primitive: PrimitiveType) -> std::result::Result<(), String> {
    let ok = match primitive {
        PrimitiveType::None => value.is_null(),
        PrimitiveType::Boolean => value.is_boolean(),
        PrimitiveType::Integer => value.is_i64() || value.is_u64(),
        PrimitiveType::Real => value.is_number(),
        PrimitiveType::String | PrimitiveType::Reference => value.is_string(),
        PrimitiveType::Color => value.as_str().map(|s| color_pattern().is_match(s)).unwrap_or(false),
        p => value
            .as_object()
            .map(|components| {
                components.len() == p.dimensions()
                    && VECTOR_AXES[..p.dimensions()].iter().all(|axis| {
                        components
                            .get(*axis)
                            .map(|c| if p.has_integer_components() { c.is_i64() } else { c.is_number() })
                            .unwrap_or(false)
                    })
            })
            .unwrap_or(false),
    };

    if ok {
        Ok(())
    } else {
        Err(format!("Expected a {} value, got {}.", primitive, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn registry() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.add_custom_type_set("Types").unwrap();
        types
            .add_enumeration("Rarity", vec!["Common".into(), "Rare".into()], "Types")
            .unwrap();
        types.add_list("Tags", "String", "Types").unwrap();
        types.add_list("Rarities", "Rarity", "Types").unwrap();
        types.add_map("Prices", "String", "Integer", "Types").unwrap();
        let mut facets = BTreeMap::new();
        facets.insert("MinimumIntegerValue".to_string(), json!(1));
        facets.insert("MaximumIntegerValue".to_string(), json!(99));
        types.add_derived_type("Level", "Integer", facets, "Types").unwrap();
        types
    }

    #[test]
    fn test_value_to_string_primitives() {
        let types = registry();
        let converter = ValueConverter::new(&types);
        assert_eq!(converter.value_to_string(&json!(true), "Boolean"), "True");
        assert_eq!(converter.value_to_string(&json!(42), "Integer"), "42");
        assert_eq!(converter.value_to_string(&json!(1.5), "Real"), "1.5");
        assert_eq!(converter.value_to_string(&json!("#ff0000"), "Color"), "#FF0000");
        assert_eq!(converter.value_to_string(&json!({"x": 1, "y": 2}), "Vector2I"), "(1, 2)");
        assert_eq!(converter.value_to_string(&json!(7), "Level"), "7");
    }

    #[test]
    fn test_value_to_string_containers() {
        let types = registry();
        let converter = ValueConverter::new(&types);
        assert_eq!(converter.value_to_string(&json!(["a", "b"]), "Tags"), "a, b");
        assert_eq!(converter.value_to_string(&json!({"Gold": 3}), "Prices"), "Gold: 3");
        assert_eq!(converter.value_to_string(&json!([]), "Tags"), "");
    }

    #[test]
    fn test_string_to_value() {
        let types = registry();
        let converter = ValueConverter::new(&types);
        assert_eq!(converter.string_to_value("true", "Boolean").unwrap(), json!(true));
        assert_eq!(converter.string_to_value(" 12 ", "Level").unwrap(), json!(12));
        assert_eq!(converter.string_to_value("(1.5, 2)", "Vector2R").unwrap(), json!({"x": 1.5, "y": 2.0}));
        assert_eq!(converter.string_to_value("1 2 3", "Vector3I").unwrap(), json!({"x": 1, "y": 2, "z": 3}));
        assert_eq!(converter.string_to_value("", "Tags").unwrap(), json!([]));
        assert_eq!(converter.string_to_value(r#"["a"]"#, "Tags").unwrap(), json!(["a"]));
        assert_eq!(converter.string_to_value("Rare", "Rarity").unwrap(), json!("Rare"));

        assert!(converter.string_to_value("abc", "Integer").is_err());
        assert!(converter.string_to_value("#12", "Color").is_err());
        assert!(converter.string_to_value("(1)", "Vector2I").is_err());
        assert!(converter.string_to_value("{}", "Tags").is_err());
        assert!(matches!(
            converter.string_to_value("1", "Missing"),
            Err(TomeError::UnknownTypeReference(_))
        ));
    }

    #[test]
    fn test_validate_value() {
        let types = registry();
        let converter = ValueConverter::new(&types);
        assert!(converter.validate_value(&json!(5), "Level", None).is_empty());
        assert_eq!(converter.validate_value(&json!(0), "Level", None).len(), 1);
        assert_eq!(converter.validate_value(&json!("x"), "Level", None).len(), 1);
        assert!(converter.validate_value(&json!(["Common", "Rare"]), "Rarities", None).is_empty());
        assert_eq!(converter.validate_value(&json!(["Epic"]), "Rarities", None).len(), 1);
        assert_eq!(converter.validate_value(&json!({"Gold": "many"}), "Prices", None).len(), 1);
        assert_eq!(converter.validate_value(&json!({"x": 1}), "Vector2I", None).len(), 1);
    }

    #[test]
    fn test_default_values_are_valid() {
        let types = registry();
        let converter = ValueConverter::new(&types);
        for name in types.type_names() {
            if name == "Level" {
                continue;
            }
            let value = converter.default_value(&name);
            assert!(
                converter.validate_value(&value, &name, None).is_empty(),
                "default of {} should be valid",
                name
            );
        }
    }
}
