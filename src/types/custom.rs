//! User-defined types and the sets that own them

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A named user-defined type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomType {
    /// Unique, case-sensitive type name
    pub name: String,
    /// What kind of type this is
    #[serde(flatten)]
    pub kind: CustomTypeKind,
}

/// The closed set of custom type shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomTypeKind {
    /// Ordered list of allowed string values
    Enumeration { values: Vec<String> },
    /// Homogeneous list of `item_type` values
    List { item_type: String },
    /// Mapping from `key_type` to `value_type`
    Map { key_type: String, value_type: String },
    /// A base type narrowed by facets
    Derived {
        base_type: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        facets: BTreeMap<String, Value>,
    },
}

impl CustomTypeKind {
    /// Short label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            CustomTypeKind::Enumeration { .. } => "enumeration",
            CustomTypeKind::List { .. } => "list",
            CustomTypeKind::Map { .. } => "map",
            CustomTypeKind::Derived { .. } => "derived type",
        }
    }

    /// Type names this definition refers to
    pub fn type_references(&self) -> Vec<&str> {
        match self {
            CustomTypeKind::Enumeration { .. } => Vec::new(),
            CustomTypeKind::List { item_type } => vec![item_type.as_str()],
            CustomTypeKind::Map {
                key_type,
                value_type,
            } => vec![key_type.as_str(), value_type.as_str()],
            CustomTypeKind::Derived { base_type, .. } => vec![base_type.as_str()],
        }
    }

    /// Rewrite every reference to `old` as `new`. Returns true if anything changed.
    pub fn rename_type_reference(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        let mut rename = |slot: &mut String| {
            if slot == old {
                *slot = new.to_string();
                changed = true;
            }
        };

        match self {
            CustomTypeKind::Enumeration { .. } => {}
            CustomTypeKind::List { item_type } => rename(item_type),
            CustomTypeKind::Map {
                key_type,
                value_type,
            } => {
                rename(key_type);
                rename(value_type);
            }
            CustomTypeKind::Derived { base_type, .. } => rename(base_type),
        }

        changed
    }
}

impl CustomType {
    pub fn new(name: impl Into<String>, kind: CustomTypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn enumeration(name: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(name, CustomTypeKind::Enumeration { values })
    }

    pub fn list(name: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self::new(
            name,
            CustomTypeKind::List {
                item_type: item_type.into(),
            },
        )
    }

    pub fn map(
        name: impl Into<String>,
        key_type: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            CustomTypeKind::Map {
                key_type: key_type.into(),
                value_type: value_type.into(),
            },
        )
    }

    pub fn derived(
        name: impl Into<String>,
        base_type: impl Into<String>,
        facets: BTreeMap<String, Value>,
    ) -> Self {
        Self::new(
            name,
            CustomTypeKind::Derived {
                base_type: base_type.into(),
                facets,
            },
        )
    }

    pub fn is_enumeration(&self) -> bool {
        matches!(self.kind, CustomTypeKind::Enumeration { .. })
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, CustomTypeKind::List { .. })
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, CustomTypeKind::Map { .. })
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, CustomTypeKind::Derived { .. })
    }

    /// Lists and maps
    pub fn is_container(&self) -> bool {
        self.is_list() || self.is_map()
    }
}

/// A named group of custom types, persisted as one unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomTypeSet {
    pub name: String,
    #[serde(default)]
    pub types: Vec<CustomType>,
}

impl CustomTypeSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CustomType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}
