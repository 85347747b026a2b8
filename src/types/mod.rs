//! Type Registry
//!
//! Owns the built-in type names and every custom type definition of a project.
//! Custom types live in exactly one [`CustomTypeSet`] each.
//!
//! Editing is permissive: adding or removing a type only checks name
//! uniqueness. Type references that point nowhere are reported by the
//! integrity engine, never rejected here.

pub mod builtin;
pub mod custom;
pub mod facets;

pub use builtin::PrimitiveType;
pub use custom::{CustomType, CustomTypeKind, CustomTypeSet};
pub use facets::{Facet, FacetContext};

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::{Result, TomeError};
use crate::fields::FieldCatalog;
use crate::values::ValueConverter;

/// What a type name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    BuiltIn(PrimitiveType),
    Enumeration,
    List,
    Map,
    Derived,
}

/// Built-in and custom types of a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeRegistry {
    sets: Vec<CustomTypeSet>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from persisted sets
    pub fn from_sets(sets: Vec<CustomTypeSet>) -> Self {
        Self { sets }
    }

    pub fn custom_type_sets(&self) -> &[CustomTypeSet] {
        &self.sets
    }

    pub fn into_sets(self) -> Vec<CustomTypeSet> {
        self.sets
    }

    // =========================================================================
    // Sets
    // =========================================================================

    pub fn add_custom_type_set(&mut self, name: &str) -> Result<()> {
        if self.sets.iter().any(|s| s.name == name) {
            return Err(TomeError::duplicate("custom type set", name));
        }
        self.sets.push(CustomTypeSet::new(name));
        debug!("Added custom type set {}", name);
        Ok(())
    }

    /// Remove a set together with its types.
    pub fn remove_custom_type_set(&mut self, name: &str) -> Result<CustomTypeSet> {
        let index = self
            .sets
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| TomeError::not_found("custom type set", name))?;
        let set = self.sets.remove(index);
        debug!("Removed custom type set {} ({} types)", name, set.types.len());
        Ok(set)
    }

    // =========================================================================
    // Adding types
    // =========================================================================

    pub fn add_enumeration(&mut self, name: &str, values: Vec<String>, set: &str) -> Result<&CustomType> {
        self.add_custom_type(CustomType::enumeration(name, values), set)
    }

    pub fn add_list(&mut self, name: &str, item_type: &str, set: &str) -> Result<&CustomType> {
        self.add_custom_type(CustomType::list(name, item_type), set)
    }

    pub fn add_map(&mut self, name: &str, key_type: &str, value_type: &str, set: &str) -> Result<&CustomType> {
        self.add_custom_type(CustomType::map(name, key_type, value_type), set)
    }

    pub fn add_derived_type(
        &mut self,
        name: &str,
        base_type: &str,
        facets: BTreeMap<String, Value>,
        set: &str,
    ) -> Result<&CustomType> {
        self.add_custom_type(CustomType::derived(name, base_type, facets), set)
    }

    /// Add a custom type to an existing set.
    ///
    /// Fails with `DuplicateName` if any built-in or custom type already uses
    /// the name.
    pub fn add_custom_type(&mut self, custom_type: CustomType, set: &str) -> Result<&CustomType> {
        if self.type_exists(&custom_type.name) {
            return Err(TomeError::duplicate("type", custom_type.name));
        }
        let set_index = self.set_index(set)?;

        debug!("Added {} {} to set {}", custom_type.kind.label(), custom_type.name, set);
        let types = &mut self.sets[set_index].types;
        types.push(custom_type);
        Ok(&types[types.len() - 1])
    }

    // =========================================================================
    // Updating types
    // =========================================================================

    /// Replace the definition of `old_name`, renaming it first if the
    /// updated definition carries a different name.
    pub fn update_custom_type(
        &mut self,
        old_name: &str,
        updated: CustomType,
        fields: &mut FieldCatalog,
    ) -> Result<()> {
        if !self.is_custom_type(old_name) {
            return Err(TomeError::not_found("custom type", old_name));
        }
        if updated.name != old_name && self.type_exists(&updated.name) {
            return Err(TomeError::duplicate("type", updated.name));
        }

        if updated.name != old_name {
            self.rename_type(old_name, &updated.name, fields)?;
        }
        if let Some(existing) = self.custom_type_mut(&updated.name) {
            existing.kind = updated.kind;
        }
        debug!("Updated custom type {}", updated.name);
        Ok(())
    }

    /// Rename a custom type and rewrite every reference to it: field
    /// definitions plus list, map and derived definitions.
    pub fn rename_type(&mut self, old: &str, new: &str, fields: &mut FieldCatalog) -> Result<()> {
        if !self.is_custom_type(old) {
            return Err(TomeError::not_found("custom type", old));
        }
        if old == new {
            return Ok(());
        }
        if self.type_exists(new) {
            return Err(TomeError::duplicate("type", new));
        }

        let mut rewritten = 0;
        for set in &mut self.sets {
            for custom_type in &mut set.types {
                if custom_type.name == old {
                    custom_type.name = new.to_string();
                }
                if custom_type.kind.rename_type_reference(old, new) {
                    rewritten += 1;
                }
            }
        }
        let rewritten_fields = fields.rename_type_references(old, new);

        debug!(
            "Renamed type {} to {} ({} type and {} field references updated)",
            old, new, rewritten, rewritten_fields
        );
        Ok(())
    }

    // =========================================================================
    // Removing and moving types
    // =========================================================================

    /// Remove a custom type. References to it are left in place.
    pub fn remove_custom_type(&mut self, name: &str) -> Result<CustomType> {
        for set in &mut self.sets {
            if let Some(index) = set.types.iter().position(|t| t.name == name) {
                let removed = set.types.remove(index);
                debug!("Removed custom type {} from set {}", name, set.name);
                return Ok(removed);
            }
        }
        Err(TomeError::not_found("custom type", name))
    }

    pub fn move_custom_type_to_set(&mut self, name: &str, set: &str) -> Result<()> {
        let target = self.set_index(set)?;
        let (source, index) = self
            .locate(name)
            .ok_or_else(|| TomeError::not_found("custom type", name))?;
        if source == target {
            return Ok(());
        }

        let custom_type = self.sets[source].types.remove(index);
        self.sets[target].types.push(custom_type);
        debug!("Moved custom type {} to set {}", name, set);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn is_built_in_type(&self, name: &str) -> bool {
        PrimitiveType::from_name(name).is_some()
    }

    pub fn is_custom_type(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    /// Only the `Reference` primitive counts, not types derived from it.
    pub fn is_reference_type(&self, name: &str) -> bool {
        PrimitiveType::from_name(name) == Some(PrimitiveType::Reference)
    }

    pub fn type_exists(&self, name: &str) -> bool {
        self.is_built_in_type(name) || self.is_custom_type(name)
    }

    pub fn custom_type(&self, name: &str) -> Option<&CustomType> {
        self.locate(name).map(|(s, i)| &self.sets[s].types[i])
    }

    /// All custom types, set by set
    pub fn custom_types(&self) -> impl Iterator<Item = &CustomType> {
        self.sets.iter().flat_map(|s| s.types.iter())
    }

    /// Name of the set owning `name`
    pub fn set_of(&self, name: &str) -> Option<&str> {
        self.locate(name).map(|(s, _)| self.sets[s].name.as_str())
    }

    pub fn type_kind(&self, name: &str) -> Option<TypeKind> {
        if let Some(primitive) = PrimitiveType::from_name(name) {
            return Some(TypeKind::BuiltIn(primitive));
        }
        self.custom_type(name).map(|t| match t.kind {
            CustomTypeKind::Enumeration { .. } => TypeKind::Enumeration,
            CustomTypeKind::List { .. } => TypeKind::List,
            CustomTypeKind::Map { .. } => TypeKind::Map,
            CustomTypeKind::Derived { .. } => TypeKind::Derived,
        })
    }

    /// The primitive a type ultimately stores.
    ///
    /// Derived types resolve through their base chain, enumerations store
    /// strings. Containers, unknown names and cyclic derived chains resolve
    /// to nothing.
    pub fn resolve_primitive(&self, name: &str) -> Option<PrimitiveType> {
        let mut current = name;
        let mut visited = HashSet::new();

        loop {
            if let Some(primitive) = PrimitiveType::from_name(current) {
                return Some(primitive);
            }
            if !visited.insert(current) {
                return None;
            }
            match &self.custom_type(current)?.kind {
                CustomTypeKind::Enumeration { .. } => return Some(PrimitiveType::String),
                CustomTypeKind::Derived { base_type, .. } => current = base_type.as_str(),
                CustomTypeKind::List { .. } | CustomTypeKind::Map { .. } => return None,
            }
        }
    }

    /// Derived types passed through when resolving `name`, starting with
    /// `name` itself if it is derived. Stops at the first repeated name.
    pub fn derived_chain(&self, name: &str) -> Vec<&CustomType> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = name;

        while visited.insert(current) {
            match self.custom_type(current) {
                Some(t @ CustomType {
                    kind: CustomTypeKind::Derived { base_type, .. },
                    ..
                }) => {
                    chain.push(t);
                    current = base_type.as_str();
                }
                _ => break,
            }
        }

        chain
    }

    /// Whether resolving the derived chain of `name` runs in a circle
    pub fn has_cyclic_derivation(&self, name: &str) -> bool {
        let chain = self.derived_chain(name);
        match chain.last() {
            Some(CustomType {
                kind: CustomTypeKind::Derived { base_type, .. },
                ..
            }) => chain.iter().any(|t| &t.name == base_type),
            _ => false,
        }
    }

    /// Built-in type names in declaration order, followed by custom type
    /// names sorted case-insensitively.
    pub fn type_names(&self) -> Vec<String> {
        let mut custom: Vec<&str> = self.custom_types().map(|t| t.name.as_str()).collect();
        custom.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));

        PrimitiveType::ALL
            .iter()
            .map(|t| t.as_str().to_string())
            .chain(custom.into_iter().map(String::from))
            .collect()
    }

    /// Canonical text for a typed value
    pub fn value_to_string(&self, value: &Value, type_name: &str) -> String {
        ValueConverter::new(self).value_to_string(value, type_name)
    }

    pub(crate) fn custom_type_mut(&mut self, name: &str) -> Option<&mut CustomType> {
        let (s, i) = self.locate(name)?;
        Some(&mut self.sets[s].types[i])
    }

    fn locate(&self, name: &str) -> Option<(usize, usize)> {
        self.sets.iter().enumerate().find_map(|(s, set)| {
            set.types.iter().position(|t| t.name == name).map(|i| (s, i))
        })
    }

    fn set_index(&self, name: &str) -> Result<usize> {
        self.sets
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| TomeError::not_found("custom type set", name))
    }
}
