//! Field Catalog
//!
//! Field definitions declare the typed attributes records can carry. They are
//! grouped into named [`FieldDefinitionSet`]s, but field ids are unique across
//! the whole project.
//!
//! Iteration order is part of the contract: fields are ordered by display
//! name (case-insensitive), ties broken by id. Export relies on it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{Result, TomeError};
use crate::records::RecordGraph;

/// A typed attribute records can carry a value for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Stable identifier, unique across all sets
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Presentation grouping tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Type reference: a built-in or custom type name
    pub field_type: String,
    /// Default value, string-encoded for `field_type`
    #[serde(default)]
    pub default_value: String,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: String::new(),
            component: None,
            field_type: field_type.into(),
            default_value: String::new(),
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Catalog ordering: display name without case, then id.
pub fn display_order(a: &FieldDefinition, b: &FieldDefinition) -> Ordering {
    a.display_name
        .to_lowercase()
        .cmp(&b.display_name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

/// A named collection of field definitions, kept in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldDefinitionSet {
    pub name: String,
    #[serde(default)]
    pub field_definitions: Vec<FieldDefinition>,
}

impl FieldDefinitionSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_definitions: Vec::new(),
        }
    }

    fn insert_sorted(&mut self, field: FieldDefinition) {
        let index = self
            .field_definitions
            .partition_point(|f| display_order(f, &field) == Ordering::Less);
        self.field_definitions.insert(index, field);
    }
}

/// A named collection of component tags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentSet {
    pub name: String,
    #[serde(default)]
    pub components: Vec<String>,
}

impl ComponentSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }
}

/// All field definitions and component tags of a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCatalog {
    field_sets: Vec<FieldDefinitionSet>,
    component_sets: Vec<ComponentSet>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from persisted sets. Sets are re-sorted so iteration
    /// order holds even for hand-edited documents.
    pub fn from_sets(mut field_sets: Vec<FieldDefinitionSet>, component_sets: Vec<ComponentSet>) -> Self {
        for set in &mut field_sets {
            set.field_definitions.sort_by(display_order);
        }
        Self {
            field_sets,
            component_sets,
        }
    }

    pub fn field_definition_sets(&self) -> &[FieldDefinitionSet] {
        &self.field_sets
    }

    pub fn component_sets(&self) -> &[ComponentSet] {
        &self.component_sets
    }

    pub fn into_sets(self) -> (Vec<FieldDefinitionSet>, Vec<ComponentSet>) {
        (self.field_sets, self.component_sets)
    }

    // =========================================================================
    // Sets
    // =========================================================================

    pub fn add_field_definition_set(&mut self, name: &str) -> Result<()> {
        if self.field_sets.iter().any(|s| s.name == name) {
            return Err(TomeError::duplicate("field definition set", name));
        }
        self.field_sets.push(FieldDefinitionSet::new(name));
        debug!("Added field definition set {}", name);
        Ok(())
    }

    pub fn add_component_set(&mut self, name: &str) -> Result<()> {
        if self.component_sets.iter().any(|s| s.name == name) {
            return Err(TomeError::duplicate("component set", name));
        }
        self.component_sets.push(ComponentSet::new(name));
        debug!("Added component set {}", name);
        Ok(())
    }

    // =========================================================================
    // Components
    // =========================================================================

    pub fn add_component(&mut self, name: &str, set: &str) -> Result<()> {
        if self.has_component(name) {
            return Err(TomeError::duplicate("component", name));
        }
        let target = self
            .component_sets
            .iter_mut()
            .find(|s| s.name == set)
            .ok_or_else(|| TomeError::not_found("component set", set))?;
        target.components.push(name.to_string());
        debug!("Added component {} to set {}", name, set);
        Ok(())
    }

    /// Remove a component tag. Fields still tagged with it keep the tag;
    /// the integrity engine reports them.
    pub fn remove_component(&mut self, name: &str) -> Result<()> {
        for set in &mut self.component_sets {
            if let Some(index) = set.components.iter().position(|c| c == name) {
                set.components.remove(index);
                debug!("Removed component {} from set {}", name, set.name);
                return Ok(());
            }
        }
        Err(TomeError::not_found("component", name))
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.component_sets.iter().any(|s| s.components.iter().any(|c| c == name))
    }

    /// All component tags, set by set
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.component_sets
            .iter()
            .flat_map(|s| s.components.iter().map(String::as_str))
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Add a field to an existing set. The declared type is not checked.
    pub fn add_field(&mut self, field: FieldDefinition, set: &str) -> Result<()> {
        if self.field(&field.id).is_some() {
            return Err(TomeError::duplicate("field", field.id));
        }
        let target = self
            .field_sets
            .iter_mut()
            .find(|s| s.name == set)
            .ok_or_else(|| TomeError::not_found("field definition set", set))?;

        debug!("Added field {} ({}) to set {}", field.id, field.field_type, set);
        target.insert_sorted(field);
        Ok(())
    }

    /// Replace the field `old_id`. A changed id is carried over to every
    /// record value keyed by the old id.
    pub fn update_field(&mut self, old_id: &str, field: FieldDefinition, records: &mut RecordGraph) -> Result<()> {
        let (set_index, index) = self
            .locate(old_id)
            .ok_or_else(|| TomeError::not_found("field", old_id))?;
        if field.id != old_id && self.field(&field.id).is_some() {
            return Err(TomeError::duplicate("field", field.id));
        }

        let set = &mut self.field_sets[set_index];
        set.field_definitions.remove(index);
        if field.id != old_id {
            let renamed = records.rename_field_values(old_id, &field.id);
            debug!("Renamed field {} to {} ({} records updated)", old_id, field.id, renamed);
        }
        debug!("Updated field {}", field.id);
        set.insert_sorted(field);
        Ok(())
    }

    /// Remove a field and strip its value from every record.
    pub fn remove_field(&mut self, id: &str, records: &mut RecordGraph) -> Result<FieldDefinition> {
        let (set_index, index) = self.locate(id).ok_or_else(|| TomeError::not_found("field", id))?;
        let removed = self.field_sets[set_index].field_definitions.remove(index);
        let stripped = records.strip_field_values(id);
        debug!("Removed field {} ({} record values stripped)", id, stripped);
        Ok(removed)
    }

    /// Point every field declared as `old` at `new`. Returns how many
    /// fields changed.
    pub fn rename_type_references(&mut self, old: &str, new: &str) -> usize {
        let mut count = 0;
        for field in self.field_sets.iter_mut().flat_map(|s| s.field_definitions.iter_mut()) {
            if field.field_type == old {
                field.field_type = new.to_string();
                count += 1;
            }
        }
        count
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.locate(id).map(|(s, i)| &self.field_sets[s].field_definitions[i])
    }

    /// Every field in catalog order, across all sets
    pub fn fields(&self) -> Vec<&FieldDefinition> {
        let mut fields: Vec<&FieldDefinition> = self
            .field_sets
            .iter()
            .flat_map(|s| s.field_definitions.iter())
            .collect();
        fields.sort_by(|a, b| display_order(a, b));
        fields
    }

    /// Fields tagged with `component`, in catalog order
    pub fn fields_of_component(&self, component: &str) -> Vec<&FieldDefinition> {
        self.fields()
            .into_iter()
            .filter(|f| f.component.as_deref() == Some(component))
            .collect()
    }

    /// Name of the set owning field `id`
    pub fn set_of(&self, id: &str) -> Option<&str> {
        self.locate(id).map(|(s, _)| self.field_sets[s].name.as_str())
    }

    fn locate(&self, id: &str) -> Option<(usize, usize)> {
        self.field_sets.iter().enumerate().find_map(|(s, set)| {
            set.field_definitions.iter().position(|f| f.id == id).map(|i| (s, i))
        })
    }
}
