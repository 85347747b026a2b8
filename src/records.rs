//! Record Graph
//!
//! Records form a forest through their optional `parent_id`. A record
//! inherits every field value it does not override itself from its nearest
//! ancestor that defines one, falling back to the field's default value.
//!
//! The graph is an arena keyed by record id; parents are plain id lookups.
//! Reparenting checks for cycles before anything changes, removal promotes
//! children to the removed record's parent.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{Result, TomeError};
use crate::fields::FieldCatalog;
use crate::import::{ImportBatch, ImportSummary, RecordTableImportTemplate};
use crate::types::{CustomTypeKind, PrimitiveType, TypeRegistry};
use crate::values::ValueConverter;

/// A game entity carrying field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub display_name: String,
    /// Parent record id; `None` for roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Values this record overrides, in display order
    #[serde(default)]
    pub field_values: IndexMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            parent_id: None,
            field_values: IndexMap::new(),
        }
    }
}

/// Sibling ordering: display name without case, then id.
pub fn display_order(a: &Record, b: &Record) -> Ordering {
    a.display_name
        .to_lowercase()
        .cmp(&b.display_name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

/// A named collection of records, persisted as one unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub name: String,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    record: Record,
    set: String,
}

/// All records of a project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordGraph {
    set_names: Vec<String>,
    records: IndexMap<String, Slot>,
}

impl RecordGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from persisted sets. A record id seen twice keeps its
    /// first occurrence.
    pub fn from_sets(sets: Vec<RecordSet>) -> Self {
        let mut graph = Self::default();
        for set in sets {
            for record in set.records {
                if graph.records.contains_key(&record.id) {
                    warn!("Dropping duplicate record {} from set {}", record.id, set.name);
                    continue;
                }
                graph.records.insert(
                    record.id.clone(),
                    Slot {
                        record,
                        set: set.name.clone(),
                    },
                );
            }
            graph.set_names.push(set.name);
        }
        graph
    }

    /// Regroup the records into their persistence units
    pub fn record_sets(&self) -> Vec<RecordSet> {
        self.set_names
            .iter()
            .map(|name| RecordSet {
                name: name.clone(),
                records: self
                    .records
                    .values()
                    .filter(|slot| &slot.set == name)
                    .map(|slot| slot.record.clone())
                    .collect(),
            })
            .collect()
    }

    pub fn record_set_names(&self) -> &[String] {
        &self.set_names
    }

    pub fn add_record_set(&mut self, name: &str) -> Result<()> {
        if self.set_names.iter().any(|s| s == name) {
            return Err(TomeError::duplicate("record set", name));
        }
        self.set_names.push(name.to_string());
        debug!("Added record set {}", name);
        Ok(())
    }

    /// Name of the set owning record `id`
    pub fn set_of(&self, id: &str) -> Option<&str> {
        self.records.get(id).map(|slot| slot.set.as_str())
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    /// Add a new root record to an existing set.
    pub fn add_record(&mut self, id: &str, display_name: &str, set: &str) -> Result<&Record> {
        if self.records.contains_key(id) {
            return Err(TomeError::duplicate("record", id));
        }
        if !self.set_names.iter().any(|s| s == set) {
            return Err(TomeError::not_found("record set", set));
        }

        self.records.insert(
            id.to_string(),
            Slot {
                record: Record::new(id, display_name),
                set: set.to_string(),
            },
        );
        debug!("Added record {} to set {}", id, set);
        Ok(&self.records[id].record)
    }

    /// Change a record's id and display name. Children follow the new id.
    pub fn update_record(&mut self, old_id: &str, new_id: &str, new_display_name: &str) -> Result<()> {
        let index = self
            .records
            .get_index_of(old_id)
            .ok_or_else(|| TomeError::not_found("record", old_id))?;
        if new_id != old_id && self.records.contains_key(new_id) {
            return Err(TomeError::duplicate("record", new_id));
        }

        if new_id != old_id {
            if let Some(mut slot) = self.records.shift_remove(old_id) {
                slot.record.id = new_id.to_string();
                self.records.shift_insert(index, new_id.to_string(), slot);
            }
            for slot in self.records.values_mut() {
                if slot.record.parent_id.as_deref() == Some(old_id) {
                    slot.record.parent_id = Some(new_id.to_string());
                }
            }
        }
        if let Some(slot) = self.records.get_mut(new_id) {
            slot.record.display_name = new_display_name.to_string();
        }

        debug!("Updated record {} -> {} ({})", old_id, new_id, new_display_name);
        Ok(())
    }

    /// Remove a record. Its children are promoted to its own parent.
    pub fn remove_record(&mut self, id: &str) -> Result<Record> {
        let slot = self
            .records
            .shift_remove(id)
            .ok_or_else(|| TomeError::not_found("record", id))?;
        let grandparent = slot.record.parent_id.clone();

        let mut promoted = 0;
        for child in self.records.values_mut() {
            if child.record.parent_id.as_deref() == Some(id) {
                child.record.parent_id = grandparent.clone();
                promoted += 1;
            }
        }

        debug!("Removed record {} ({} children promoted)", id, promoted);
        Ok(slot.record)
    }

    /// Move `id` below `new_parent`, or make it a root with `None`.
    ///
    /// Fails with `CyclicAncestry` without changing anything if the new
    /// parent is the record itself or one of its descendants.
    pub fn reparent_record(&mut self, id: &str, new_parent: Option<&str>) -> Result<()> {
        if !self.records.contains_key(id) {
            return Err(TomeError::not_found("record", id));
        }
        if let Some(parent) = new_parent {
            if !self.records.contains_key(parent) {
                return Err(TomeError::not_found("record", parent));
            }
            if parent == id || self.is_ancestor_of(id, parent) {
                return Err(TomeError::CyclicAncestry {
                    record: id.to_string(),
                    parent: parent.to_string(),
                });
            }
        }

        if let Some(slot) = self.records.get_mut(id) {
            slot.record.parent_id = new_parent.map(String::from);
        }
        debug!("Reparented record {} below {:?}", id, new_parent);
        Ok(())
    }

    // =========================================================================
    // Field value edits
    // =========================================================================

    /// Add an override for `field_id`. Fails if the record already has one.
    pub fn add_record_field(&mut self, record_id: &str, field_id: &str, value: Value) -> Result<()> {
        let record = self.record_mut(record_id)?;
        if record.field_values.contains_key(field_id) {
            return Err(TomeError::duplicate("record field", format!("{}.{}", record_id, field_id)));
        }
        record.field_values.insert(field_id.to_string(), value);
        debug!("Added field {} to record {}", field_id, record_id);
        Ok(())
    }

    /// Set the override for `field_id`, returning the previous override.
    pub fn update_record_field_value(&mut self, record_id: &str, field_id: &str, value: Value) -> Result<Option<Value>> {
        let record = self.record_mut(record_id)?;
        let old = record.field_values.insert(field_id.to_string(), value);
        debug!("Set field {} of record {}", field_id, record_id);
        Ok(old)
    }

    /// Remove the override for `field_id`.
    pub fn remove_record_field(&mut self, record_id: &str, field_id: &str) -> Result<Value> {
        let record = self.record_mut(record_id)?;
        let value = record
            .field_values
            .shift_remove(field_id)
            .ok_or_else(|| TomeError::not_found("record field", format!("{}.{}", record_id, field_id)))?;
        debug!("Removed field {} from record {}", field_id, record_id);
        Ok(value)
    }

    /// Drop the override for `field_id` so the inherited value shows
    /// through again. Returns the dropped override, if any.
    pub fn revert_record_field(&mut self, record_id: &str, field_id: &str) -> Result<Option<Value>> {
        let record = self.record_mut(record_id)?;
        let old = record.field_values.shift_remove(field_id);
        debug!("Reverted field {} of record {}", field_id, record_id);
        Ok(old)
    }

    /// Drop all overrides of a record, returning them.
    pub fn revert_record(&mut self, record_id: &str) -> Result<IndexMap<String, Value>> {
        let record = self.record_mut(record_id)?;
        let old = std::mem::take(&mut record.field_values);
        debug!("Reverted record {} ({} values)", record_id, old.len());
        Ok(old)
    }

    /// Re-key every override of field `old` as `new`, keeping its position.
    pub(crate) fn rename_field_values(&mut self, old: &str, new: &str) -> usize {
        let mut count = 0;
        for slot in self.records.values_mut() {
            let values = &mut slot.record.field_values;
            if let Some(index) = values.get_index_of(old) {
                if let Some(value) = values.shift_remove(old) {
                    values.shift_insert(index, new.to_string(), value);
                    count += 1;
                }
            }
        }
        count
    }

    /// Remove every override of field `id`.
    pub(crate) fn strip_field_values(&mut self, id: &str) -> usize {
        self.records
            .values_mut()
            .filter_map(|slot| slot.record.field_values.shift_remove(id))
            .count()
    }

    /// Rewrite reference values (and lists or maps of references) pointing
    /// at record `old` to point at `new`. Returns how many values changed.
    pub fn rename_record_references(&mut self, old: &str, new: &str, fields: &FieldCatalog, types: &TypeRegistry) -> usize {
        let mut count = 0;
        for slot in self.records.values_mut() {
            for (field_id, value) in slot.record.field_values.iter_mut() {
                let Some(field) = fields.field(field_id) else {
                    continue;
                };
                count += rename_reference_value(value, &field.field_type, old, new, types);
            }
        }
        count
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn record(&self, id: &str) -> Option<&Record> {
        self.records.get(id).map(|slot| &slot.record)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// All records in arena order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values().map(|slot| &slot.record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn parent(&self, id: &str) -> Option<&Record> {
        let parent_id = self.record(id)?.parent_id.as_deref()?;
        self.record(parent_id)
    }

    /// Ancestors of `id`, nearest first. Stops at a missing parent or when
    /// the chain loops back on itself.
    pub fn ancestors(&self, id: &str) -> Vec<&Record> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);

        let mut current = self.record(id);
        while let Some(record) = current {
            let Some(parent_id) = record.parent_id.as_deref() else {
                break;
            };
            if !visited.insert(parent_id) {
                break;
            }
            current = self.record(parent_id);
            if let Some(parent) = current {
                ancestors.push(parent);
            }
        }

        ancestors
    }

    /// True iff walking `descendant`'s parent chain reaches `ancestor`.
    pub fn is_ancestor_of(&self, ancestor: &str, descendant: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.record(descendant).and_then(|r| r.parent_id.as_deref());

        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            current = self.record(id).and_then(|r| r.parent_id.as_deref());
        }

        false
    }

    /// Direct children of `id`, in display order
    pub fn children(&self, id: &str) -> Vec<&Record> {
        let mut children: Vec<&Record> = self
            .records()
            .filter(|r| r.parent_id.as_deref() == Some(id))
            .collect();
        children.sort_by(|a, b| display_order(a, b));
        children
    }

    /// Ids of every record that is the parent of at least one other record.
    pub fn parent_ids(&self) -> HashSet<&str> {
        self.records().filter_map(|r| r.parent_id.as_deref()).collect()
    }

    /// Children of every parent id in one pass, siblings in display order.
    fn children_index(&self) -> HashMap<&str, Vec<&Record>> {
        let mut index: HashMap<&str, Vec<&Record>> = HashMap::new();
        for record in self.records() {
            if let Some(parent) = record.parent_id.as_deref() {
                index.entry(parent).or_default().push(record);
            }
        }
        for children in index.values_mut() {
            children.sort_by(|a, b| display_order(a, b));
        }
        index
    }

    /// Records without a parent, in display order. Records whose parent id
    /// points at nothing count as roots too.
    pub fn roots(&self) -> Vec<&Record> {
        let mut roots: Vec<&Record> = self
            .records()
            .filter(|r| match r.parent_id.as_deref() {
                None => true,
                Some(parent) => !self.contains(parent),
            })
            .collect();
        roots.sort_by(|a, b| display_order(a, b));
        roots
    }

    /// Depth-first walk of the forest with siblings in display order.
    /// Records caught in an ancestry cycle come last.
    pub fn display_order(&self) -> Vec<&Record> {
        let mut ordered = Vec::with_capacity(self.records.len());
        let mut visited = HashSet::new();
        let children = self.children_index();

        let mut stack: Vec<&Record> = self.roots().into_iter().rev().collect();
        while let Some(record) = stack.pop() {
            if !visited.insert(record.id.as_str()) {
                continue;
            }
            ordered.push(record);
            if let Some(kids) = children.get(record.id.as_str()) {
                stack.extend(kids.iter().rev().copied());
            }
        }

        if ordered.len() < self.records.len() {
            let mut rest: Vec<&Record> = self
                .records()
                .filter(|r| !visited.contains(r.id.as_str()))
                .collect();
            rest.sort_by(|a, b| display_order(a, b));
            ordered.extend(rest);
        }

        ordered
    }

    // =========================================================================
    // Inheritance
    // =========================================================================

    /// The value record `record_id` presents for `field_id`: its own
    /// override, else the nearest ancestor's, else the field default.
    pub fn effective_value(&self, record_id: &str, field_id: &str, fields: &FieldCatalog, types: &TypeRegistry) -> Option<Value> {
        let record = self.record(record_id)?;
        if let Some(value) = record.field_values.get(field_id) {
            return Some(value.clone());
        }
        self.inherited_field_value(record_id, field_id, fields, types)
    }

    /// The value `record_id` would present for `field_id` without its own
    /// override: the nearest ancestor's value, else the field default.
    /// `None` if the record is unknown, or no ancestor defines the field and
    /// the catalog does not know it.
    ///
    /// The field default is returned even when it equals the record's own
    /// override, so [`Self::can_revert_field`] reports `false` for an
    /// override that merely restates the default.
    pub fn inherited_field_value(&self, record_id: &str, field_id: &str, fields: &FieldCatalog, types: &TypeRegistry) -> Option<Value> {
        self.record(record_id)?;
        for ancestor in self.ancestors(record_id) {
            if let Some(value) = ancestor.field_values.get(field_id) {
                return Some(value.clone());
            }
        }
        fields.field(field_id).map(|field| field_default(&field.default_value, &field.field_type, types))
    }

    /// Whether reverting `field_id` on `record_id` would change what the
    /// record presents.
    pub fn can_revert_field(&self, record_id: &str, field_id: &str, fields: &FieldCatalog, types: &TypeRegistry) -> bool {
        let Some(own) = self.record(record_id).and_then(|r| r.field_values.get(field_id)) else {
            return false;
        };
        match self.inherited_field_value(record_id, field_id, fields, types) {
            Some(inherited) => &inherited != own,
            None => true,
        }
    }

    /// Every field the record or one of its ancestors defines, with its
    /// effective value. Known fields come first in catalog order, unknown
    /// field ids follow in the order they were found.
    pub fn effective_field_values(&self, record_id: &str, fields: &FieldCatalog) -> IndexMap<String, Value> {
        let mut result = IndexMap::new();
        let Some(record) = self.record(record_id) else {
            return result;
        };

        let mut defined: IndexMap<&str, &Value> = IndexMap::new();
        for source in std::iter::once(record).chain(self.ancestors(record_id)) {
            for (field_id, value) in &source.field_values {
                defined.entry(field_id.as_str()).or_insert(value);
            }
        }

        for field in fields.fields() {
            if let Some(value) = defined.shift_remove(field.id.as_str()) {
                result.insert(field.id.clone(), value.clone());
            }
        }
        for (field_id, value) in defined {
            result.insert(field_id.to_string(), value.clone());
        }

        result
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Apply a parsed import batch in one step.
    ///
    /// Every cell of a column mapped to a known field is converted first;
    /// any conversion failure aborts before the graph is touched. Records
    /// missing from the graph are created below the template's root record.
    pub fn apply_import(
        &mut self,
        batch: &ImportBatch,
        template: &RecordTableImportTemplate,
        fields: &FieldCatalog,
        types: &TypeRegistry,
    ) -> Result<ImportSummary> {
        let converter = ValueConverter::new(types);
        let mut skipped_columns = BTreeSet::new();
        let mut planned = Vec::with_capacity(batch.rows.len());

        for (record_id, row) in &batch.rows {
            if template.ignored_ids.contains(record_id) {
                continue;
            }
            let mut values = Vec::with_capacity(row.len());
            for (column, cell) in row {
                let field_id = template.column_map.get(column).unwrap_or(column);
                match fields.field(field_id) {
                    Some(field) => {
                        let value = converter.string_to_value(cell, &field.field_type)?;
                        values.push((field.id.clone(), value));
                    }
                    None => {
                        skipped_columns.insert(column.clone());
                    }
                }
            }
            planned.push((record_id, values));
        }

        let creates_records = planned.iter().any(|(id, _)| !self.contains(id));
        let target_set = match &template.record_set {
            Some(set) => set.clone(),
            None => self.set_names.first().cloned().unwrap_or_default(),
        };
        if creates_records {
            if !self.set_names.contains(&target_set) {
                return Err(TomeError::not_found("record set", target_set));
            }
            if let Some(root) = &template.root_record_id {
                if !self.contains(root) {
                    return Err(TomeError::not_found("record", root.clone()));
                }
            }
        }

        let mut summary = ImportSummary::default();
        for (record_id, values) in planned {
            if self.contains(record_id) {
                summary.updated += 1;
            } else {
                self.records.insert(
                    record_id.clone(),
                    Slot {
                        record: Record {
                            parent_id: template.root_record_id.clone(),
                            ..Record::new(record_id.as_str(), record_id.as_str())
                        },
                        set: target_set.clone(),
                    },
                );
                summary.created += 1;
            }
            if let Some(slot) = self.records.get_mut(record_id) {
                for (field_id, value) in values {
                    slot.record.field_values.insert(field_id, value);
                }
            }
        }

        for column in &skipped_columns {
            warn!("Import {}: column {} matches no field, skipped", template.name, column);
        }
        summary.skipped_columns = skipped_columns.into_iter().collect();
        info!(
            "Applied import {}: {} records created, {} updated",
            template.name, summary.created, summary.updated
        );
        Ok(summary)
    }

    fn record_mut(&mut self, id: &str) -> Result<&mut Record> {
        self.records
            .get_mut(id)
            .map(|slot| &mut slot.record)
            .ok_or_else(|| TomeError::not_found("record", id))
    }
}

/// Parse a field default, keeping the raw text if it does not fit the type.
fn field_default(default_value: &str, field_type: &str, types: &TypeRegistry) -> Value {
    ValueConverter::new(types)
        .string_to_value(default_value, field_type)
        .unwrap_or_else(|_| Value::String(default_value.to_string()))
}

fn rename_reference_value(value: &mut Value, type_name: &str, old: &str, new: &str, types: &TypeRegistry) -> usize {
    if let Some(custom) = types.custom_type(type_name) {
        match &custom.kind {
            CustomTypeKind::List { item_type } => {
                return match value {
                    Value::Array(items) => items
                        .iter_mut()
                        .map(|item| rename_reference_value(item, item_type, old, new, types))
                        .sum(),
                    _ => 0,
                };
            }
            CustomTypeKind::Map { key_type, value_type } => {
                let Value::Object(entries) = value else {
                    return 0;
                };
                let mut count = 0;
                if types.resolve_primitive(key_type) == Some(PrimitiveType::Reference) && entries.contains_key(old) {
                    *entries = std::mem::take(entries)
                        .into_iter()
                        .map(|(key, entry)| if key == old { (new.to_string(), entry) } else { (key, entry) })
                        .collect();
                    count += 1;
                }
                return count
                    + entries
                        .values_mut()
                        .map(|entry| rename_reference_value(entry, value_type, old, new, types))
                        .sum::<usize>();
            }
            CustomTypeKind::Enumeration { .. } | CustomTypeKind::Derived { .. } => {}
        }
    }

    if types.resolve_primitive(type_name) == Some(PrimitiveType::Reference) && value.as_str() == Some(old) {
        *value = Value::String(new.to_string());
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldDefinition;
    use serde_json::json;

    fn graph() -> RecordGraph {
        let mut records = RecordGraph::new();
        records.add_record_set("Records").unwrap();
        for (id, name) in [("monster", "Monster"), ("goblin", "Goblin"), ("boss", "Goblin King"), ("item", "Item")] {
            records.add_record(id, name, "Records").unwrap();
        }
        records.reparent_record("goblin", Some("monster")).unwrap();
        records.reparent_record("boss", Some("goblin")).unwrap();
        records
    }

    fn catalog() -> (FieldCatalog, TypeRegistry) {
        let mut fields = FieldCatalog::new();
        fields.add_field_definition_set("Fields").unwrap();
        fields
            .add_field(FieldDefinition::new("hp", "HP", "Integer").with_default("1"), "Fields")
            .unwrap();
        fields
            .add_field(FieldDefinition::new("name", "Name", "String"), "Fields")
            .unwrap();
        fields
            .add_field(FieldDefinition::new("drop", "Drop", "Reference"), "Fields")
            .unwrap();
        (fields, TypeRegistry::new())
    }

    #[test]
    fn test_effective_value_inheritance() {
        let mut records = graph();
        let (fields, types) = catalog();
        records.add_record_field("monster", "hp", json!(10)).unwrap();
        records.add_record_field("goblin", "hp", json!(20)).unwrap();

        assert_eq!(records.effective_value("boss", "hp", &fields, &types), Some(json!(20)));
        assert_eq!(records.effective_value("monster", "hp", &fields, &types), Some(json!(10)));
        assert_eq!(records.effective_value("item", "hp", &fields, &types), Some(json!(1)));
        assert_eq!(records.effective_value("boss", "unknown", &fields, &types), None);
        assert_eq!(records.effective_value("nobody", "hp", &fields, &types), None);
    }

    #[test]
    fn test_inherited_value_skips_own_override() {
        let mut records = graph();
        let (fields, types) = catalog();
        records.add_record_field("monster", "hp", json!(10)).unwrap();
        records.add_record_field("goblin", "hp", json!(20)).unwrap();

        assert_eq!(records.inherited_field_value("goblin", "hp", &fields, &types), Some(json!(10)));
        assert!(records.can_revert_field("goblin", "hp", &fields, &types));

        records.update_record_field_value("goblin", "hp", json!(10)).unwrap();
        assert!(!records.can_revert_field("goblin", "hp", &fields, &types));
        assert!(!records.can_revert_field("boss", "hp", &fields, &types));

        records.revert_record_field("goblin", "hp").unwrap();
        assert_eq!(records.effective_value("goblin", "hp", &fields, &types), Some(json!(10)));
    }

    #[test]
    fn test_override_equal_to_default_is_not_revertible() {
        let mut records = graph();
        let (fields, types) = catalog();
        records.add_record_field("item", "hp", json!(1)).unwrap();

        assert_eq!(records.inherited_field_value("item", "hp", &fields, &types), Some(json!(1)));
        assert!(!records.can_revert_field("item", "hp", &fields, &types));

        records.update_record_field_value("item", "hp", json!(2)).unwrap();
        assert!(records.can_revert_field("item", "hp", &fields, &types));
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut records = graph();
        let before = records.clone();

        assert!(matches!(
            records.reparent_record("monster", Some("boss")),
            Err(TomeError::CyclicAncestry { .. })
        ));
        assert!(matches!(
            records.reparent_record("monster", Some("monster")),
            Err(TomeError::CyclicAncestry { .. })
        ));
        assert_eq!(records, before);

        records.reparent_record("boss", Some("item")).unwrap();
        assert!(records.is_ancestor_of("item", "boss"));
        records.reparent_record("boss", None).unwrap();
        assert!(records.record("boss").unwrap().parent_id.is_none());
    }

    #[test]
    fn test_remove_promotes_children() {
        let mut records = graph();
        records.remove_record("goblin").unwrap();

        assert_eq!(records.record("boss").unwrap().parent_id.as_deref(), Some("monster"));
        assert!(records.records().all(|r| r.parent_id.as_deref().map(|p| records.contains(p)).unwrap_or(true)));

        records.remove_record("monster").unwrap();
        assert!(records.record("boss").unwrap().parent_id.is_none());
    }

    #[test]
    fn test_update_record_cascades_to_children() {
        let mut records = graph();
        records.update_record("goblin", "orc", "Orc").unwrap();

        assert!(!records.contains("goblin"));
        assert_eq!(records.record("orc").unwrap().display_name, "Orc");
        assert_eq!(records.record("boss").unwrap().parent_id.as_deref(), Some("orc"));
        assert!(matches!(
            records.update_record("orc", "item", "Item"),
            Err(TomeError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_display_order() {
        let mut records = RecordGraph::new();
        records.add_record_set("Records").unwrap();
        records.add_record("b", "beta", "Records").unwrap();
        records.add_record("a", "Alpha", "Records").unwrap();
        records.add_record("c", "Charlie", "Records").unwrap();
        records.reparent_record("c", Some("a")).unwrap();

        let ids: Vec<&str> = records.display_order().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_display_order_walks_wide_forest() {
        let mut records = RecordGraph::new();
        records.add_record_set("Records").unwrap();
        records.add_record("root", "Root", "Records").unwrap();
        for i in (0..50).rev() {
            let id = format!("child{:02}", i);
            records.add_record(&id, &id, "Records").unwrap();
            records.reparent_record(&id, Some("root")).unwrap();
            let leaf = format!("leaf{:02}", i);
            records.add_record(&leaf, &leaf, "Records").unwrap();
            records.reparent_record(&leaf, Some(id.as_str())).unwrap();
        }

        let ids: Vec<&str> = records.display_order().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 101);
        assert_eq!(&ids[..5], &["root", "child00", "leaf00", "child01", "leaf01"]);
        assert_eq!(ids[100], "leaf49");

        let parents = records.parent_ids();
        assert_eq!(parents.len(), 51);
        assert!(parents.contains("root"));
        assert!(!parents.contains("leaf07"));
        assert_eq!(records.children("child07")[0].id, "leaf07");
    }

    #[test]
    fn test_effective_field_values_order() {
        let mut records = graph();
        let (fields, _) = catalog();
        records.add_record_field("boss", "unknown", json!(true)).unwrap();
        records.add_record_field("boss", "name", json!("King")).unwrap();
        records.add_record_field("monster", "hp", json!(10)).unwrap();

        let values = records.effective_field_values("boss", &fields);
        let keys: Vec<&str> = values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["hp", "name", "unknown"]);
        assert_eq!(values["hp"], json!(10));
    }

    #[test]
    fn test_rename_record_references() {
        let mut records = graph();
        let (fields, types) = catalog();
        records.add_record_field("goblin", "drop", json!("item")).unwrap();
        records.add_record_field("goblin", "name", json!("item")).unwrap();

        let changed = records.rename_record_references("item", "loot", &fields, &types);
        assert_eq!(changed, 1);
        assert_eq!(records.record("goblin").unwrap().field_values["drop"], json!("loot"));
        assert_eq!(records.record("goblin").unwrap().field_values["name"], json!("item"));
    }

    #[test]
    fn test_rename_record_references_in_map_keys() {
        let mut records = graph();
        let (mut fields, mut types) = catalog();
        types.add_custom_type_set("Types").unwrap();
        types.add_map("DropChances", "Reference", "Real", "Types").unwrap();
        fields
            .add_field(FieldDefinition::new("chances", "Chances", "DropChances"), "Fields")
            .unwrap();
        records
            .add_record_field("goblin", "chances", json!({"monster": 0.1, "item": 0.5}))
            .unwrap();

        let changed = records.rename_record_references("item", "loot", &fields, &types);
        assert_eq!(changed, 1);

        let chances = records.record("goblin").unwrap().field_values["chances"].as_object().unwrap();
        let keys: Vec<&str> = chances.keys().map(String::as_str).collect();
        assert!(keys.contains(&"loot"));
        assert!(!keys.contains(&"item"));
        assert_eq!(chances["loot"], json!(0.5));
        assert_eq!(chances["monster"], json!(0.1));
    }

    #[test]
    fn test_revert_record_clears_all_overrides() {
        let mut records = graph();
        let (fields, types) = catalog();
        records.add_record_field("monster", "hp", json!(10)).unwrap();
        records.add_record_field("goblin", "hp", json!(20)).unwrap();
        records.add_record_field("goblin", "name", json!("Gob")).unwrap();

        let old = records.revert_record("goblin").unwrap();
        let keys: Vec<&str> = old.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["hp", "name"]);
        assert!(records.record("goblin").unwrap().field_values.is_empty());
        assert_eq!(records.effective_value("goblin", "hp", &fields, &types), Some(json!(10)));
        assert_eq!(records.effective_value("goblin", "name", &fields, &types), Some(json!("")));

        assert!(matches!(records.revert_record("nobody"), Err(TomeError::NotFound { .. })));
    }

    #[test]
    fn test_record_sets_round_trip() {
        let mut records = graph();
        records.add_record_set("Other").unwrap();
        records.add_record("extra", "Extra", "Other").unwrap();

        let sets = records.record_sets();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].records.len(), 1);
        assert_eq!(RecordGraph::from_sets(sets), records);
    }
}
