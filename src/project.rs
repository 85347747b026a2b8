//! Project document and editing session
//!
//! [`Project`] is the persisted form: every entity set plus the export and
//! import templates, as one JSON document. [`Workspace`] is the live editing
//! session built from it, owning the type registry, field catalog and record
//! graph, and running edits whose effects cross those subsystems.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, TomeError};
use crate::export::{ExportEngine, RecordExportTemplate};
use crate::fields::{ComponentSet, FieldCatalog, FieldDefinition, FieldDefinitionSet};
use crate::import::{ImportBatch, ImportSummary, RecordTableImportTemplate};
use crate::integrity::{Message, Severity, TaskContext, ValidationEngine};
use crate::records::{RecordGraph, RecordSet};
use crate::types::{CustomTypeSet, TypeRegistry};

/// The persisted project document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub type_sets: Vec<CustomTypeSet>,
    #[serde(default)]
    pub field_sets: Vec<FieldDefinitionSet>,
    #[serde(default)]
    pub component_sets: Vec<ComponentSet>,
    #[serde(default)]
    pub record_sets: Vec<RecordSet>,
    #[serde(default)]
    pub record_export_templates: Vec<RecordExportTemplate>,
    #[serde(default)]
    pub record_import_templates: Vec<RecordTableImportTemplate>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Read a project document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| TomeError::IoRead {
            path: path.to_path_buf(),
            source,
        })?;
        let project = Self::from_json(&content)?;
        info!("Loaded project {} from {}", project.name, path.display());
        Ok(project)
    }

    /// Write the project document to disk
    pub fn save(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = self.to_json(pretty)?;
        fs::write(path, json).map_err(|source| TomeError::IoWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved project {} to {}", self.name, path.display());
        Ok(())
    }

    pub fn export_template(&self, name: &str) -> Option<&RecordExportTemplate> {
        self.record_export_templates.iter().find(|t| t.name == name)
    }

    pub fn import_template(&self, name: &str) -> Option<&RecordTableImportTemplate> {
        self.record_import_templates.iter().find(|t| t.name == name)
    }

    pub fn into_workspace(self) -> Workspace {
        Workspace {
            name: self.name,
            types: TypeRegistry::from_sets(self.type_sets),
            fields: FieldCatalog::from_sets(self.field_sets, self.component_sets),
            records: RecordGraph::from_sets(self.record_sets),
            export_templates: self.record_export_templates,
            import_templates: self.record_import_templates,
        }
    }
}

/// A live editing session over one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workspace {
    pub name: String,
    pub types: TypeRegistry,
    pub fields: FieldCatalog,
    pub records: RecordGraph,
    pub export_templates: Vec<RecordExportTemplate>,
    pub import_templates: Vec<RecordTableImportTemplate>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Snapshot the session as a persistable document
    pub fn to_project(&self) -> Project {
        let (field_sets, component_sets) = self.fields.clone().into_sets();
        Project {
            name: self.name.clone(),
            type_sets: self.types.custom_type_sets().to_vec(),
            field_sets,
            component_sets,
            record_sets: self.records.record_sets(),
            record_export_templates: self.export_templates.clone(),
            record_import_templates: self.import_templates.clone(),
        }
    }

    // =========================================================================
    // Cascading edits
    // =========================================================================

    /// Rename a custom type and every type reference to it.
    pub fn rename_type(&mut self, old: &str, new: &str) -> Result<()> {
        self.types.rename_type(old, new, &mut self.fields)
    }

    /// Replace a field definition, re-keying record values if the id changes.
    pub fn update_field(&mut self, old_id: &str, field: FieldDefinition) -> Result<()> {
        self.fields.update_field(old_id, field, &mut self.records)
    }

    /// Remove a field definition and strip its values from every record.
    pub fn remove_field(&mut self, id: &str) -> Result<FieldDefinition> {
        self.fields.remove_field(id, &mut self.records)
    }

    /// Rename a record. Children and reference values follow the new id.
    pub fn rename_record(&mut self, old_id: &str, new_id: &str, display_name: &str) -> Result<()> {
        self.records.update_record(old_id, new_id, display_name)?;
        if old_id != new_id {
            let changed = self
                .records
                .rename_record_references(old_id, new_id, &self.fields, &self.types);
            debug!("Rewrote {} references from {} to {}", changed, old_id, new_id);
        }
        Ok(())
    }

    // =========================================================================
    // Integrity, export, import
    // =========================================================================

    pub fn task_context(&self) -> TaskContext<'_> {
        TaskContext::new(&self.types, &self.fields, &self.records)
    }

    /// Run `engine` over the session, keeping messages at least as severe as `minimum`.
    pub fn validate(&self, engine: &ValidationEngine, minimum: Severity) -> Vec<Message> {
        engine.run_filtered(&self.task_context(), minimum)
    }

    pub fn export_engine(&self) -> ExportEngine<'_> {
        ExportEngine::new(&self.types, &self.fields, &self.records)
    }

    pub fn export_template(&self, name: &str) -> Result<&RecordExportTemplate> {
        self.export_templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| TomeError::not_found("export template", name))
    }

    pub fn import_template(&self, name: &str) -> Result<&RecordTableImportTemplate> {
        self.import_templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| TomeError::not_found("import template", name))
    }

    /// Apply a finished import batch in one step.
    pub fn apply_import(&mut self, batch: &ImportBatch, template: &RecordTableImportTemplate) -> Result<ImportSummary> {
        self.records.apply_import(batch, template, &self.fields, &self.types)
    }
}

impl From<Project> for Workspace {
    fn from(project: Project) -> Self {
        project.into_workspace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new("Game");
        ws.types.add_custom_type_set("Types").unwrap();
        ws.types.add_list("Drops", "Reference", "Types").unwrap();
        ws.fields.add_field_definition_set("Fields").unwrap();
        ws.fields
            .add_field(FieldDefinition::new("loot", "Loot", "Drops"), "Fields")
            .unwrap();
        ws.fields
            .add_field(FieldDefinition::new("hp", "HP", "Integer").with_default("5"), "Fields")
            .unwrap();
        ws.records.add_record_set("Records").unwrap();
        ws.records.add_record("goblin", "Goblin", "Records").unwrap();
        ws.records.add_record("coin", "Coin", "Records").unwrap();
        ws.records
            .add_record_field("goblin", "loot", json!(["coin", "coin"]))
            .unwrap();
        ws.records.add_record_field("goblin", "hp", json!(8)).unwrap();
        ws
    }

    #[test]
    fn test_rename_record_rewrites_references() {
        let mut ws = workspace();
        ws.rename_record("coin", "gold", "Gold").unwrap();

        assert_eq!(ws.records.record("goblin").unwrap().field_values["loot"], json!(["gold", "gold"]));
        assert!(ws.records.contains("gold"));
    }

    #[test]
    fn test_field_cascades() {
        let mut ws = workspace();
        ws.update_field("hp", FieldDefinition::new("health", "Health", "Integer"))
            .unwrap();
        assert_eq!(ws.records.record("goblin").unwrap().field_values["health"], json!(8));

        ws.remove_field("health").unwrap();
        assert!(!ws.records.record("goblin").unwrap().field_values.contains_key("health"));
    }

    #[test]
    fn test_rename_type_updates_fields() {
        let mut ws = workspace();
        ws.rename_type("Drops", "Loot").unwrap();
        assert_eq!(ws.fields.field("loot").unwrap().field_type, "Loot");
        assert!(ws.types.is_custom_type("Loot"));
        assert!(!ws.types.is_custom_type("Drops"));
    }

    #[test]
    fn test_project_round_trip() {
        let ws = workspace();
        let project = ws.to_project();
        let json = project.to_json(true).unwrap();
        let loaded = Project::from_json(&json).unwrap();

        assert_eq!(loaded, project);
        assert_eq!(loaded.into_workspace(), ws);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.tome.json");
        let project = workspace().to_project();
        project.save(&path, false).unwrap();

        assert_eq!(Project::load(&path).unwrap(), project);
        assert!(matches!(
            Project::load(&dir.path().join("missing.json")),
            Err(TomeError::IoRead { .. })
        ));
    }
}
