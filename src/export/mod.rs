//! Record Export
//!
//! Renders the record graph through a [`RecordExportTemplate`]. The body
//! template and its sub-templates use the placeholder grammar of
//! [`template`]:
//!
//! | Placeholder             | Scope        | Expands to |
//! |-------------------------|--------------|------------|
//! | `{{Records}}`           | anywhere     | one rendering per exported record |
//! | `{{RecordFields}}`      | record       | one rendering per effective field |
//! | `{{Components}}`        | anywhere     | one rendering per component |
//! | `{{RecordId}}`, `{{RecordDisplayName}}`, `{{RecordParentId}}` | record | record data |
//! | `{{ComponentName}}`     | component    | component tag |
//! | `{{FieldId}}`, `{{FieldType}}`, `{{FieldValue}}` | field | field data |
//! | `{{ListItem}}`          | list item    | one list element |
//! | `{{MapKey}}`, `{{MapValue}}` | map item | one map entry |
//!
//! Placeholders used outside their scope or with unknown names are kept
//! verbatim. Substituted data passes through the template's
//! [`ValueEscape`] first.

pub mod template;

use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use self::template::{closer_text, parse, placeholder_text, Node};
use crate::error::{Result, TomeError};
use crate::fields::FieldCatalog;
use crate::records::{Record, RecordGraph};
use crate::types::{CustomTypeKind, TypeRegistry};

static BUNDLED_TEMPLATES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/templates");

/// Escaping applied to every substituted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEscape {
    #[default]
    None,
    /// Contents of a JSON string literal, without the surrounding quotes
    Json,
}

impl ValueEscape {
    pub fn apply(self, text: String) -> String {
        match self {
            ValueEscape::None => text,
            ValueEscape::Json => match serde_json::to_string(&text) {
                Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
                Err(_) => text,
            },
        }
    }
}

/// How to render records into one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordExportTemplate {
    pub name: String,
    pub file_extension: String,
    /// Template of the whole file
    pub body: String,
    pub record_template: String,
    pub record_delimiter: String,
    pub field_value_template: String,
    pub field_value_delimiter: String,
    pub component_template: String,
    pub component_delimiter: String,
    pub list_item_template: String,
    pub map_item_template: String,
    /// Delimiter between list elements and between map entries
    pub list_item_delimiter: String,
    /// Type name -> name written for `{{FieldType}}`
    pub type_map: BTreeMap<String, String>,
    pub ignored_records: BTreeSet<String>,
    pub ignored_fields: BTreeSet<String>,
    pub export_roots: bool,
    pub export_inner_nodes: bool,
    pub export_leafs: bool,
    pub value_escape: ValueEscape,
}

impl Default for RecordExportTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            file_extension: String::new(),
            body: String::new(),
            record_template: String::new(),
            record_delimiter: String::new(),
            field_value_template: String::new(),
            field_value_delimiter: String::new(),
            component_template: String::new(),
            component_delimiter: String::new(),
            list_item_template: "{{ListItem}}".to_string(),
            map_item_template: "{{MapKey}}: {{MapValue}}".to_string(),
            list_item_delimiter: ", ".to_string(),
            type_map: BTreeMap::new(),
            ignored_records: BTreeSet::new(),
            ignored_fields: BTreeSet::new(),
            export_roots: true,
            export_inner_nodes: true,
            export_leafs: true,
            value_escape: ValueEscape::None,
        }
    }
}

impl RecordExportTemplate {
    pub fn new(name: impl Into<String>, file_extension: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_extension: file_extension.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Export templates shipped with the crate, sorted by name.
pub fn bundled_templates() -> Result<Vec<RecordExportTemplate>> {
    let mut templates = Vec::new();
    for file in BUNDLED_TEMPLATES.files() {
        if file.path().extension().map(|e| e == "toml").unwrap_or(false) {
            if let Some(content) = file.contents_utf8() {
                templates.push(RecordExportTemplate::from_toml_str(content)?);
            }
        }
    }
    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}

/// Load every `*.toml` export template below `dir`, sorted by name.
pub fn load_templates_from_dir(dir: &Path) -> Result<Vec<RecordExportTemplate>> {
    let mut templates = Vec::new();

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map(|x| x == "toml").unwrap_or(false))
    {
        let path = entry.path();
        let content = fs::read_to_string(path).map_err(|source| TomeError::IoRead {
            path: path.to_path_buf(),
            source,
        })?;
        let template = RecordExportTemplate::from_toml_str(&content)?;
        debug!("Loaded export template {} from {}", template.name, path.display());
        templates.push(template);
    }

    templates.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(templates)
}

// =============================================================================
// Engine
// =============================================================================

/// Renders records of a read-only project snapshot.
pub struct ExportEngine<'a> {
    types: &'a TypeRegistry,
    fields: &'a FieldCatalog,
    records: &'a RecordGraph,
}

impl<'a> ExportEngine<'a> {
    pub fn new(types: &'a TypeRegistry, fields: &'a FieldCatalog, records: &'a RecordGraph) -> Self {
        Self { types, fields, records }
    }

    /// Records the template exports, in display order
    pub fn exported_records(&self, template: &RecordExportTemplate) -> Vec<&'a Record> {
        let parents = self.records.parent_ids();
        self.records
            .display_order()
            .into_iter()
            .filter(|record| !template.ignored_records.contains(&record.id))
            .filter(|record| {
                let has_parent = record
                    .parent_id
                    .as_deref()
                    .map(|p| self.records.contains(p))
                    .unwrap_or(false);
                let has_children = parents.contains(record.id.as_str());

                if !has_parent {
                    template.export_roots
                } else if has_children {
                    template.export_inner_nodes
                } else {
                    template.export_leafs
                }
            })
            .collect()
    }

    /// Render the template to text.
    pub fn render(&self, template: &RecordExportTemplate) -> String {
        let renderer = Renderer {
            engine: self,
            template,
            exported: self.exported_records(template),
            body: parse(&template.body),
            record: parse(&template.record_template),
            field_value: parse(&template.field_value_template),
            component: parse(&template.component_template),
            list_item: parse(&template.list_item_template),
            map_item: parse(&template.map_item_template),
        };

        let mut out = String::new();
        renderer.render_nodes(&renderer.body, &Scope::default(), &mut out);
        info!(
            "Rendered export template {} ({} records, {} bytes)",
            template.name,
            renderer.exported.len(),
            out.len()
        );
        out
    }

    /// Render and write to `writer`.
    pub fn export_records<W: Write>(&self, template: &RecordExportTemplate, writer: &mut W) -> Result<()> {
        let text = self.render(template);
        writer
            .write_all(text.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|source| TomeError::IoWrite {
                path: PathBuf::from("<stream>"),
                source,
            })
    }

    /// Render and write to the file at `path`.
    pub fn export_records_to_path(&self, template: &RecordExportTemplate, path: &Path) -> Result<()> {
        let text = self.render(template);
        fs::write(path, text).map_err(|source| TomeError::IoWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Exported {} to {}", template.name, path.display());
        Ok(())
    }
}

// =============================================================================
// Rendering
// =============================================================================

struct FieldEntry {
    id: String,
    type_name: String,
    value: Value,
}

enum ItemEntry {
    List(String),
    Map { key: String, value: String },
}

/// Sub-templates currently being expanded. A placeholder that would
/// re-enter one of them is written verbatim instead.
#[derive(Clone, Copy, Default)]
struct Expanding {
    records: bool,
    fields: bool,
    components: bool,
    items: bool,
}

impl Expanding {
    fn slot(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "Records" => Some(&mut self.records),
            "RecordFields" => Some(&mut self.fields),
            "Components" => Some(&mut self.components),
            "FieldValue" => Some(&mut self.items),
            _ => None,
        }
    }

    fn is_active(mut self, name: &str) -> bool {
        self.slot(name).map(|active| *active).unwrap_or(false)
    }

    fn enter(mut self, name: &str) -> Self {
        if let Some(active) = self.slot(name) {
            *active = true;
        }
        self
    }
}

#[derive(Clone, Copy, Default)]
struct Scope<'s> {
    record: Option<&'s Record>,
    component: Option<&'s str>,
    field: Option<&'s FieldEntry>,
    item: Option<&'s ItemEntry>,
    expanding: Expanding,
}

impl Scope<'_> {
    fn entering(&self, name: &str) -> Self {
        Self {
            expanding: self.expanding.enter(name),
            ..*self
        }
    }
}

struct Renderer<'r, 'a> {
    engine: &'r ExportEngine<'a>,
    template: &'r RecordExportTemplate,
    exported: Vec<&'a Record>,
    body: Vec<Node>,
    record: Vec<Node>,
    field_value: Vec<Node>,
    component: Vec<Node>,
    list_item: Vec<Node>,
    map_item: Vec<Node>,
}

impl<'r, 'a> Renderer<'r, 'a> {
    fn render_nodes(&self, nodes: &[Node], scope: &Scope<'_>, out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Placeholder(name) => self.render_placeholder(name, scope, out),
                Node::Block { name, body } => {
                    let rendered = match name.as_str() {
                        "Records" => Some(self.render_records(body, scope, "")),
                        "RecordFields" => self.render_fields(body, scope, ""),
                        "Components" => Some(self.render_components(body, scope, "")),
                        _ => None,
                    };
                    match rendered {
                        Some(text) => out.push_str(&text),
                        None => {
                            out.push_str(&placeholder_text(name));
                            self.render_nodes(body, scope, out);
                            out.push_str(&closer_text(name));
                        }
                    }
                }
            }
        }
    }

    fn render_placeholder(&self, name: &str, scope: &Scope<'_>, out: &mut String) {
        if scope.expanding.is_active(name) {
            out.push_str(&placeholder_text(name));
            return;
        }
        let inner = scope.entering(name);
        let template = self.template;
        let rendered = match name {
            "Records" => Some(self.render_records(&self.record, &inner, &template.record_delimiter)),
            "RecordFields" => self.render_fields(&self.field_value, &inner, &template.field_value_delimiter),
            "Components" => Some(self.render_components(&self.component, &inner, &template.component_delimiter)),
            "FieldValue" => scope.field.map(|f| self.field_value(f, scope)),
            _ => self.scalar(name, scope).map(|text| template.value_escape.apply(text)),
        };
        match rendered {
            Some(text) => out.push_str(&text),
            None => out.push_str(&placeholder_text(name)),
        }
    }

    fn scalar(&self, name: &str, scope: &Scope<'_>) -> Option<String> {
        match name {
            "RecordId" => scope.record.map(|r| r.id.clone()),
            "RecordDisplayName" => scope.record.map(|r| r.display_name.clone()),
            "RecordParentId" => scope.record.map(|r| r.parent_id.clone().unwrap_or_default()),
            "ComponentName" => scope.component.map(String::from),
            "FieldId" => scope.field.map(|f| f.id.clone()),
            "FieldType" => scope.field.map(|f| {
                self.template
                    .type_map
                    .get(&f.type_name)
                    .cloned()
                    .unwrap_or_else(|| f.type_name.clone())
            }),
            "ListItem" => match scope.item {
                Some(ItemEntry::List(item)) => Some(item.clone()),
                _ => None,
            },
            "MapKey" => match scope.item {
                Some(ItemEntry::Map { key, .. }) => Some(key.clone()),
                _ => None,
            },
            "MapValue" => match scope.item {
                Some(ItemEntry::Map { value, .. }) => Some(value.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn render_records(&self, nodes: &[Node], outer: &Scope<'_>, delimiter: &str) -> String {
        let parts: Vec<String> = self
            .exported
            .iter()
            .map(|record| {
                let scope = Scope {
                    record: Some(*record),
                    expanding: outer.expanding,
                    ..Default::default()
                };
                let mut out = String::new();
                self.render_nodes(nodes, &scope, &mut out);
                out
            })
            .collect();
        parts.join(delimiter)
    }

    /// Effective fields of the scoped record. `None` outside a record.
    fn render_fields(&self, nodes: &[Node], scope: &Scope<'_>, delimiter: &str) -> Option<String> {
        let entries = self.field_entries(scope.record?, scope.component);
        let parts: Vec<String> = entries
            .iter()
            .map(|entry| {
                let inner = Scope {
                    field: Some(entry),
                    item: None,
                    ..*scope
                };
                let mut out = String::new();
                self.render_nodes(nodes, &inner, &mut out);
                out
            })
            .collect();
        Some(parts.join(delimiter))
    }

    fn render_components(&self, nodes: &[Node], scope: &Scope<'_>, delimiter: &str) -> String {
        let components: Vec<&str> = match scope.record {
            Some(record) => {
                let used: BTreeSet<String> = self
                    .field_entries(record, None)
                    .iter()
                    .filter_map(|entry| self.engine.fields.field(&entry.id))
                    .filter_map(|field| field.component.clone())
                    .collect();
                self.engine
                    .fields
                    .components()
                    .filter(|c| used.contains(*c))
                    .collect()
            }
            None => self.engine.fields.components().collect(),
        };

        let parts: Vec<String> = components
            .into_iter()
            .map(|component| {
                let inner = Scope {
                    component: Some(component),
                    field: None,
                    item: None,
                    ..*scope
                };
                let mut out = String::new();
                self.render_nodes(nodes, &inner, &mut out);
                out
            })
            .collect();
        parts.join(delimiter)
    }

    fn field_entries(&self, record: &Record, component: Option<&str>) -> Vec<FieldEntry> {
        self.engine
            .records
            .effective_field_values(&record.id, self.engine.fields)
            .into_iter()
            .filter(|(id, _)| !self.template.ignored_fields.contains(id))
            .filter_map(|(id, value)| {
                let definition = self.engine.fields.field(&id);
                if let Some(component) = component {
                    let field_component = definition.and_then(|d| d.component.as_deref());
                    if field_component != Some(component) {
                        return None;
                    }
                }
                Some(FieldEntry {
                    type_name: definition.map(|d| d.field_type.clone()).unwrap_or_default(),
                    id,
                    value,
                })
            })
            .collect()
    }

    /// List and map values expand their item templates; everything else
    /// renders canonically.
    fn field_value(&self, field: &FieldEntry, scope: &Scope<'_>) -> String {
        let types = self.engine.types;
        let kind = types.custom_type(&field.type_name).map(|t| &t.kind);

        let items: Vec<ItemEntry> = match (kind, &field.value) {
            (Some(CustomTypeKind::List { item_type }), Value::Array(values)) => values
                .iter()
                .map(|v| ItemEntry::List(types.value_to_string(v, item_type)))
                .collect(),
            (Some(CustomTypeKind::Map { value_type, .. }), Value::Object(entries)) => entries
                .iter()
                .map(|(k, v)| ItemEntry::Map {
                    key: k.clone(),
                    value: types.value_to_string(v, value_type),
                })
                .collect(),
            _ => {
                let text = types.value_to_string(&field.value, &field.type_name);
                return self.template.value_escape.apply(text);
            }
        };

        let parts: Vec<String> = items
            .iter()
            .map(|item| {
                let nodes = match item {
                    ItemEntry::List(_) => &self.list_item,
                    ItemEntry::Map { .. } => &self.map_item,
                };
                let inner = Scope {
                    item: Some(item),
                    ..scope.entering("FieldValue")
                };
                let mut out = String::new();
                self.render_nodes(nodes, &inner, &mut out);
                out
            })
            .collect();
        parts.join(&self.template.list_item_delimiter)
    }
}
