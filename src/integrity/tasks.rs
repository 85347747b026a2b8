//! Built-in integrity rules
//!
//! | Code   | Rule                                        | Severity |
//! |--------|---------------------------------------------|----------|
//! | TO0001 | Field type does not exist                   | Error    |
//! | TO0002 | Field component does not exist              | Warning  |
//! | TO0003 | Field id defined more than once             | Error    |
//! | TO0004 | Field default value invalid                 | Warning  |
//! | TO0101 | List item type does not exist               | Error    |
//! | TO0102 | List item type not supported                | Error    |
//! | TO0103 | Map key type does not exist                 | Error    |
//! | TO0104 | Map key type not supported                  | Error    |
//! | TO0105 | Map value type does not exist               | Error    |
//! | TO0106 | Map value type not supported                | Error    |
//! | TO0107 | Derived base type does not exist            | Error    |
//! | TO0108 | Derived base type not supported             | Error    |
//! | TO0109 | Derived facet not supported or malformed    | Error    |
//! | TO0110 | Duplicate enumeration value                 | Error    |
//! | TO0201 | Record parent does not exist                | Error    |
//! | TO0202 | Record ancestry is cyclic                   | Error    |
//! | TO0203 | Record field does not exist                 | Warning  |
//! | TO0204 | Record field value invalid                  | Error    |
//! | TO0205 | Referenced record does not exist            | Warning  |

use petgraph::algo::kosaraju_scc;
use petgraph::graph::DiGraph;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::{FnTask, Message, TargetSiteType, Task, TaskContext};
use crate::types::{CustomTypeKind, Facet, PrimitiveType, TypeRegistry};
use crate::values::ValueConverter;

/// Every built-in rule, in run order
pub fn default_tasks() -> Vec<Box<dyn Task>> {
    vec![
        task("TO0001", "Field Type Does Not Exist", field_type_does_not_exist),
        task("TO0002", "Field Component Does Not Exist", field_component_does_not_exist),
        task("TO0003", "Field Id Collision", field_id_collision),
        task("TO0004", "Field Default Value Invalid", field_default_value_invalid),
        task("TO0101", "List Item Type Does Not Exist", list_item_type_does_not_exist),
        task("TO0102", "List Item Type Not Supported", list_item_type_not_supported),
        task("TO0103", "Map Key Type Does Not Exist", map_key_type_does_not_exist),
        task("TO0104", "Map Key Type Not Supported", map_key_type_not_supported),
        task("TO0105", "Map Value Type Does Not Exist", map_value_type_does_not_exist),
        task("TO0106", "Map Value Type Not Supported", map_value_type_not_supported),
        task("TO0107", "Derived Base Type Does Not Exist", derived_base_type_does_not_exist),
        task("TO0108", "Derived Base Type Not Supported", derived_base_type_not_supported),
        task("TO0109", "Derived Facet Not Supported", derived_facet_not_supported),
        task("TO0110", "Duplicate Enumeration Value", duplicate_enumeration_value),
        task("TO0201", "Record Parent Does Not Exist", record_parent_does_not_exist),
        task("TO0202", "Record Ancestry Cyclic", record_ancestry_cyclic),
        task("TO0203", "Record Field Does Not Exist", record_field_does_not_exist),
        task("TO0204", "Record Field Value Invalid", record_field_value_invalid),
        task("TO0205", "Referenced Record Does Not Exist", referenced_record_does_not_exist),
    ]
}

fn task(code: &'static str, name: &'static str, check: fn(&TaskContext<'_>) -> Vec<Message>) -> Box<dyn Task> {
    Box::new(FnTask::new(code, name, check))
}

fn is_container(types: &TypeRegistry, name: &str) -> bool {
    types.custom_type(name).map(|t| t.is_container()).unwrap_or(false)
}

// =============================================================================
// Fields
// =============================================================================

pub fn field_type_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    ctx.fields
        .fields()
        .into_iter()
        .filter(|field| !ctx.types.type_exists(&field.field_type))
        .map(|field| {
            Message::error(
                "TO0001",
                format!("Field type {} of field {} does not exist.", field.field_type, field.id),
            )
            .at(TargetSiteType::Field, field.id.as_str())
        })
        .collect()
}

pub fn field_component_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for field in ctx.fields.fields() {
        let Some(component) = field.component.as_deref() else {
            continue;
        };
        if !component.is_empty() && !ctx.fields.has_component(component) {
            messages.push(
                Message::warning(
                    "TO0002",
                    format!("Component {} of field {} does not exist.", component, field.id),
                )
                .at(TargetSiteType::Field, field.id.as_str()),
            );
        }
    }
    messages
}

pub fn field_id_collision(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for set in ctx.fields.field_definition_sets() {
        for field in &set.field_definitions {
            let count = counts.entry(field.id.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                order.push(field.id.as_str());
            }
        }
    }

    order
        .into_iter()
        .map(|id| {
            Message::error(
                "TO0003",
                format!("Field id {} is defined {} times.", id, counts[id]),
            )
            .at(TargetSiteType::Field, id)
        })
        .collect()
}

/// Empty defaults stand for the type's neutral value and are not checked.
pub fn field_default_value_invalid(ctx: &TaskContext<'_>) -> Vec<Message> {
    let converter = ValueConverter::new(ctx.types);
    let mut messages = Vec::new();

    for field in ctx.fields.fields() {
        if field.default_value.is_empty() || !ctx.types.type_exists(&field.field_type) {
            continue;
        }
        let problems = match converter.string_to_value(&field.default_value, &field.field_type) {
            Ok(value) => converter.validate_value(&value, &field.field_type, Some(ctx.records)),
            Err(e) => vec![e.to_string()],
        };
        for problem in problems {
            messages.push(
                Message::warning(
                    "TO0004",
                    format!("Default value {} of field {} is invalid: {}", field.default_value, field.id, problem),
                )
                .at(TargetSiteType::Field, field.id.as_str()),
            );
        }
    }

    messages
}

// =============================================================================
// Types
// =============================================================================

pub fn list_item_type_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        if let CustomTypeKind::List { item_type } = &custom.kind {
            if !ctx.types.type_exists(item_type) {
                messages.push(
                    Message::error("TO0101", format!("List item type {} does not exist.", item_type))
                        .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

pub fn list_item_type_not_supported(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        if let CustomTypeKind::List { item_type } = &custom.kind {
            if is_container(ctx.types, item_type) {
                messages.push(
                    Message::error(
                        "TO0102",
                        format!("List item type {} is not supported: lists cannot hold lists or maps.", item_type),
                    )
                    .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

pub fn map_key_type_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        if let CustomTypeKind::Map { key_type, .. } = &custom.kind {
            if !ctx.types.type_exists(key_type) {
                messages.push(
                    Message::error("TO0103", format!("Map key type {} does not exist.", key_type))
                        .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

pub fn map_key_type_not_supported(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        if let CustomTypeKind::Map { key_type, .. } = &custom.kind {
            if is_container(ctx.types, key_type) {
                messages.push(
                    Message::error(
                        "TO0104",
                        format!("Map key type {} is not supported: maps cannot be keyed by lists or maps.", key_type),
                    )
                    .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

pub fn map_value_type_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        if let CustomTypeKind::Map { value_type, .. } = &custom.kind {
            if !ctx.types.type_exists(value_type) {
                messages.push(
                    Message::error("TO0105", format!("Map value type {} does not exist.", value_type))
                        .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

pub fn map_value_type_not_supported(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        let CustomTypeKind::Map { value_type, .. } = &custom.kind else {
            continue;
        };
        let is_vector = ctx
            .types
            .resolve_primitive(value_type)
            .map(|p| p.is_vector())
            .unwrap_or(false);
        if is_vector || is_container(ctx.types, value_type) {
            messages.push(
                Message::error("TO0106", format!("Map value type {} is not supported.", value_type))
                    .at(TargetSiteType::Type, custom.name.as_str()),
            );
        }
    }
    messages
}

pub fn derived_base_type_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        if let CustomTypeKind::Derived { base_type, .. } = &custom.kind {
            if !ctx.types.type_exists(base_type) {
                messages.push(
                    Message::error("TO0107", format!("Base type {} does not exist.", base_type))
                        .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

pub fn derived_base_type_not_supported(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        let CustomTypeKind::Derived { base_type, .. } = &custom.kind else {
            continue;
        };
        if is_container(ctx.types, base_type) {
            messages.push(
                Message::error(
                    "TO0108",
                    format!("Base type {} is not supported: lists and maps cannot be derived from.", base_type),
                )
                .at(TargetSiteType::Type, custom.name.as_str()),
            );
        } else if ctx.types.has_cyclic_derivation(&custom.name) {
            messages.push(
                Message::error("TO0108", format!("Base type chain of {} is cyclic.", custom.name))
                    .at(TargetSiteType::Type, custom.name.as_str()),
            );
        }
    }
    messages
}

pub fn derived_facet_not_supported(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        let CustomTypeKind::Derived { base_type, facets } = &custom.kind else {
            continue;
        };
        let base = ctx.types.resolve_primitive(base_type);

        for (key, facet_value) in facets {
            let problem = match Facet::from_key(key) {
                None => Some(format!("Facet {} is not supported.", key)),
                Some(facet) => match base {
                    Some(primitive) if primitive != facet.target_type() => Some(format!(
                        "Facet {} is not supported by base type {}.",
                        key, base_type
                    )),
                    _ => facet.check_facet_value(facet_value).err(),
                },
            };
            if let Some(problem) = problem {
                messages.push(Message::error("TO0109", problem).at(TargetSiteType::Type, custom.name.as_str()));
            }
        }
    }
    messages
}

pub fn duplicate_enumeration_value(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for custom in ctx.types.custom_types() {
        let CustomTypeKind::Enumeration { values } = &custom.kind else {
            continue;
        };
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for value in values {
            if !seen.insert(value.as_str()) && reported.insert(value.as_str()) {
                messages.push(
                    Message::error(
                        "TO0110",
                        format!("Enumeration {} contains the value {} more than once.", custom.name, value),
                    )
                    .at(TargetSiteType::Type, custom.name.as_str()),
                );
            }
        }
    }
    messages
}

// =============================================================================
// Records
// =============================================================================

pub fn record_parent_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for record in ctx.records.records() {
        let Some(parent) = record.parent_id.as_deref() else {
            continue;
        };
        if !parent.is_empty() && !ctx.records.contains(parent) {
            messages.push(
                Message::error(
                    "TO0201",
                    format!("Parent {} of record {} does not exist.", parent, record.id),
                )
                .at(TargetSiteType::Record, record.id.as_str()),
            );
        }
    }
    messages
}

/// One error per record that sits on an ancestry cycle.
pub fn record_ancestry_cyclic(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut graph = DiGraph::<&str, ()>::with_capacity(ctx.records.len(), ctx.records.len());
    let mut nodes = HashMap::new();
    for record in ctx.records.records() {
        nodes.insert(record.id.as_str(), graph.add_node(record.id.as_str()));
    }
    for record in ctx.records.records() {
        if let Some(parent) = record.parent_id.as_deref().and_then(|p| nodes.get(p)) {
            graph.add_edge(nodes[record.id.as_str()], *parent, ());
        }
    }

    let mut cyclic = HashSet::new();
    for scc in kosaraju_scc(&graph) {
        let is_cycle = scc.len() > 1 || scc.iter().any(|n| graph.contains_edge(*n, *n));
        if is_cycle {
            cyclic.extend(scc.iter().map(|n| graph[*n]));
        }
    }

    ctx.records
        .records()
        .filter(|record| cyclic.contains(record.id.as_str()))
        .map(|record| {
            Message::error("TO0202", format!("Record {} is its own ancestor.", record.id))
                .at(TargetSiteType::Record, record.id.as_str())
        })
        .collect()
}

pub fn record_field_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();
    for record in ctx.records.records() {
        for field_id in record.field_values.keys() {
            if ctx.fields.field(field_id).is_none() {
                messages.push(
                    Message::warning(
                        "TO0203",
                        format!("Record {} has a value for field {}, which does not exist.", record.id, field_id),
                    )
                    .at(TargetSiteType::Record, record.id.as_str()),
                );
            }
        }
    }
    messages
}

pub fn record_field_value_invalid(ctx: &TaskContext<'_>) -> Vec<Message> {
    let converter = ValueConverter::new(ctx.types);
    let mut messages = Vec::new();

    for record in ctx.records.records() {
        for (field_id, value) in &record.field_values {
            let Some(field) = ctx.fields.field(field_id) else {
                continue;
            };
            if !ctx.types.type_exists(&field.field_type) {
                continue;
            }
            for problem in converter.validate_value(value, &field.field_type, Some(ctx.records)) {
                messages.push(
                    Message::error(
                        "TO0204",
                        format!("Value of field {} in record {} is invalid: {}", field_id, record.id, problem),
                    )
                    .at(TargetSiteType::Record, record.id.as_str()),
                );
            }
        }
    }

    messages
}

pub fn referenced_record_does_not_exist(ctx: &TaskContext<'_>) -> Vec<Message> {
    let mut messages = Vec::new();

    for record in ctx.records.records() {
        for (field_id, value) in &record.field_values {
            let Some(field) = ctx.fields.field(field_id) else {
                continue;
            };
            let mut references = Vec::new();
            collect_references(value, &field.field_type, ctx.types, &mut references);

            for reference in references {
                if !reference.is_empty() && !ctx.records.contains(reference) {
                    messages.push(
                        Message::warning(
                            "TO0205",
                            format!(
                                "Field {} of record {} references record {}, which does not exist.",
                                field_id, record.id, reference
                            ),
                        )
                        .at(TargetSiteType::Record, record.id.as_str()),
                    );
                }
            }
        }
    }

    messages
}

fn collect_references<'v>(value: &'v Value, type_name: &str, types: &TypeRegistry, out: &mut Vec<&'v str>) {
    if let Some(custom) = types.custom_type(type_name) {
        match &custom.kind {
            CustomTypeKind::List { item_type } => {
                if let Value::Array(items) = value {
                    for item in items {
                        collect_references(item, item_type, types, out);
                    }
                }
                return;
            }
            CustomTypeKind::Map { key_type, value_type } => {
                if let Value::Object(entries) = value {
                    let reference_keys = types.resolve_primitive(key_type) == Some(PrimitiveType::Reference);
                    for (key, entry) in entries {
                        if reference_keys {
                            out.push(key.as_str());
                        }
                        collect_references(entry, value_type, types, out);
                    }
                }
                return;
            }
            CustomTypeKind::Enumeration { .. } | CustomTypeKind::Derived { .. } => {}
        }
    }

    if types.resolve_primitive(type_name) == Some(PrimitiveType::Reference) {
        if let Some(id) = value.as_str() {
            out.push(id);
        }
    }
}
