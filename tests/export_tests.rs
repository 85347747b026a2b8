//! Templated export of a complete project

use pretty_assertions::assert_eq;
use tome::export::bundled_templates;
use tome::{Project, RecordExportTemplate, Workspace};

fn bestiary() -> Workspace {
    Project::from_json(include_str!("fixtures/bestiary.tome.json"))
        .unwrap()
        .into_workspace()
}

fn ini_template() -> RecordExportTemplate {
    let mut template = RecordExportTemplate::new("Sections", "ini", "{{Records}}");
    template.record_template = "[{{RecordId}}]\n{{RecordFields}}\n".to_string();
    template.record_delimiter = "\n".to_string();
    template.field_value_template = "{{FieldId}}={{FieldValue}}".to_string();
    template.field_value_delimiter = "\n".to_string();
    template.ignored_fields.insert("armor".to_string());
    template
}

#[test]
fn test_project_template_lists_records_in_display_order() {
    let ws = bestiary();
    let template = ws.export_template("Ids").unwrap();

    assert_eq!(ws.export_engine().render(template), "coin,monster,dragon,goblin,orphan");
}

#[test]
fn test_export_inherits_values_from_ancestors() {
    let ws = bestiary();
    let output = ws.export_engine().render(&ini_template());

    let expected = "[coin]\n\n\n\
                    [monster]\nelement=Earth\n\n\
                    [dragon]\ndrops=gem\nelement=Water\nresist=150\n\n\
                    [goblin]\ndrops=coin\nelement=Earth\nhp=8\n\n\
                    [orphan]\n\n";
    assert_eq!(output, expected);
}

#[test]
fn test_export_only_leaves() {
    let ws = bestiary();
    let mut template = ini_template();
    template.export_roots = false;
    template.export_inner_nodes = false;

    let records: Vec<&str> = ws
        .export_engine()
        .exported_records(&template)
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(records, vec!["dragon", "goblin"]);
}

#[test]
fn test_components_group_fields() {
    let ws = bestiary();
    let mut template = RecordExportTemplate::new(
        "Grouped",
        "txt",
        "{{Records}}{{RecordId}}:{{Components}}<{{ComponentName}}|{{RecordFields}}{{FieldId}} {{/RecordFields}}>{{/Components}};{{/Records}}",
    );
    template.ignored_records.insert("orphan".to_string());

    assert_eq!(
        ws.export_engine().render(&template),
        "coin:;monster:;dragon:<Combat|resist >;goblin:<Combat|hp >;"
    );
}

#[test]
fn test_export_to_file() {
    let ws = bestiary();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bestiary.txt");
    let template = ws.export_template("Ids").unwrap();

    ws.export_engine().export_records_to_path(template, &path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "coin,monster,dragon,goblin,orphan");

    let mut buffer = Vec::new();
    ws.export_engine().export_records(template, &mut buffer).unwrap();
    assert_eq!(String::from_utf8(buffer).unwrap(), "coin,monster,dragon,goblin,orphan");
}

#[test]
fn test_bundled_json_template() {
    let ws = bestiary();
    let templates = bundled_templates().unwrap();
    let json = templates.iter().find(|t| t.name == "JSON").unwrap();

    let output = ws.export_engine().render(json);
    assert!(output.contains("\"id\": \"goblin\""));
    assert!(output.contains("\"parent\": \"monster\""));
    assert!(output.contains("\"drops\": \"coin\""));
}

#[test]
fn test_bundled_json_template_escapes_values() {
    let mut ws = bestiary();
    ws.records.update_record("goblin", "goblin", "The \"Green\" Goblin").unwrap();
    let templates = bundled_templates().unwrap();
    let json = templates.iter().find(|t| t.name == "JSON").unwrap();

    let output = ws.export_engine().render(json);
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    let goblin = parsed["records"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["id"] == "goblin")
        .unwrap();
    assert_eq!(goblin["displayName"], "The \"Green\" Goblin");
}
