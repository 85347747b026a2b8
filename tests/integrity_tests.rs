//! Integrity checks over a complete project document

use tome::integrity::FnTask;
use tome::{Message, Project, Severity, TargetSiteType, TaskContext, ValidationEngine, Workspace};

fn bestiary() -> Workspace {
    Project::from_json(include_str!("fixtures/bestiary.tome.json"))
        .unwrap()
        .into_workspace()
}

fn codes(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.message_code.as_str()).collect()
}

// =============================================================================
// Default rules
// =============================================================================

#[test]
fn test_default_tasks_report_record_problems() {
    let ws = bestiary();
    let messages = ws.validate(&ValidationEngine::with_default_tasks(), Severity::Information);

    assert_eq!(codes(&messages), vec!["TO0201", "TO0203", "TO0204", "TO0205"]);

    let orphan = &messages[0];
    assert_eq!(orphan.severity, Severity::Error);
    assert_eq!(orphan.target_site_type, TargetSiteType::Record);
    assert_eq!(orphan.target_site_id, "orphan");

    assert_eq!(messages[1].target_site_id, "goblin");
    assert!(messages[1].content.contains("armor"));
    assert!(messages[2].content.contains("at most 100"));
    assert!(messages[3].content.contains("gem"));
}

#[test]
fn test_minimum_severity_filters_warnings() {
    let ws = bestiary();
    let messages = ws.validate(&ValidationEngine::with_default_tasks(), Severity::Error);

    assert_eq!(codes(&messages), vec!["TO0201", "TO0204"]);
}

#[test]
fn test_disabled_task_is_skipped() {
    let ws = bestiary();
    let mut engine = ValidationEngine::with_default_tasks();
    engine.disable("TO0201").disable("TO0205");

    let messages = ws.validate(&engine, Severity::Information);
    assert_eq!(codes(&messages), vec!["TO0203", "TO0204"]);
}

#[test]
fn test_fixing_problems_clears_messages() {
    let mut ws = bestiary();
    ws.records.reparent_record("orphan", None).unwrap();
    ws.records.remove_record_field("goblin", "armor").unwrap();
    ws.records
        .update_record_field_value("dragon", "resist", serde_json::json!(50))
        .unwrap();
    ws.records.add_record("gem", "Gem", "Items").unwrap();

    let messages = ws.validate(&ValidationEngine::with_default_tasks(), Severity::Information);
    assert!(messages.is_empty(), "unexpected messages: {:?}", messages);
}

#[test]
fn test_type_problems_after_edits() {
    let mut ws = bestiary();
    ws.types
        .add_list("Nested", "Drops", "Core Types")
        .unwrap();
    ws.types.remove_custom_type("Element").unwrap();

    let messages = ws.validate(&ValidationEngine::with_default_tasks(), Severity::Information);
    let found = codes(&messages);

    // The element field now points at a missing type; its values are no longer checked.
    assert!(found.contains(&"TO0001"));
    assert!(found.contains(&"TO0102"));
    let nested = messages.iter().find(|m| m.message_code == "TO0102").unwrap();
    assert_eq!(nested.target_site_id, "Nested");
}

// =============================================================================
// Custom tasks
// =============================================================================

#[test]
fn test_custom_task_runs_after_defaults() {
    let ws = bestiary();
    let mut engine = ValidationEngine::with_default_tasks();
    engine.register(FnTask::new("GAME0001", "Records Need Hit Points", |ctx: &TaskContext<'_>| {
        ctx.records
            .records()
            .filter(|r| !r.field_values.contains_key("hp") && ctx.records.parent(&r.id).is_some())
            .map(|r| Message::warning("GAME0001", format!("{} has no own hit points.", r.id)).at(TargetSiteType::Record, r.id.as_str()))
            .collect()
    }));

    let messages = ws.validate(&engine, Severity::Warning);
    let last = messages.last().unwrap();
    assert_eq!(last.message_code, "GAME0001");
    assert_eq!(last.target_site_id, "dragon");
    assert!(engine.task_codes().ends_with(&["GAME0001"]));
}
