//! Record table import into a complete project

use std::path::{Path, PathBuf};

use serde_json::json;
use tome::{
    spawn_import, CancellationFlag, CsvRecordDataSource, ImportBatch, ImportProgress, Project, RecordDataSource,
    RecordTableImportTemplate, TomeError, Workspace,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn bestiary() -> Workspace {
    Project::from_json(include_str!("fixtures/bestiary.tome.json"))
        .unwrap()
        .into_workspace()
}

#[tokio::test]
async fn test_import_updates_and_creates_records() {
    let mut ws = bestiary();
    let template = ws.import_template("Monster Table").unwrap().clone();

    let mut task = spawn_import(CsvRecordDataSource, template.clone(), fixture("monsters.csv"));
    let mut updates = Vec::new();
    while let Some(progress) = task.next_progress().await {
        updates.push(progress);
    }
    let batch = task.outcome().await.unwrap();

    assert!(!updates.is_empty());
    assert!(updates.iter().all(|p| p.title == "Importing monsters.csv With Monster Table"));
    assert_eq!(batch.rows.len(), 2);

    let summary = ws.apply_import(&batch, &template).unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped_columns, vec!["notes".to_string()]);

    let goblin = ws.records.record("goblin").unwrap();
    assert_eq!(goblin.field_values["hp"], json!(12));
    assert_eq!(goblin.field_values["element"], json!("Fire"));
    assert_eq!(goblin.field_values["drops"], json!(["coin"]));

    let imp = ws.records.record("imp").unwrap();
    assert_eq!(imp.display_name, "imp");
    assert_eq!(imp.parent_id.as_deref(), Some("monster"));
    assert_eq!(ws.records.set_of("imp"), Some("Monsters"));
}

#[tokio::test]
async fn test_invalid_cell_leaves_project_untouched() {
    let mut ws = bestiary();
    let before = ws.clone();
    let template = ws.import_template("Monster Table").unwrap().clone();

    let task = spawn_import(CsvRecordDataSource, template.clone(), fixture("bad_cells.csv"));
    let batch = task.outcome().await.unwrap();

    let result = ws.apply_import(&batch, &template);
    assert!(matches!(result, Err(TomeError::InvalidValue { .. })));
    assert_eq!(ws, before);
}

#[tokio::test]
async fn test_missing_source_reports_read_error() {
    let ws = bestiary();
    let template = ws.import_template("Monster Table").unwrap().clone();

    let task = spawn_import(CsvRecordDataSource, template, fixture("missing.csv"));
    assert!(matches!(task.outcome().await, Err(TomeError::IoRead { .. })));
}

/// Reads CSV like the default source, but cancels the import once the
/// first row has been reported.
struct CancelAfterFirstRow;

impl RecordDataSource for CancelAfterFirstRow {
    fn import_data(
        &self,
        template: &RecordTableImportTemplate,
        source: &Path,
        progress: &mut dyn FnMut(ImportProgress),
        cancel: &CancellationFlag,
    ) -> tome::Result<ImportBatch> {
        let mut forward = |update: ImportProgress| {
            if update.message == "goblin" {
                cancel.cancel();
            }
            progress(update);
        };
        CsvRecordDataSource.import_data(template, source, &mut forward, cancel)
    }
}

#[tokio::test]
async fn test_cancelled_import_applies_nothing() {
    let ws = bestiary();
    let before = ws.clone();
    let template = ws.import_template("Monster Table").unwrap().clone();

    let mut task = spawn_import(CancelAfterFirstRow, template, fixture("monsters.csv"));
    let flag = task.cancellation_flag();
    let mut rows = Vec::new();
    while let Some(progress) = task.next_progress().await {
        rows.push(progress.message);
    }

    assert!(matches!(task.outcome().await, Err(TomeError::ImportCancelled)));
    assert!(flag.is_cancelled());
    assert!(rows.contains(&"goblin".to_string()));
    assert!(!rows.contains(&"imp".to_string()));
    assert_eq!(ws, before);
}

#[tokio::test]
async fn test_imported_project_round_trips() {
    let mut ws = bestiary();
    let template = ws.import_template("Monster Table").unwrap().clone();
    let batch = spawn_import(CsvRecordDataSource, template.clone(), fixture("monsters.csv"))
        .outcome()
        .await
        .unwrap();
    ws.apply_import(&batch, &template).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bestiary.tome.json");
    ws.to_project().save(&path, true).unwrap();

    let reloaded = Project::load(&path).unwrap().into_workspace();
    assert_eq!(reloaded, ws);
}
