//! Record Table Import
//!
//! Reads tabular external data into an [`ImportBatch`] of
//! `record id -> column -> cell text`. Parsing never touches the record
//! graph; the caller applies a finished batch in one step with
//! [`RecordGraph::apply_import`](crate::records::RecordGraph::apply_import).
//!
//! Long imports run on a blocking worker via [`spawn_import`], reporting
//! progress over a channel and stopping cooperatively when cancelled.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info};

use crate::error::{Result, TomeError};

fn default_delimiter() -> char {
    ';'
}

/// How to read one kind of record table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTableImportTemplate {
    pub name: String,
    /// Header of the column holding record ids
    pub id_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Remove quotes surrounding headers and cells
    #[serde(default)]
    pub strip_quotes: bool,
    /// Record ids to skip
    #[serde(default)]
    pub ignored_ids: BTreeSet<String>,
    /// Column header -> field id, for headers that differ from field ids
    #[serde(default)]
    pub column_map: BTreeMap<String, String>,
    /// Set receiving newly created records; the first set if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_set: Option<String>,
    /// Parent of newly created records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_record_id: Option<String>,
}

impl RecordTableImportTemplate {
    pub fn new(name: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_column: id_column.into(),
            delimiter: default_delimiter(),
            strip_quotes: false,
            ignored_ids: BTreeSet::new(),
            column_map: BTreeMap::new(),
            record_set: None,
            root_record_id: None,
        }
    }
}

/// Parsed rows of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatch {
    pub template_name: String,
    /// Record id -> column header -> raw cell text, in file order
    pub rows: IndexMap<String, IndexMap<String, String>>,
}

/// What applying a batch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    /// Columns that matched no field
    pub skipped_columns: Vec<String>,
}

/// A progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    pub title: String,
    pub message: String,
    pub current: u64,
    pub total: u64,
}

/// Shared flag an import checks between rows.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A source of record table data.
pub trait RecordDataSource {
    fn import_data(
        &self,
        template: &RecordTableImportTemplate,
        source: &Path,
        progress: &mut dyn FnMut(ImportProgress),
        cancel: &CancellationFlag,
    ) -> Result<ImportBatch>;
}

// =============================================================================
// CSV
// =============================================================================

/// Reads delimited text files with a header row.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvRecordDataSource;

impl RecordDataSource for CsvRecordDataSource {
    fn import_data(
        &self,
        template: &RecordTableImportTemplate,
        source: &Path,
        progress: &mut dyn FnMut(ImportProgress),
        cancel: &CancellationFlag,
    ) -> Result<ImportBatch> {
        let file = File::open(source).map_err(|e| {
            error!("Source file could not be read: {}", source.display());
            TomeError::IoRead {
                path: source.to_path_buf(),
                source: e,
            }
        })?;
        let total = file.metadata().map(|m| m.len()).unwrap_or(0);

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.display().to_string());
        let title = format!("Importing {} With {}", file_name, template.name);
        report(progress, &title, "Opening File", 0, 100);

        if !template.delimiter.is_ascii() {
            return Err(TomeError::ImportFormat(format!(
                "Delimiter {:?} is not a single-byte character",
                template.delimiter
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(template.delimiter as u8)
            .quoting(template.strip_quotes)
            .flexible(true)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        if total == 0 || headers.iter().all(str::is_empty) {
            return Err(TomeError::ImportFormat(format!(
                "Source file is empty: {}",
                source.display()
            )));
        }

        let id_index = headers
            .iter()
            .position(|h| h == template.id_column)
            .ok_or_else(|| {
                TomeError::ImportFormat(format!(
                    "Could not find id column {} in source file: {}",
                    template.id_column,
                    source.display()
                ))
            })?;

        let mut batch = ImportBatch {
            template_name: template.name.clone(),
            rows: IndexMap::new(),
        };

        let mut row = csv::StringRecord::new();
        let mut index = 0;
        loop {
            if cancel.is_cancelled() {
                info!("Import {} cancelled after {} rows", template.name, index);
                return Err(TomeError::ImportCancelled);
            }
            if !reader.read_record(&mut row)? {
                break;
            }

            index += 1;
            if row.len() != headers.len() {
                return Err(TomeError::ImportFormat(format!(
                    "Row {} has {} columns, but the header has {} columns.",
                    index,
                    row.len(),
                    headers.len()
                )));
            }

            let record_id = row[id_index].to_string();
            report(progress, &title, &record_id, reader.position().byte(), total);

            if template.ignored_ids.contains(&record_id) {
                debug!("Skipping ignored record {}", record_id);
                continue;
            }

            let cells = headers
                .iter()
                .zip(row.iter())
                .enumerate()
                .filter(|(i, _)| *i != id_index)
                .map(|(_, (header, cell))| (header.to_string(), cell.to_string()))
                .collect();
            batch.rows.insert(record_id, cells);
        }

        report(progress, &title, "", 1, 1);
        info!(
            "Read {} records from {} with template {}",
            batch.rows.len(),
            source.display(),
            template.name
        );
        Ok(batch)
    }
}

fn report(progress: &mut dyn FnMut(ImportProgress), title: &str, message: &str, current: u64, total: u64) {
    progress(ImportProgress {
        title: title.to_string(),
        message: message.to_string(),
        current,
        total,
    });
}

// =============================================================================
// Background import
// =============================================================================

/// A running import.
pub struct ImportTask {
    progress: mpsc::UnboundedReceiver<ImportProgress>,
    cancel: CancellationFlag,
    handle: JoinHandle<Result<ImportBatch>>,
}

impl ImportTask {
    /// Next progress notification; `None` once the import has finished.
    pub async fn next_progress(&mut self) -> Option<ImportProgress> {
        self.progress.recv().await
    }

    /// Request the import to stop before its next row
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> Result<ImportBatch> {
        self.handle
            .await
            .map_err(|e| TomeError::ImportTask(format!("Async task failed: {}", e)))?
    }
}

/// Run `source` on a blocking worker. Must be called inside a Tokio runtime.
pub fn spawn_import<S>(source: S, template: RecordTableImportTemplate, path: PathBuf) -> ImportTask
where
    S: RecordDataSource + Send + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancel = CancellationFlag::new();
    let worker_cancel = cancel.clone();

    let handle = task::spawn_blocking(move || {
        let mut forward = |update: ImportProgress| {
            // The receiver may already be gone; progress is best effort.
            let _ = sender.send(update);
        };
        source.import_data(&template, &path, &mut forward, &worker_cancel)
    });

    ImportTask {
        progress: receiver,
        cancel,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn run(template: &RecordTableImportTemplate, content: &str) -> (Result<ImportBatch>, Vec<ImportProgress>) {
        let file = write_source(content);
        let mut updates = Vec::new();
        let result = CsvRecordDataSource.import_data(
            template,
            file.path(),
            &mut |p| updates.push(p),
            &CancellationFlag::new(),
        );
        (result, updates)
    }

    #[test]
    fn test_reads_rows() {
        let mut template = RecordTableImportTemplate::new("Monsters", "Id");
        template.ignored_ids.insert("skip".to_string());

        let (result, updates) = run(&template, "Id;Hp;Name\ngoblin;10;Goblin\nskip;1;Skip\norc;20;Orc\n");
        let batch = result.unwrap();

        assert_eq!(batch.template_name, "Monsters");
        let ids: Vec<&str> = batch.rows.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["goblin", "orc"]);
        assert_eq!(batch.rows["goblin"]["Hp"], "10");
        assert!(!batch.rows["goblin"].contains_key("Id"));

        assert_eq!(updates.first().unwrap().message, "Opening File");
        let last = updates.last().unwrap();
        assert_eq!((last.current, last.total), (1, 1));
        assert_eq!(updates.len(), 5);
    }

    #[test]
    fn test_row_progress_counts_bytes_read() {
        let template = RecordTableImportTemplate::new("Monsters", "Id");
        let content = "Id;Hp\ngoblin;10\norc;20\n";

        let (result, updates) = run(&template, content);
        result.unwrap();

        let rows: Vec<&ImportProgress> = updates.iter().filter(|p| p.message == "goblin" || p.message == "orc").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].current, "Id;Hp\ngoblin;10\n".len() as u64);
        assert_eq!(rows[1].current, content.len() as u64);
        assert_eq!(rows[1].total, content.len() as u64);
    }

    #[test]
    fn test_strip_quotes() {
        let mut template = RecordTableImportTemplate::new("Quoted", "Id");
        template.delimiter = ',';

        let (result, _) = run(&template, "\"Id\",\"Name\"\n\"a\",\"Alpha\"\n");
        assert!(matches!(result, Err(TomeError::ImportFormat(_))));

        template.strip_quotes = true;
        let (result, _) = run(&template, "\"Id\",\"Name\"\n\"a\",\"Alpha\"\n");
        assert_eq!(result.unwrap().rows["a"]["Name"], "Alpha");
    }

    #[test]
    fn test_format_errors() {
        let template = RecordTableImportTemplate::new("Monsters", "Id");

        let (result, _) = run(&template, "");
        assert!(matches!(result, Err(TomeError::ImportFormat(_))));

        let (result, _) = run(&template, "Key;Hp\na;1\n");
        assert!(matches!(result, Err(TomeError::ImportFormat(_))));

        let (result, _) = run(&template, "Id;Hp\na;1\nb;2;3\n");
        match result {
            Err(TomeError::ImportFormat(message)) => assert!(message.starts_with("Row 2 ")),
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let template = RecordTableImportTemplate::new("Monsters", "Id");
        let dir = tempfile::tempdir().unwrap();
        let result = CsvRecordDataSource.import_data(
            &template,
            &dir.path().join("missing.csv"),
            &mut |_| {},
            &CancellationFlag::new(),
        );
        assert!(matches!(result, Err(TomeError::IoRead { .. })));
    }

    #[test]
    fn test_cancelled_before_first_row() {
        let template = RecordTableImportTemplate::new("Monsters", "Id");
        let file = write_source("Id;Hp\na;1\n");
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = CsvRecordDataSource.import_data(&template, file.path(), &mut |_| {}, &cancel);
        assert!(matches!(result, Err(TomeError::ImportCancelled)));
    }

    #[tokio::test]
    async fn test_spawn_import_reports_progress() {
        let file = write_source("Id;Hp\na;1\nb;2\n");
        let template = RecordTableImportTemplate::new("Monsters", "Id");

        let mut task = spawn_import(CsvRecordDataSource, template, file.path().to_path_buf());
        let mut updates = Vec::new();
        while let Some(update) = task.next_progress().await {
            updates.push(update);
        }
        let batch = task.outcome().await.unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(updates.len(), 4);
        assert!(updates[0].title.contains("Monsters"));
    }
}
