//! Record Table Import CLI
//!
//! Reads a delimited record table into a project and saves the result.
//! Ctrl-C cancels the import before anything is applied.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tome::{spawn_import, CsvRecordDataSource, Project, RecordTableImportTemplate, TomeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tome-import")]
#[command(about = "Import a record table into a project")]
struct Cli {
    /// Table to import
    source: PathBuf,

    /// Project document (defaults to the configured path)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Import template stored in the project
    #[arg(short, long, conflicts_with = "id_column")]
    template: Option<String>,

    /// Id column for an ad-hoc template built from the configured defaults
    #[arg(long)]
    id_column: Option<String>,

    /// Parent of newly created records (ad-hoc template only)
    #[arg(long, requires = "id_column")]
    root: Option<String>,

    /// Parse and report without saving
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = TomeConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    let project_path = cli.project.unwrap_or_else(|| config.project_path());
    let mut workspace = Project::load(&project_path)?.into_workspace();

    let template = match (&cli.template, &cli.id_column) {
        (Some(name), _) => workspace.import_template(name)?.clone(),
        (None, Some(id_column)) => {
            let mut template = RecordTableImportTemplate::new("Command Line", id_column.clone());
            template.delimiter = config.import.delimiter;
            template.strip_quotes = config.import.strip_quotes;
            template.root_record_id = cli.root.clone();
            template
        }
        (None, None) => anyhow::bail!("Either --template or --id-column is required"),
    };

    let mut task = spawn_import(CsvRecordDataSource, template.clone(), cli.source.clone());
    let cancel = task.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut last_percent = None;
    while let Some(progress) = task.next_progress().await {
        let percent = if progress.total == 0 {
            0
        } else {
            progress.current.saturating_mul(100) / progress.total
        };
        if last_percent != Some(percent) {
            eprintln!("📥 {} [{:>3}%] {}", progress.title, percent, progress.message);
            last_percent = Some(percent);
        }
    }

    let batch = task.outcome().await?;
    let summary = workspace.apply_import(&batch, &template)?;
    println!(
        "✅ {} records created, {} updated from {}",
        summary.created,
        summary.updated,
        cli.source.display()
    );
    for column in &summary.skipped_columns {
        println!("  ⚠️  Column {} matches no field", column);
    }

    if cli.dry_run {
        info!("Dry run, not saving {}", project_path.display());
        return Ok(());
    }

    workspace.to_project().save(&project_path, config.project.pretty)?;
    Ok(())
}
