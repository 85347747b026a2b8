//! Integrity Check CLI
//!
//! Runs the integrity tasks over a project document and reports their messages.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tome::{Project, Severity, TomeConfig, ValidationEngine};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tome-validate")]
#[command(about = "Run integrity checks over a project")]
struct Cli {
    /// Project document (defaults to the configured path)
    project: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Least severe message to report (information, warning, error)
    #[arg(short, long)]
    severity: Option<Severity>,

    /// Task codes to skip, in addition to the configured ones
    #[arg(short, long = "disable", value_name = "CODE")]
    disabled: Vec<String>,

    /// Print messages as JSON
    #[arg(long)]
    json: bool,

    /// List the registered tasks and exit
    #[arg(long)]
    list_tasks: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Returns `false` when any error was reported.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = TomeConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    let mut engine = ValidationEngine::with_default_tasks();
    for code in config.validation.disabled_tasks.iter().chain(&cli.disabled) {
        engine.disable(code);
    }

    if cli.list_tasks {
        for code in engine.task_codes() {
            println!("{}", code);
        }
        return Ok(true);
    }

    let path = cli.project.unwrap_or_else(|| config.project_path());
    let workspace = Project::load(&path)?.into_workspace();
    let minimum = cli.severity.unwrap_or(config.validation.minimum_severity);
    let messages = workspace.validate(&engine, minimum);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        println!("🔍 Checking {} ({} records)", workspace.name, workspace.records.len());
        for message in &messages {
            let marker = match message.severity {
                Severity::Error => "❌",
                Severity::Warning => "⚠️ ",
                Severity::Information => "ℹ️ ",
            };
            println!("  {} {}", marker, message);
        }
    }

    let errors = messages.iter().filter(|m| m.severity == Severity::Error).count();
    if !cli.json {
        if errors == 0 {
            println!("✅ {} messages, no errors", messages.len());
        } else {
            println!("❌ {} messages, {} errors", messages.len(), errors);
        }
    }

    Ok(errors == 0)
}
