//! Record Export CLI
//!
//! Renders the records of a project through an export template. Templates are
//! looked up in the project first, then the configured template directory,
//! then the bundled set.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use tome::export::{bundled_templates, load_templates_from_dir};
use tome::{Project, RecordExportTemplate, TomeConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tome-export")]
#[command(about = "Export project records through a template")]
struct Cli {
    /// Project document (defaults to the configured path)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template name
    #[arg(short, long)]
    template: Option<String>,

    /// Output file; `-` writes to stdout. Defaults to <output_dir>/<project>.<ext>
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List available templates and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = TomeConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    let path = cli.project.unwrap_or_else(|| config.project_path());
    let project = Project::load(&path)?;

    let templates = available_templates(&project, &config)?;

    if cli.list {
        for (template, origin) in &templates {
            println!("{} (.{}) [{}]", template.name, template.file_extension, origin);
        }
        return Ok(());
    }

    let Some(name) = cli.template else {
        bail!("No template given; use --list to see the available ones");
    };
    let Some((template, origin)) = templates.iter().find(|(t, _)| t.name == name) else {
        bail!("Unknown export template: {}", name);
    };
    debug!("Using {} template {}", origin, template.name);

    let workspace = project.into_workspace();
    let engine = workspace.export_engine();

    match cli.output {
        Some(output) if output.as_os_str() == "-" => {
            let stdout = std::io::stdout();
            engine.export_records(template, &mut stdout.lock())?;
        }
        output => {
            let output = output.unwrap_or_else(|| {
                config
                    .output_dir()
                    .join(format!("{}.{}", workspace.name, template.file_extension))
            });
            engine.export_records_to_path(template, &output)?;
            eprintln!("✅ Exported {} records to {}", engine.exported_records(template).len(), output.display());
        }
    }

    Ok(())
}

/// Every reachable template with where it came from. Earlier origins shadow later ones.
fn available_templates(project: &Project, config: &TomeConfig) -> anyhow::Result<Vec<(RecordExportTemplate, &'static str)>> {
    let mut templates: Vec<(RecordExportTemplate, &'static str)> = project
        .record_export_templates
        .iter()
        .cloned()
        .map(|t| (t, "project"))
        .collect();

    if let Some(dir) = &config.export.template_dir {
        let loaded = load_templates_from_dir(dir)
            .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
        templates.extend(loaded.into_iter().map(|t| (t, "directory")));
    }

    if config.export.include_builtin_templates {
        templates.extend(bundled_templates()?.into_iter().map(|t| (t, "bundled")));
    }

    let mut seen = std::collections::HashSet::new();
    templates.retain(|(t, _)| seen.insert(t.name.clone()));
    Ok(templates)
}
