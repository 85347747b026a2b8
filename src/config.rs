//! Configuration for the command-line tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (tome.toml, .tome.toml, config/tome.toml)
//! - The user config directory (tome/tome.toml)
//! - An explicitly given file
//! - Environment variables (TOME__SECTION__KEY)
//!
//! ## Example config file (tome.toml):
//! ```toml
//! [project]
//! path = "game.tome.json"
//! pretty = true
//!
//! [validation]
//! minimum_severity = "warning"
//! disabled_tasks = ["TO0203"]
//!
//! [export]
//! template_dir = "export-templates"
//! output_dir = "build/data"
//!
//! [import]
//! delimiter = ","
//! strip_quotes = true
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, TomeError};
use crate::integrity::Severity;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomeConfig {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub import: ImportConfig,
}

/// Project document settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Path to the project document
    #[serde(default = "default_project_path")]
    pub path: PathBuf,

    /// Pretty-print the document on save
    #[serde(default = "default_true")]
    pub pretty: bool,
}

/// Integrity check settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Least severe message to report
    #[serde(default = "default_minimum_severity")]
    pub minimum_severity: Severity,

    /// Message codes of tasks to skip
    #[serde(default)]
    pub disabled_tasks: Vec<String>,
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory of additional `*.toml` export templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_true")]
    pub include_builtin_templates: bool,
}

/// Defaults for import templates created on the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default)]
    pub strip_quotes: bool,
}

fn default_project_path() -> PathBuf {
    PathBuf::from("project.tome.json")
}

fn default_true() -> bool {
    true
}

fn default_minimum_severity() -> Severity {
    Severity::Information
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_delimiter() -> char {
    ';'
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
            pretty: true,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            minimum_severity: default_minimum_severity(),
            disabled_tasks: Vec::new(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            template_dir: None,
            output_dir: default_output_dir(),
            include_builtin_templates: true,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            strip_quotes: false,
        }
    }
}

impl TomeConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering `config_path` over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        for location in ["tome.toml", ".tome.toml", "config/tome.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "tome", "tome") {
            let user_config = dirs.config_dir().join("tome.toml");
            if user_config.exists() {
                debug!("Using user config {}", user_config.display());
                builder = builder.add_source(File::from(user_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix("TOME").separator("__").try_parsing(true));

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TomeError::IoWrite {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        std::fs::write(path, content).map_err(|source| TomeError::IoWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The project path, resolved against the working directory
    pub fn project_path(&self) -> PathBuf {
        resolve(&self.project.path)
    }

    pub fn output_dir(&self) -> PathBuf {
        resolve(&self.export.output_dir)
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
