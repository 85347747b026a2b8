//! Error types for the data core

use std::path::PathBuf;

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, TomeError>;

/// Errors raised by structural edits, value conversion and the IO boundaries.
///
/// Dangling type references and unsupported type combinations are never
/// reported here; they are findings of the integrity engine.
#[derive(Error, Debug)]
pub enum TomeError {
    #[error("{kind} already exists: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Unknown type reference: {0}")]
    UnknownTypeReference(String),

    #[error("Cannot move record {record} below {parent}: the record would become its own ancestor")]
    CyclicAncestry { record: String, parent: String },

    #[error("Could not read {path}: {source}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write {path}: {source}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid import source: {0}")]
    ImportFormat(String),

    #[error("Import was cancelled")]
    ImportCancelled,

    #[error("Import task failed: {0}")]
    ImportTask(String),

    #[error("Invalid {type_name} value '{value}': {reason}")]
    InvalidValue {
        type_name: String,
        value: String,
        reason: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl TomeError {
    pub(crate) fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn invalid_value(
        type_name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            type_name: type_name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
