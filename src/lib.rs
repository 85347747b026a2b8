//! Tome Data Core
//!
//! The authoring core of a structured game-data editor: user-defined types,
//! field definitions grouped into components, records that inherit field
//! values down a parent hierarchy, integrity checks and templated export.
//!
//! ## Features
//!
//! - **Custom Types**: Enumerations, lists, maps and facet-restricted derived types
//! - **Inheriting Records**: A record sees the nearest ancestor override, then the field default
//! - **Cascading Edits**: Renames flow through type references, record values and references
//! - **Integrity Checks**: Pluggable tasks reporting coded, severity-ranked messages
//! - **Templated Export**: Placeholder templates rendering records into any text format
//! - **Table Import**: Delimited record tables applied as one atomic batch
//!
//! ## Architecture
//!
//! ```text
//! Project (JSON document)
//! └── Workspace
//!     ├── TypeRegistry    built-in + custom types
//!     ├── FieldCatalog    field definitions, components
//!     ├── RecordGraph     records, parents, overrides
//!     ├── ValidationEngine -> Vec<Message>
//!     ├── ExportEngine     -> rendered text
//!     └── ImportTask       -> ImportBatch -> apply_import
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod fields;
pub mod import;
pub mod integrity;
pub mod project;
pub mod records;
pub mod types;
pub mod values;

pub use config::TomeConfig;
pub use error::{Result, TomeError};
pub use export::{ExportEngine, RecordExportTemplate, ValueEscape};
pub use fields::{ComponentSet, FieldCatalog, FieldDefinition, FieldDefinitionSet};
pub use import::{
    spawn_import, CancellationFlag, CsvRecordDataSource, ImportBatch, ImportProgress, ImportSummary, ImportTask,
    RecordDataSource, RecordTableImportTemplate,
};
pub use integrity::{Message, Severity, TargetSiteType, Task, TaskContext, ValidationEngine};
pub use project::{Project, Workspace};
pub use records::{Record, RecordGraph, RecordSet};
pub use types::{CustomType, CustomTypeKind, CustomTypeSet, Facet, PrimitiveType, TypeRegistry};
pub use values::ValueConverter;
