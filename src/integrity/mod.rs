//! Integrity Validation
//!
//! Rule-based checks over a read-only snapshot of types, fields and records.
//! Editing never blocks on inconsistencies; this engine reports them instead.
//!
//! ## Tasks
//! Every rule is an independent [`Task`] with a stable message code (see
//! [`tasks`]). The engine runs all registered tasks in registration order and
//! concatenates their messages. A panicking task is isolated: it yields a
//! single `TO0000` error and the remaining tasks still run.

pub mod tasks;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::fields::FieldCatalog;
use crate::records::RecordGraph;
use crate::types::TypeRegistry;

/// Message code reported for a task that panicked
pub const TASK_PANICKED_CODE: &str = "TO0000";

// =============================================================================
// Messages
// =============================================================================

/// How bad a finding is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "information" | "info" => Ok(Severity::Information),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// What kind of entity a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSiteType {
    None,
    Type,
    Field,
    Record,
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_code: String,
    pub severity: Severity,
    pub content: String,
    pub target_site_id: String,
    pub target_site_type: TargetSiteType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
}

impl Message {
    pub fn new(code: &str, severity: Severity, content: impl Into<String>) -> Self {
        Self {
            message_code: code.to_string(),
            severity,
            content: content.into(),
            target_site_id: String::new(),
            target_site_type: TargetSiteType::None,
            help_link: None,
        }
    }

    pub fn error(code: &str, content: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, content)
    }

    pub fn warning(code: &str, content: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, content)
    }

    /// Attach the entity this message is about
    pub fn at(mut self, site_type: TargetSiteType, site_id: impl Into<String>) -> Self {
        self.target_site_type = site_type;
        self.target_site_id = site_id.into();
        self
    }

    pub fn with_help_link(mut self, link: impl Into<String>) -> Self {
        self.help_link = Some(link.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.message_code, self.severity, self.content)
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Read-only snapshot a task checks.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub types: &'a TypeRegistry,
    pub fields: &'a FieldCatalog,
    pub records: &'a RecordGraph,
}

impl<'a> TaskContext<'a> {
    pub fn new(types: &'a TypeRegistry, fields: &'a FieldCatalog, records: &'a RecordGraph) -> Self {
        Self { types, fields, records }
    }
}

/// A single integrity rule
pub trait Task: Send + Sync {
    /// Stable message code of the rule
    fn code(&self) -> &str;

    fn display_name(&self) -> &str;

    fn execute(&self, ctx: &TaskContext<'_>) -> Vec<Message>;
}

/// A task backed by a plain function or closure
pub struct FnTask<F> {
    code: String,
    display_name: String,
    check: F,
}

impl<F> FnTask<F>
where
    F: Fn(&TaskContext<'_>) -> Vec<Message> + Send + Sync,
{
    pub fn new(code: impl Into<String>, display_name: impl Into<String>, check: F) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            check,
        }
    }
}

impl<F> Task for FnTask<F>
where
    F: Fn(&TaskContext<'_>) -> Vec<Message> + Send + Sync,
{
    fn code(&self) -> &str {
        &self.code
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn execute(&self, ctx: &TaskContext<'_>) -> Vec<Message> {
        (self.check)(ctx)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Runs a fixed, ordered list of tasks.
#[derive(Default)]
pub struct ValidationEngine {
    tasks: Vec<Box<dyn Task>>,
    disabled: HashSet<String>,
}

impl ValidationEngine {
    /// An engine without any tasks
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine running every built-in rule
    pub fn with_default_tasks() -> Self {
        let mut engine = Self::new();
        for task in tasks::default_tasks() {
            engine.tasks.push(task);
        }
        engine
    }

    pub fn register(&mut self, task: impl Task + 'static) -> &mut Self {
        debug!("Registered integrity task {}", task.code());
        self.tasks.push(Box::new(task));
        self
    }

    /// Skip the task with message code `code` on later runs
    pub fn disable(&mut self, code: &str) -> &mut Self {
        self.disabled.insert(code.to_string());
        self
    }

    /// Codes of all registered tasks, in run order
    pub fn task_codes(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.code()).collect()
    }

    /// Run every enabled task and concatenate the results.
    pub fn run(&self, ctx: &TaskContext<'_>) -> Vec<Message> {
        let mut messages = Vec::new();

        for task in &self.tasks {
            if self.disabled.contains(task.code()) {
                debug!("Skipping disabled task {}", task.code());
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| task.execute(ctx))) {
                Ok(found) => {
                    debug!("Task {} reported {} messages", task.code(), found.len());
                    messages.extend(found);
                }
                Err(_) => {
                    warn!("Integrity task {} panicked", task.code());
                    messages.push(Message::error(
                        TASK_PANICKED_CODE,
                        format!("Integrity check {} ({}) failed to run.", task.display_name(), task.code()),
                    ));
                }
            }
        }

        info!(
            "Integrity check finished: {} errors, {} warnings, {} messages total",
            messages.iter().filter(|m| m.severity == Severity::Error).count(),
            messages.iter().filter(|m| m.severity == Severity::Warning).count(),
            messages.len()
        );
        messages
    }

    /// Run all tasks, keeping only messages at least as severe as `minimum`.
    pub fn run_filtered(&self, ctx: &TaskContext<'_>, minimum: Severity) -> Vec<Message> {
        self.run(ctx)
            .into_iter()
            .filter(|m| m.severity >= minimum)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> (TypeRegistry, FieldCatalog, RecordGraph) {
        (TypeRegistry::new(), FieldCatalog::new(), RecordGraph::new())
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Information);
        assert_eq!("Warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_panicking_task_is_isolated() {
        let (types, fields, records) = empty();
        let ctx = TaskContext::new(&types, &fields, &records);

        let mut engine = ValidationEngine::new();
        engine
            .register(FnTask::new("X0001", "Before", |_: &TaskContext<'_>| {
                vec![Message::warning("X0001", "first")]
            }))
            .register(FnTask::new("X0002", "Broken", |_: &TaskContext<'_>| -> Vec<Message> {
                panic!("broken rule")
            }))
            .register(FnTask::new("X0003", "After", |_: &TaskContext<'_>| {
                vec![Message::error("X0003", "third")]
            }));

        let messages = engine.run(&ctx);
        let codes: Vec<&str> = messages.iter().map(|m| m.message_code.as_str()).collect();
        assert_eq!(codes, vec!["X0001", TASK_PANICKED_CODE, "X0003"]);
        assert_eq!(messages[1].severity, Severity::Error);
    }

    #[test]
    fn test_disable_and_filter() {
        let (types, fields, records) = empty();
        let ctx = TaskContext::new(&types, &fields, &records);

        let mut engine = ValidationEngine::new();
        engine
            .register(FnTask::new("X0001", "Warns", |_: &TaskContext<'_>| {
                vec![Message::warning("X0001", "w").at(TargetSiteType::Field, "hp")]
            }))
            .register(FnTask::new("X0002", "Errors", |_: &TaskContext<'_>| {
                vec![Message::error("X0002", "e").with_help_link("https://example.com/X0002")]
            }));

        let errors = engine.run_filtered(&ctx, Severity::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].help_link.as_deref(), Some("https://example.com/X0002"));

        engine.disable("X0002");
        let messages = engine.run(&ctx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].target_site_type, TargetSiteType::Field);
        assert_eq!(messages[0].target_site_id, "hp");
    }

    #[test]
    fn test_default_tasks_registered_once() {
        let engine = ValidationEngine::with_default_tasks();
        let codes = engine.task_codes();
        let unique: HashSet<&str> = codes.iter().copied().collect();
        assert_eq!(codes.len(), unique.len());
        assert!(codes.contains(&"TO0101"));
        assert!(codes.contains(&"TO0205"));
    }
}
