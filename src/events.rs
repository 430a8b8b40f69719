//! Structured evaluation events and the sinks that receive them.
//!
//! Events carry enough fields for a consumer to filter and aggregate without
//! parsing messages. [`TracingLogger`] forwards them to `tracing`;
//! [`CollectingLogger`] buffers them.

use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::properties::PropertyKind;

/// Line/column inside a particular file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventLocation {
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for EventLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}({},{})", file.display(), self.line, self.column),
            None => write!(f, "({},{})", self.line, self.column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Message,
    Warning,
}

/// Why an `<Import>` contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportIgnoredReason {
    FalseCondition,
    MissingFile,
    EmptyExpansion,
    NoMatches,
    SdkNotResolved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationEvent {
    ImportResolved {
        importing_file: Option<PathBuf>,
        imported_file: PathBuf,
        location: EventLocation,
    },
    ImportIgnored {
        importing_file: Option<PathBuf>,
        unevaluated_project: String,
        reason: ImportIgnoredReason,
        condition: Option<String>,
        evaluated_condition: Option<String>,
        /// Outcome of re-evaluating the condition for this event; `None`
        /// when there is no condition or the re-evaluation failed.
        condition_result: Option<bool>,
        location: EventLocation,
    },
    DuplicateImport {
        imported_file: PathBuf,
        location: EventLocation,
    },
    CircularImport {
        imported_file: PathBuf,
        location: EventLocation,
    },
    SdkResolved {
        sdk_name: String,
        path: PathBuf,
        version: Option<String>,
    },
    UninitializedPropertyRead {
        property_name: String,
        read_location: EventLocation,
        write_location: EventLocation,
    },
    PropertyReassignment {
        property_name: String,
        previous_value: String,
        new_value: String,
        location: EventLocation,
    },
    PropertyInitialValueSet {
        property_name: String,
        value: String,
        source: PropertyKind,
        location: Option<EventLocation>,
    },
    EnvironmentVariableRead {
        name: String,
        value: String,
        location: EventLocation,
    },
}

impl EvaluationEvent {
    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicateImport { .. }
            | Self::CircularImport { .. }
            | Self::UninitializedPropertyRead { .. } => Severity::Warning,
            _ => Severity::Message,
        }
    }

    /// Stable warning code for warning events.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::DuplicateImport { .. } => Some("MSB4011"),
            Self::CircularImport { .. } => Some("MSB4210"),
            Self::UninitializedPropertyRead { .. } => Some("MSB4211"),
            _ => None,
        }
    }
}

impl fmt::Display for EvaluationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImportResolved { imported_file, location, .. } => {
                write!(f, "{location}: importing project \"{}\"", imported_file.display())
            }
            Self::ImportIgnored { unevaluated_project, reason, evaluated_condition, location, .. } => {
                write!(f, "{location}: project \"{unevaluated_project}\" was not imported ({reason:?})")?;
                if let Some(cond) = evaluated_condition {
                    write!(f, "; condition evaluated to \"{cond}\"")?;
                }
                Ok(())
            }
            Self::DuplicateImport { imported_file, location } => write!(
                f,
                "{location}: warning MSB4011: \"{}\" cannot be imported again. It was already imported",
                imported_file.display()
            ),
            Self::CircularImport { imported_file, location } => write!(
                f,
                "{location}: warning MSB4210: \"{}\" is being imported circularly; the import is ignored",
                imported_file.display()
            ),
            Self::SdkResolved { sdk_name, path, version } => write!(
                f,
                "SDK \"{sdk_name}\" resolved to \"{}\" (version {})",
                path.display(),
                version.as_deref().unwrap_or("unspecified")
            ),
            Self::UninitializedPropertyRead { property_name, read_location, write_location } => write!(
                f,
                "{write_location}: warning MSB4211: The property \"{property_name}\" is being set to a value for the first time, but it was already consumed at \"{read_location}\""
            ),
            Self::PropertyReassignment { property_name, previous_value, new_value, location } => write!(
                f,
                "{location}: property reassignment: $({property_name})=\"{new_value}\" (previous value: \"{previous_value}\")"
            ),
            Self::PropertyInitialValueSet { property_name, value, source, .. } => {
                write!(f, "property initial value: $({property_name})=\"{value}\" source: {source:?}")
            }
            Self::EnvironmentVariableRead { name, value, location } => {
                write!(f, "{location}: property \"{name}\" read from environment variable with value \"{value}\"")
            }
        }
    }
}

/// Receives evaluation events.
pub trait EvaluationLogger: Send + Sync {
    fn log(&self, event: &EvaluationEvent);
}

/// Default sink: forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EvaluationLogger for TracingLogger {
    fn log(&self, event: &EvaluationEvent) {
        match event.severity() {
            Severity::Warning => {
                tracing::warn!(code = event.code().unwrap_or_default(), "{event}")
            }
            Severity::Message => tracing::debug!("{event}"),
        }
    }
}

/// Buffers every event; cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    events: Mutex<Vec<EvaluationEvent>>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EvaluationEvent> {
        self.events.lock().clone()
    }

    pub fn warnings(&self) -> Vec<EvaluationEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.severity() == Severity::Warning)
            .cloned()
            .collect()
    }

    /// Number of buffered events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EvaluationEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EvaluationLogger for CollectingLogger {
    fn log(&self, event: &EvaluationEvent) {
        self.events.lock().push(event.clone());
    }
}
