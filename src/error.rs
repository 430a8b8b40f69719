//! The single structured error surfaced by evaluation.
//!
//! Every fatal problem, whether a malformed element, an unresolvable import
//! or a bad condition, ends up as a [`ProjectError`] carrying a stable code,
//! the offending file and a line/column pair.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Broad classification of a [`ProjectError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed XML, unexpected element, missing attribute, reserved name.
    Syntax,
    /// A condition that cannot be parsed or evaluated.
    ConditionEvaluation,
    /// A required import that cannot be found.
    ImportResolution,
    /// An import that leads back to a file currently being imported.
    CircularImport,
    /// No SDK resolver could satisfy an SDK reference.
    SdkResolution,
    /// Invalid `TreatAsLocalProperty` list, bad SDK name, bad toolset file.
    InvalidConfiguration,
    /// Underlying filesystem failure.
    Io,
}

/// Where an error happened. Any part may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
}

impl ErrorLocation {
    pub fn new(file: Option<&Path>, line: u32, column: u32) -> Self {
        Self { file: file.map(Path::to_path_buf), line, column }
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), 0) => write!(f, "{}: ", file.display()),
            (Some(file), line) => write!(f, "{}({},{}): ", file.display(), line, self.column),
            (None, 0) => Ok(()),
            (None, line) => write!(f, "({},{}): ", line, self.column),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{location}error {code}: {message}")]
pub struct ProjectError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
    pub location: ErrorLocation,
}

impl ProjectError {
    pub fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self { kind, code, message: message.into(), location: ErrorLocation::default() }
    }

    pub fn syntax(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, code, message)
    }

    pub fn condition(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConditionEvaluation, code, message)
    }

    pub fn import(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ImportResolution, code, message)
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration, code, message)
    }

    /// Attach a location unless one is already present.
    pub fn at(mut self, file: Option<&Path>, line: u32, column: u32) -> Self {
        if self.location.file.is_none() && self.location.line == 0 {
            self.location = ErrorLocation::new(file, line, column);
        } else if self.location.file.is_none() {
            self.location.file = file.map(Path::to_path_buf);
        }
        self
    }

    /// Attach only a file, keeping any line/column already recorded.
    pub fn in_file(mut self, file: &Path) -> Self {
        if self.location.file.is_none() {
            self.location.file = Some(file.to_path_buf());
        }
        self
    }
}

impl From<std::io::Error> for ProjectError {
    fn from(error: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, "MSB4025", format!("IO Error: {error}"))
    }
}

impl From<roxmltree::Error> for ProjectError {
    fn from(error: roxmltree::Error) -> Self {
        let pos = error.pos();
        let mut err = Self::syntax("MSB4025", format!("The project file could not be loaded. {error}"));
        err.location.line = pos.row;
        err.location.column = pos.col;
        err
    }
}

impl From<toml::de::Error> for ProjectError {
    fn from(error: toml::de::Error) -> Self {
        Self::configuration("MSB4136", format!("Invalid toolset definition: {error}"))
    }
}
