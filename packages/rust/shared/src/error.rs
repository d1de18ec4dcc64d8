//! Error types for formpipe.
//!
//! Library crates use [`FormPipeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all formpipe operations.
#[derive(Debug, thiserror::Error)]
pub enum FormPipeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A template file could not be read or is malformed.
    #[error("template error in {path:?}: {message}")]
    Template { path: PathBuf, message: String },

    /// Spreadsheet data does not satisfy the template.
    #[error("data error: {message}")]
    Data { message: String },

    /// The external tool exited non-zero or could not be spawned.
    #[error("tool error: {operation} failed: {message}")]
    Tool { operation: String, message: String },

    /// The external tool did not finish within its time budget.
    #[error("tool error: {operation} timed out after {}s", timeout.as_secs())]
    ToolTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FormPipeError>;

/// Failure classification the orchestrator branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad configuration or template; detected before any file is touched.
    Config,
    /// Malformed or missing spreadsheet data; aborts only the current file.
    Data,
    /// External tool failure; aborts only the current file.
    Tool,
    /// Rename, move, copy or delete failure; aborts only the current file.
    Filesystem,
    /// Halts the whole run.
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Data => "data",
            Self::Tool => "tool",
            Self::Filesystem => "filesystem",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FormPipeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a template error for the given template file.
    pub fn template(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Template {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a data error from any displayable message.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data {
            message: msg.into(),
        }
    }

    /// Create a tool error for the named tool operation.
    pub fn tool(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Tool {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for the orchestrator.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::Template { .. } => ErrorKind::Config,
            Self::Data { .. } => ErrorKind::Data,
            Self::Tool { .. } => ErrorKind::Tool,
            Self::ToolTimeout { .. } => ErrorKind::Fatal,
            Self::Io { .. } => ErrorKind::Filesystem,
        }
    }

    /// Whether this error must stop the run regardless of failure policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal | ErrorKind::Config)
    }
}
