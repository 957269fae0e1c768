//! Error types shared by the build steps.

use crate::lint::LintReport;
use camino::Utf8PathBuf;
use process_runner::InvocationError;
use thiserror::Error;

/// Error types for build steps.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool binary could not be located.
    #[error("{0} not found in node_modules/.bin or PATH")]
    NotFound(String),

    /// The tool ran and failed, could not start, or is still busy.
    #[error("{tool}: {}", describe_failure(.source))]
    Process {
        tool: String,
        source: InvocationError,
    },

    /// Validation found errors, so compilation was skipped.
    #[error("{} lint error(s) in {entry}, not compiled", .report.error_count())]
    Validation { entry: Utf8PathBuf, report: LintReport },

    /// Reading or writing a file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    /// Invalid glob pattern.
    #[error("invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// The file watcher failed.
    #[error("watch error: {0}")]
    Watch(String),
}

impl ToolError {
    /// Returns whether this error only means the tool was still running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Process {
                source: InvocationError::Busy,
                ..
            }
        )
    }

    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Tools often fail without writing to stderr; fall back to the exit code.
fn describe_failure(error: &InvocationError) -> String {
    let text = error.to_string();
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    match error {
        InvocationError::Failed { code: Some(code), .. } => format!("exited with code {code}"),
        InvocationError::Failed { code: None, .. } => "terminated by a signal".to_string(),
        _ => "failed".to_string(),
    }
}
