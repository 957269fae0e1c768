//! Linting through ESLint or stylelint.

use crate::context::BuildContext;
use crate::diagnostics::{parse_unix_output, LintDiagnostic, LintSeverity};
use crate::error::ToolError;
use camino::{Utf8Path, Utf8PathBuf};
use process_runner::{InvocationError, ProcessRunner, SpawnOptions};
use serde::Serialize;
use tracing::debug;

/// Supported linters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintTool {
    /// ESLint, for scripts.
    Eslint,
    /// stylelint, for stylesheets.
    Stylelint,
}

impl LintTool {
    /// Returns the binary name.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Eslint => "eslint",
            Self::Stylelint => "stylelint",
        }
    }

    /// Returns the arguments selecting the `unix` formatter.
    fn format_args(&self) -> [&'static str; 2] {
        match self {
            Self::Eslint => ["--format", "unix"],
            Self::Stylelint => ["--formatter", "unix"],
        }
    }

    /// Returns the default file extensions for this linter.
    pub fn default_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Eslint => &[".js", ".mjs", ".cjs", ".jsx", ".ts", ".tsx"],
            Self::Stylelint => &[".css", ".scss", ".sass"],
        }
    }
}

/// Diagnostics from one lint run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub diagnostics: Vec<LintDiagnostic>,
}

impl LintReport {
    /// Number of error diagnostics.
    pub fn error_count(&self) -> usize {
        self.count(LintSeverity::Error)
    }

    /// Number of warning diagnostics.
    pub fn warning_count(&self) -> usize {
        self.count(LintSeverity::Warning)
    }

    /// Returns whether nothing was reported.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn count(&self, severity: LintSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Runs a linter over a set of files.
#[derive(Debug)]
pub struct Linter {
    tool: LintTool,
    runner: ProcessRunner,
    workspace_root: Utf8PathBuf,
}

impl Linter {
    /// Creates a linter, resolving its binary through `ctx`.
    pub fn new(ctx: &BuildContext, tool: LintTool) -> Result<Self, ToolError> {
        Ok(Self {
            tool,
            runner: ctx.runner(tool.command_name())?,
            workspace_root: ctx.workspace_root().to_owned(),
        })
    }

    /// The linter in use.
    pub fn tool(&self) -> LintTool {
        self.tool
    }

    /// Lints `files`.
    ///
    /// Linters exit non-zero when they find errors, so a failed run whose
    /// stdout holds diagnostics is still a report. A failed run with nothing
    /// parseable is a tool failure.
    pub async fn lint(&self, files: &[Utf8PathBuf]) -> Result<LintReport, ToolError> {
        if files.is_empty() {
            return Ok(LintReport::default());
        }

        let mut args: Vec<String> = self
            .tool
            .format_args()
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(files.iter().map(|f| relative_arg(&self.workspace_root, f)));

        let options = SpawnOptions::new().with_working_directory(self.workspace_root.clone());
        let result = self.runner.run_to_end(&args, &options).await;
        let diagnostics = parse_unix_output(&result.output);
        debug!(
            tool = self.tool.command_name(),
            files = files.len(),
            diagnostics = diagnostics.len(),
            "lint finished"
        );

        match result.error {
            None => Ok(LintReport { diagnostics }),
            Some(InvocationError::Failed { .. }) if !diagnostics.is_empty() => {
                Ok(LintReport { diagnostics })
            }
            Some(source) => Err(ToolError::Process {
                tool: self.tool.command_name().to_string(),
                source,
            }),
        }
    }

    /// Returns whether a lint run is in flight.
    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Stops an in-flight lint run.
    pub fn kill(&self) {
        self.runner.kill();
    }
}

/// Paths under the workspace are passed relative, so tool output stays short.
pub(crate) fn relative_arg(workspace_root: &Utf8Path, path: &Utf8Path) -> String {
    path.strip_prefix(workspace_root)
        .unwrap_or(path)
        .as_str()
        .to_string()
}
