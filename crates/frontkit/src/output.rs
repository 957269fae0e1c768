//! Output formatting.

use crate::cli::OutputFormat;
use colored::Colorize;
use frontkit_tools::{ArtifactReport, LintDiagnostic, LintReport, LintSeverity, ToolError};
use serde::Serialize;

/// A build result as printed in JSON mode.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildRecord<'a> {
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gzip_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    written: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Formats build results and lint diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// The output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a successful build of `target`.
    pub fn built(&self, target: &str, artifact: &ArtifactReport) -> String {
        match self.format {
            OutputFormat::Human => {
                let mut sizes = human_bytes(artifact.bytes);
                if let Some(gz) = artifact.gzip_bytes {
                    sizes.push_str(&format!(", {} gzipped", human_bytes(gz)));
                }
                let verb = if artifact.written {
                    "built"
                } else {
                    "unchanged"
                };
                format!(
                    "{} {} {} {} ({})",
                    "✓".green().bold(),
                    target,
                    verb.dimmed(),
                    artifact.path.as_str().cyan(),
                    sizes
                )
            }
            OutputFormat::Json => to_json(&BuildRecord {
                target,
                output: Some(artifact.path.as_str()),
                bytes: Some(artifact.bytes),
                gzip_bytes: artifact.gzip_bytes,
                written: Some(artifact.written),
                error: None,
            }),
            OutputFormat::Machine => {
                format!("BUILT {} {} {}", target, artifact.path, artifact.bytes)
            }
        }
    }

    /// Formats a failed build or tool run.
    pub fn failed(&self, target: &str, error: &ToolError) -> String {
        match self.format {
            OutputFormat::Human => {
                format!("{} {}: {}", "✗".red().bold(), target, error.to_string().red())
            }
            OutputFormat::Json => to_json(&BuildRecord {
                target,
                output: None,
                bytes: None,
                gzip_bytes: None,
                written: None,
                error: Some(error.to_string()),
            }),
            OutputFormat::Machine => {
                let message = error.to_string().replace('\n', " ");
                format!("FAILED {} {}", target, message.trim_end())
            }
        }
    }

    /// Formats a completed step that produced no single artifact.
    pub fn done(&self, target: &str, detail: &str) -> String {
        match self.format {
            OutputFormat::Human => format!("{} {} {}", "✓".green().bold(), target, detail.dimmed()),
            OutputFormat::Json => serde_json::json!({ "target": target, "detail": detail }).to_string(),
            OutputFormat::Machine => format!("DONE {target} {detail}"),
        }
    }

    /// Formats lint diagnostics. Empty reports produce an empty string in
    /// the line-oriented formats and `[]` in JSON.
    pub fn lint_report(&self, report: &LintReport) -> String {
        match self.format {
            OutputFormat::Human => report.diagnostics.iter().map(format_human).collect(),
            OutputFormat::Json => {
                serde_json::to_string_pretty(&report.diagnostics).unwrap_or_default()
            }
            OutputFormat::Machine => report.diagnostics.iter().map(format_machine).collect(),
        }
    }
}

fn format_human(diag: &LintDiagnostic) -> String {
    let severity = match diag.severity {
        LintSeverity::Error => "Error".red().bold(),
        LintSeverity::Warning => "Warning".yellow().bold(),
    };
    let rule = diag
        .rule
        .as_ref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default();
    format!(
        "{}:{}:{}\n{}: {}{}\n\n",
        diag.file, diag.line, diag.column, severity, diag.message, rule
    )
}

fn format_machine(diag: &LintDiagnostic) -> String {
    let severity = match diag.severity {
        LintSeverity::Error => "ERROR",
        LintSeverity::Warning => "WARNING",
    };
    format!(
        "{} {}:{}:{} {}{}\n",
        severity,
        diag.file,
        diag.line,
        diag.column,
        diag.message,
        diag.rule
            .as_ref()
            .map(|r| format!(" ({r})"))
            .unwrap_or_default()
    )
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Formats a byte count with binary units.
fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    let n = bytes as f64;
    if n < KIB {
        format!("{bytes} B")
    } else if n < MIB {
        format!("{:.1} KiB", n / KIB)
    } else {
        format!("{:.1} MiB", n / MIB)
    }
}

/// Summary of a frontkit run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of outputs built.
    pub built: usize,
    /// Number of steps that failed.
    pub failed: usize,
    /// Number of lint errors.
    pub error_count: usize,
    /// Number of lint warnings.
    pub warning_count: usize,
}

impl RunSummary {
    /// Returns whether the run should exit non-zero.
    pub fn has_errors(&self) -> bool {
        self.failed > 0 || self.error_count > 0
    }

    /// Adds the counts from a lint report.
    pub fn record_lint(&mut self, report: &LintReport) {
        self.error_count += report.error_count();
        self.warning_count += report.warning_count();
    }

    /// Formats the summary line.
    pub fn format(&self) -> String {
        format!(
            "====================================\nfrontkit: {} {}, {} {}, {} {} and {} {}",
            self.built,
            plural(self.built, "output", "outputs"),
            self.failed,
            plural(self.failed, "failure", "failures"),
            self.error_count,
            plural(self.error_count, "error", "errors"),
            self.warning_count,
            plural(self.warning_count, "warning", "warnings"),
        )
    }
}

fn plural<'a>(count: usize, one: &'a str, many: &'a str) -> &'a str {
    if count == 1 {
        one
    } else {
        many
    }
}
