//! Parser for the `unix` output format of ESLint and stylelint.

use camino::Utf8PathBuf;
use serde::Serialize;

/// A single finding reported by a linter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintDiagnostic {
    /// The file path, as printed by the tool.
    pub file: Utf8PathBuf,
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
    /// The message, without the trailing severity/rule tag.
    pub message: String,
    /// The severity.
    pub severity: LintSeverity,
    /// The rule that fired, when the tool names one.
    pub rule: Option<String>,
}

/// Lint severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Error,
    Warning,
}

/// Parses linter output into diagnostics. Lines that are not diagnostics
/// (summaries, blank lines) are skipped.
pub fn parse_unix_output(output: &str) -> Vec<LintDiagnostic> {
    output.lines().filter_map(parse_diagnostic_line).collect()
}

/// Parses a single diagnostic line.
///
/// Formats:
/// - ESLint: `file:line:column: message [Error/rule]`
/// - stylelint: `file:line:column: message (rule) [error]`
fn parse_diagnostic_line(line: &str) -> Option<LintDiagnostic> {
    let line = line.trim_end();
    let (location, rest) = line.split_once(": ")?;

    // Parse location (file:line:column)
    let loc_parts: Vec<&str> = location.rsplitn(3, ':').collect();
    if loc_parts.len() < 3 {
        return None;
    }
    let column: u32 = loc_parts[0].parse().ok()?;
    let line_num: u32 = loc_parts[1].parse().ok()?;
    let file = loc_parts[2];
    if file.is_empty() {
        return None;
    }

    // Trailing [Severity/rule] or [severity] tag
    let tag_start = rest.rfind(" [")?;
    let tag = rest[tag_start + 2..].strip_suffix(']')?;
    let mut message = rest[..tag_start].trim().to_string();

    let (severity, mut rule) = match tag.split_once('/') {
        Some((severity, rule)) => (severity, Some(rule.to_string())),
        None => (tag, None),
    };
    let severity = match severity.to_ascii_lowercase().as_str() {
        "error" => LintSeverity::Error,
        "warning" => LintSeverity::Warning,
        _ => return None,
    };

    if rule.is_none() {
        if let Some(open) = message.rfind(" (") {
            if let Some(name) = message[open + 2..].strip_suffix(')') {
                rule = Some(name.to_string());
                message.truncate(open);
            }
        }
    }

    Some(LintDiagnostic {
        file: Utf8PathBuf::from(file),
        line: line_num,
        column,
        message,
        severity,
        rule,
    })
}
