//! Source discovery and ignore patterns.

use crate::error::ToolError;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

/// Patterns ignored everywhere.
pub const DEFAULT_IGNORES: &[&str] = &["**/node_modules/**", "**/.git/**"];

/// Builds a glob set from the default ignores plus `patterns`.
pub fn ignore_set<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet, ToolError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_IGNORES
        .iter()
        .copied()
        .chain(patterns.iter().map(|p| p.as_ref()))
    {
        let glob = Glob::new(pattern)
            .map_err(|e| ToolError::InvalidGlob(format!("{pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ToolError::InvalidGlob(e.to_string()))
}

/// Collects files under `roots` whose names end with one of `extensions`.
///
/// `roots` are relative to `workspace` unless absolute; a root may also be a
/// single file. Ignore patterns match against the workspace-relative path.
/// The result is sorted.
pub fn find_sources(
    workspace: &Utf8Path,
    roots: &[Utf8PathBuf],
    extensions: &[String],
    ignore: &GlobSet,
) -> Vec<Utf8PathBuf> {
    let mut files: Vec<Utf8PathBuf> = roots
        .iter()
        .map(|root| {
            if root.is_absolute() {
                root.clone()
            } else {
                workspace.join(root)
            }
        })
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| Utf8PathBuf::try_from(e.into_path()).ok())
        .filter(|p| {
            let file_name = p.file_name().unwrap_or("");
            extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
        })
        .filter(|p| {
            let relative = p.strip_prefix(workspace).unwrap_or(p);
            !ignore.is_match(relative.as_str())
        })
        .collect();
    files.sort();
    files.dedup();
    files
}
