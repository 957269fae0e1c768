//! Per-build state shared by every step: the workspace root, the output
//! numbering counter, and the tool path cache.

use crate::error::ToolError;
use camino::{Utf8Path, Utf8PathBuf};
use process_runner::ProcessRunner;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// State for one build session.
#[derive(Debug)]
pub struct BuildContext {
    workspace_root: Utf8PathBuf,
    build_counter: AtomicUsize,
    overrides: Mutex<HashMap<String, Utf8PathBuf>>,
    resolved: Mutex<HashMap<String, Utf8PathBuf>>,
}

impl BuildContext {
    /// Creates a context rooted at `workspace_root`.
    pub fn new(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            build_counter: AtomicUsize::new(0),
            overrides: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// The workspace root.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Resolves `path` against the workspace root unless it is absolute.
    pub fn resolve_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.workspace_root.join(path)
        }
    }

    /// Returns the next output number, starting at 1.
    pub fn next_build_number(&self) -> usize {
        self.build_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Pins `name` to an explicit binary path. Relative paths are taken from
    /// the workspace root.
    pub fn register_tool(&self, name: impl Into<String>, path: impl Into<Utf8PathBuf>) {
        let name = name.into();
        let path = self.resolve_path(&path.into());
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
        self.overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, path);
    }

    /// Locates the binary for `name`.
    ///
    /// Search order:
    /// 1. Registered overrides
    /// 2. `node_modules/.bin` in the workspace root or any parent directory
    /// 3. System PATH
    ///
    /// Successful lookups are cached for the lifetime of the context.
    pub fn resolve_tool(&self, name: &str) -> Result<Utf8PathBuf, ToolError> {
        if let Some(path) = self
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(path.clone());
        }

        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = resolved.get(name) {
            return Ok(path.clone());
        }

        let path = find_in_node_modules(&self.workspace_root, name)
            .or_else(|| {
                which::which(name)
                    .ok()
                    .and_then(|p| Utf8PathBuf::try_from(p).ok())
            })
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        debug!(tool = name, path = %path, "resolved tool");
        resolved.insert(name.to_string(), path.clone());
        Ok(path)
    }

    /// Creates a fresh runner for the tool `name`.
    pub fn runner(&self, name: &str) -> Result<ProcessRunner, ToolError> {
        let path = self.resolve_tool(name)?;
        Ok(ProcessRunner::new(path))
    }
}

/// Walks up from `start` looking for `node_modules/.bin/<name>`, so nested
/// packages in a monorepo find tools installed at the root.
fn find_in_node_modules(start: &Utf8Path, name: &str) -> Option<Utf8PathBuf> {
    let candidates: Vec<String> = if cfg!(windows) {
        vec![
            format!("{name}.cmd"),
            format!("{name}.exe"),
            name.to_string(),
        ]
    } else {
        vec![name.to_string()]
    };

    let mut current = Some(start);
    while let Some(dir) = current {
        let bin = dir.join("node_modules/.bin");
        for candidate in &candidates {
            let path = bin.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }
        current = dir.parent();
    }
    None
}
