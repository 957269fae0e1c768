//! Configuration loading.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use thiserror::Error;

/// Default config file name, looked up in the workspace root.
pub const CONFIG_FILE: &str = "frontkit.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid JSON or has the wrong shape.
    #[error("invalid config {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    /// A tool path could not be expanded.
    #[error("invalid path for tool {tool}: {message}")]
    ToolPath { tool: String, message: String },
}

/// Project configuration from `frontkit.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FrontkitConfig {
    /// Directory for numbered outputs.
    pub out_dir: Utf8PathBuf,
    /// Write `.gz` copies of outputs.
    pub gzip: bool,
    /// Ask compilers for minified output.
    pub minify: bool,
    /// Script entry points.
    pub scripts: Vec<EntryConfig>,
    /// Stylesheet entry points.
    pub styles: Vec<EntryConfig>,
    pub lint: LintConfig,
    pub docs: DocsConfig,
    /// Explicit tool binaries, by tool name.
    pub tools: BTreeMap<String, String>,
    pub watch: WatchConfig,
}

impl Default for FrontkitConfig {
    fn default() -> Self {
        Self {
            out_dir: Utf8PathBuf::from("dist"),
            gzip: true,
            minify: true,
            scripts: Vec::new(),
            styles: Vec::new(),
            lint: LintConfig::default(),
            docs: DocsConfig::default(),
            tools: BTreeMap::new(),
            watch: WatchConfig::default(),
        }
    }
}

/// One entry point and its optional fixed output path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    pub entry: Utf8PathBuf,
    #[serde(default)]
    pub output: Option<Utf8PathBuf>,
}

/// Lint settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LintConfig {
    /// Roots searched for sources.
    pub paths: Vec<Utf8PathBuf>,
    /// Extensions to lint; empty means the linter's defaults.
    pub extensions: Vec<String>,
    /// Lint each script entry before bundling it.
    pub validate_scripts: bool,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            paths: vec![Utf8PathBuf::from("src")],
            extensions: Vec::new(),
            validate_scripts: false,
        }
    }
}

/// Documentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocsConfig {
    pub sources: Vec<Utf8PathBuf>,
    pub destination: Utf8PathBuf,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            sources: vec![Utf8PathBuf::from("src")],
            destination: Utf8PathBuf::from("docs"),
        }
    }
}

/// Watch mode settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Extra glob patterns to ignore, relative to the workspace.
    pub ignore: Vec<String>,
}

impl FrontkitConfig {
    /// Loads `frontkit.json` from the workspace root, or the file at
    /// `explicit` when given. A missing default file yields the defaults;
    /// a missing explicit file is an error.
    pub fn load(workspace: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if path.is_absolute() => path.to_owned(),
            Some(path) => workspace.join(path),
            None => {
                let path = workspace.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Parses config text. `//` and `/* */` comments are allowed.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&remove_json_comments(content))
    }

    /// Returns tool overrides with `~` and environment variables expanded.
    pub fn expanded_tools(&self) -> Result<Vec<(String, Utf8PathBuf)>, ConfigError> {
        self.tools
            .iter()
            .map(|(tool, path)| {
                let expanded = shellexpand::full(path).map_err(|e| ConfigError::ToolPath {
                    tool: tool.clone(),
                    message: e.to_string(),
                })?;
                Ok((tool.clone(), Utf8PathBuf::from(expanded.into_owned())))
            })
            .collect()
    }
}

/// Removes single-line and multi-line comments from JSON.
fn remove_json_comments(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if c == '"' {
                in_string = false;
            } else if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            }
        } else if c == '"' {
            result.push(c);
            in_string = true;
        } else if c == '/' && chars.peek() == Some(&'/') {
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            while let Some(next) = chars.next() {
                if next == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    break;
                }
            }
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}
