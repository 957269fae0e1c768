//! Script bundling and stylesheet compilation.
//!
//! Both follow the same sequence: optionally validate the entry with a
//! linter, run the external compiler with its output captured from stdout,
//! then write the result (and its gzipped copy).

use crate::artifact::{write_artifact, ArtifactReport};
use crate::context::BuildContext;
use crate::error::ToolError;
use crate::lint::{relative_arg, LintReport, Linter};
use camino::{Utf8Path, Utf8PathBuf};
use process_runner::{ProcessRunner, SpawnOptions};
use std::sync::Arc;
use tracing::debug;

/// What is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerKind {
    /// JavaScript/TypeScript bundled with esbuild.
    Script,
    /// SASS/SCSS compiled with the `sass` CLI.
    Style,
}

impl CompilerKind {
    /// Returns the default compiler binary.
    pub fn default_tool(&self) -> &'static str {
        match self {
            Self::Script => "esbuild",
            Self::Style => "sass",
        }
    }

    /// Returns the source extensions that feed this kind of output.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Script => &[".js", ".mjs", ".jsx", ".ts", ".tsx"],
            Self::Style => &[".scss", ".sass", ".css"],
        }
    }

    fn args(&self, entry: String, minify: bool) -> Vec<String> {
        match self {
            Self::Script => {
                let mut args = vec![entry, "--bundle".to_string()];
                if minify {
                    args.push("--minify".to_string());
                }
                args
            }
            Self::Style => {
                let style = if minify {
                    "--style=compressed"
                } else {
                    "--style=expanded"
                };
                vec!["--no-source-map".to_string(), style.to_string(), entry]
            }
        }
    }

    fn numbered_output(&self, number: usize) -> String {
        match self {
            Self::Script => format!("bundle-{number}.js"),
            Self::Style => format!("style-{number}.css"),
        }
    }
}

/// Output settings shared by compilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSettings {
    /// Directory for outputs that were not given an explicit path.
    pub out_dir: Utf8PathBuf,
    /// Ask the compiler for minified output.
    pub minify: bool,
    /// Write a `.gz` copy next to each output.
    pub gzip: bool,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            out_dir: Utf8PathBuf::from("dist"),
            minify: true,
            gzip: true,
        }
    }
}

/// Result of one compilation.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub artifact: ArtifactReport,
    /// Warnings from validation, when a validator is attached.
    pub lint: Option<LintReport>,
}

/// Runs an external compiler for one kind of asset.
#[derive(Debug)]
pub struct Compiler {
    kind: CompilerKind,
    tool: String,
    ctx: Arc<BuildContext>,
    runner: ProcessRunner,
    validator: Option<Linter>,
    settings: CompileSettings,
}

impl Compiler {
    /// Creates a compiler using the default tool for `kind`.
    pub fn new(
        ctx: Arc<BuildContext>,
        kind: CompilerKind,
        settings: CompileSettings,
    ) -> Result<Self, ToolError> {
        Self::with_tool(ctx, kind, kind.default_tool(), settings)
    }

    /// Creates a compiler that runs `tool`.
    pub fn with_tool(
        ctx: Arc<BuildContext>,
        kind: CompilerKind,
        tool: &str,
        settings: CompileSettings,
    ) -> Result<Self, ToolError> {
        let runner = ctx.runner(tool)?;
        Ok(Self {
            kind,
            tool: tool.to_string(),
            ctx,
            runner,
            validator: None,
            settings,
        })
    }

    /// Lints every entry before compiling it; lint errors abort the build.
    pub fn with_validation(mut self, linter: Linter) -> Self {
        self.validator = Some(linter);
        self
    }

    /// The kind of asset this compiler produces.
    pub fn kind(&self) -> CompilerKind {
        self.kind
    }

    /// Validates, compiles, and writes `entry`.
    ///
    /// Without an explicit `output`, the result is numbered from the build
    /// context and placed in the output directory.
    pub async fn compile(
        &self,
        entry: &Utf8Path,
        output: Option<&Utf8Path>,
    ) -> Result<CompileOutcome, ToolError> {
        let root = self.ctx.workspace_root();
        let entry_path = self.ctx.resolve_path(entry);

        let lint = match &self.validator {
            Some(linter) => {
                let report = linter.lint(std::slice::from_ref(&entry_path)).await?;
                if report.error_count() > 0 {
                    return Err(ToolError::Validation {
                        entry: entry.to_owned(),
                        report,
                    });
                }
                Some(report)
            }
            None => None,
        };

        let args = self
            .kind
            .args(relative_arg(root, &entry_path), self.settings.minify);
        let options = SpawnOptions::new().with_working_directory(root.to_owned());
        let compiled = self
            .runner
            .run_async(&args, &options)
            .await
            .map_err(|source| ToolError::Process {
                tool: self.tool.clone(),
                source,
            })?;

        let target = match output {
            Some(path) => self.ctx.resolve_path(path),
            None => self
                .ctx
                .resolve_path(&self.settings.out_dir)
                .join(self.kind.numbered_output(self.ctx.next_build_number())),
        };
        debug!(tool = %self.tool, entry = %entry, output = %target, "compiled");

        let artifact = write_artifact(&target, compiled.as_bytes(), self.settings.gzip)?;
        Ok(CompileOutcome { artifact, lint })
    }

    /// Returns whether validation or compilation is in flight.
    pub fn is_running(&self) -> bool {
        self.runner.is_running() || self.validator.as_ref().is_some_and(Linter::is_running)
    }

    /// Stops any in-flight validation or compilation.
    pub fn kill(&self) {
        self.runner.kill();
        if let Some(linter) = &self.validator {
            linter.kill();
        }
    }
}
