//! API documentation through JSDoc.

use crate::context::BuildContext;
use crate::error::ToolError;
use crate::lint::relative_arg;
use camino::{Utf8Path, Utf8PathBuf};
use process_runner::{ProcessRunner, SpawnOptions, StreamMode};

/// Generates HTML documentation from source comments.
#[derive(Debug)]
pub struct Documentation {
    runner: ProcessRunner,
    workspace_root: Utf8PathBuf,
}

impl Documentation {
    /// The default generator binary.
    pub const DEFAULT_TOOL: &'static str = "jsdoc";

    /// Creates a generator using `jsdoc`.
    pub fn new(ctx: &BuildContext) -> Result<Self, ToolError> {
        Self::with_tool(ctx, Self::DEFAULT_TOOL)
    }

    /// Creates a generator that runs `tool`.
    pub fn with_tool(ctx: &BuildContext, tool: &str) -> Result<Self, ToolError> {
        Ok(Self {
            runner: ctx.runner(tool)?,
            workspace_root: ctx.workspace_root().to_owned(),
        })
    }

    /// Generates documentation for `sources` into `destination`.
    ///
    /// The generator writes straight to the console.
    pub async fn generate(
        &self,
        sources: &[Utf8PathBuf],
        destination: &Utf8Path,
    ) -> Result<(), ToolError> {
        let args = self.args(sources, destination);
        let options = SpawnOptions::new()
            .with_working_directory(self.workspace_root.clone())
            .with_stream_mode(StreamMode::Inherit);
        self.runner
            .run_async(&args, &options)
            .await
            .map(|_| ())
            .map_err(|source| ToolError::Process {
                tool: self.runner.command().to_string(),
                source,
            })
    }

    fn args(&self, sources: &[Utf8PathBuf], destination: &Utf8Path) -> Vec<String> {
        let mut args = vec!["-r".to_string()];
        args.extend(sources.iter().map(|s| relative_arg(&self.workspace_root, s)));
        args.push("-d".to_string());
        args.push(relative_arg(&self.workspace_root, destination));
        args
    }

    /// Stops an in-flight generation.
    pub fn kill(&self) {
        self.runner.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args() {
        let ctx = BuildContext::new("/project");
        ctx.register_tool("jsdoc", "/usr/bin/jsdoc");
        let docs = Documentation::new(&ctx).unwrap();

        let args = docs.args(
            &[Utf8PathBuf::from("/project/src"), Utf8PathBuf::from("lib")],
            Utf8Path::new("/project/docs"),
        );
        assert_eq!(args, vec!["-r", "src", "lib", "-d", "docs"]);
    }
}
