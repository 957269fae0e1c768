//! Front-end build steps driven through external tools.
//!
//! Every step owns a [`process_runner::ProcessRunner`] for its tool and
//! shares a [`BuildContext`] that resolves tool binaries and numbers
//! outputs. The tools themselves (esbuild, sass, ESLint, stylelint, JSDoc)
//! are located in `node_modules/.bin` or on `PATH`.

mod artifact;
mod compile;
mod context;
mod dev_server;
mod diagnostics;
mod docs;
mod error;
mod lint;
mod sources;

pub use artifact::{gzip_bytes, write_artifact, ArtifactReport};
pub use compile::{CompileOutcome, CompileSettings, Compiler, CompilerKind};
pub use context::BuildContext;
pub use dev_server::{DevServer, RebuildEvent, WatchTarget};
pub use diagnostics::{parse_unix_output, LintDiagnostic, LintSeverity};
pub use docs::Documentation;
pub use error::ToolError;
pub use lint::{LintReport, LintTool, Linter};
pub use sources::{find_sources, ignore_set, DEFAULT_IGNORES};
