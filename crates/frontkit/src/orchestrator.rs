//! Main orchestration logic.

use crate::cli::{Args, Command, OutputFormat};
use crate::config::{ConfigError, EntryConfig, FrontkitConfig};
use crate::output::{Formatter, RunSummary};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use frontkit_tools::{
    find_sources, ignore_set, BuildContext, CompileOutcome, CompileSettings, Compiler,
    CompilerKind, DevServer, Documentation, LintReport, LintTool, Linter, RebuildEvent,
    ToolError, WatchTarget,
};
use process_runner::{ProcessRunner, SpawnOptions};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The workspace path could not be resolved.
    #[error("invalid workspace {path}: {message}")]
    Workspace { path: Utf8PathBuf, message: String },

    /// Loading `frontkit.json` failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A build step could not be set up.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Nothing to build.
    #[error("nothing to build: pass an entry or add `{0}` to frontkit.json")]
    NoEntries(&'static str),
}

/// Runs the requested subcommand.
pub async fn run(args: Args) -> Result<RunSummary, OrchestratorError> {
    let workspace = resolve_workspace(&args.workspace)?;
    let config = FrontkitConfig::load(&workspace, args.config.as_deref())?;
    debug!(?config, "loaded config");

    let ctx = Arc::new(BuildContext::new(workspace));
    for (tool, path) in config.expanded_tools()? {
        ctx.register_tool(tool, path);
    }

    let formatter = Formatter::new(args.output);
    let mut summary = RunSummary::default();
    let show_summary = !matches!(args.command, Command::Exec { .. });

    match args.command {
        Command::Js { entry } => {
            let entries = select_entries(&config.scripts, entry);
            if entries.is_empty() {
                return Err(OrchestratorError::NoEntries("scripts"));
            }
            let compiler = compiler_for(&ctx, &config, CompilerKind::Script)?;
            build_all(&compiler, &entries, formatter, &mut summary).await;
        }
        Command::Sass { entry } => {
            let entries = select_entries(&config.styles, entry);
            if entries.is_empty() {
                return Err(OrchestratorError::NoEntries("styles"));
            }
            let compiler = compiler_for(&ctx, &config, CompilerKind::Style)?;
            build_all(&compiler, &entries, formatter, &mut summary).await;
        }
        Command::Lint { paths, styles } => {
            lint(&ctx, &config, paths, styles, formatter, &mut summary).await?;
        }
        Command::Docs => {
            let docs = Documentation::new(&ctx)?;
            match docs
                .generate(&config.docs.sources, &config.docs.destination)
                .await
            {
                Ok(()) => {
                    let detail = format!("written to {}", config.docs.destination);
                    println!("{}", formatter.done("docs", &detail));
                }
                Err(err) => {
                    println!("{}", formatter.failed("docs", &err));
                    summary.failed += 1;
                }
            }
        }
        Command::Watch => watch(&ctx, &config, formatter, &mut summary).await?,
        Command::Exec { command, args } => {
            exec(&ctx, &command, &args, formatter, &mut summary).await;
        }
    }

    if show_summary && args.output == OutputFormat::Human {
        println!("{}", summary.format());
    }
    Ok(summary)
}

fn resolve_workspace(path: &Utf8Path) -> Result<Utf8PathBuf, OrchestratorError> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let invalid = |message: String| OrchestratorError::Workspace {
        path: path.to_owned(),
        message,
    };
    let cwd = std::env::current_dir().map_err(|e| invalid(e.to_string()))?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| invalid(e.to_string()))?;
    Ok(cwd.join(path))
}

/// Picks the entries to build. An explicit entry keeps the output path it
/// has in the config, if it is listed there.
fn select_entries(configured: &[EntryConfig], entry: Option<Utf8PathBuf>) -> Vec<EntryConfig> {
    match entry {
        Some(entry) => {
            let output = configured
                .iter()
                .find(|c| c.entry == entry)
                .and_then(|c| c.output.clone());
            vec![EntryConfig { entry, output }]
        }
        None => configured.to_vec(),
    }
}

fn compiler_for(
    ctx: &Arc<BuildContext>,
    config: &FrontkitConfig,
    kind: CompilerKind,
) -> Result<Compiler, ToolError> {
    let settings = CompileSettings {
        out_dir: config.out_dir.clone(),
        minify: config.minify,
        gzip: config.gzip,
    };
    let compiler = Compiler::new(Arc::clone(ctx), kind, settings)?;
    if kind == CompilerKind::Script && config.lint.validate_scripts {
        return Ok(compiler.with_validation(Linter::new(ctx, LintTool::Eslint)?));
    }
    Ok(compiler)
}

/// Builds entries one after another; a compiler runs one process at a time.
async fn build_all(
    compiler: &Compiler,
    entries: &[EntryConfig],
    formatter: Formatter,
    summary: &mut RunSummary,
) {
    for target in entries {
        let result = compiler
            .compile(&target.entry, target.output.as_deref())
            .await;
        record_build(formatter, summary, target.entry.as_str(), result);
    }
}

fn record_build(
    formatter: Formatter,
    summary: &mut RunSummary,
    target: &str,
    result: Result<CompileOutcome, ToolError>,
) {
    match result {
        Ok(outcome) => {
            if let Some(report) = &outcome.lint {
                print_lint(formatter, report, false);
                summary.record_lint(report);
            }
            println!("{}", formatter.built(target, &outcome.artifact));
            summary.built += 1;
        }
        Err(err) => {
            if let ToolError::Validation { report, .. } = &err {
                print_lint(formatter, report, false);
                summary.record_lint(report);
            }
            println!("{}", formatter.failed(target, &err));
            summary.failed += 1;
        }
    }
}

fn print_lint(formatter: Formatter, report: &LintReport, always: bool) {
    if always || !report.is_clean() {
        let text = formatter.lint_report(report);
        if text.ends_with('\n') {
            print!("{text}");
        } else {
            println!("{text}");
        }
    }
}

/// Ignore patterns shared by source discovery and watch mode: configured
/// patterns plus everything the build writes (the output directory and
/// explicit entry outputs), all relative to `workspace`.
fn ignore_patterns(workspace: &Utf8Path, config: &FrontkitConfig) -> Vec<String> {
    let mut patterns = config.watch.ignore.clone();
    if let Some(out_dir) = workspace_relative(workspace, &config.out_dir) {
        patterns.push(format!("{out_dir}/**"));
    }
    let outputs = config.scripts.iter().chain(&config.styles);
    for output in outputs.filter_map(|entry| entry.output.as_deref()) {
        if let Some(output) = workspace_relative(workspace, output) {
            patterns.push(output);
        }
    }
    patterns
}

/// Normalises `path` to the `/`-separated form that watch events are matched
/// in. Returns `None` for the workspace itself or anything outside it.
fn workspace_relative(workspace: &Utf8Path, path: &Utf8Path) -> Option<String> {
    let resolved = if path.is_absolute() {
        path.to_owned()
    } else {
        workspace.join(path)
    };
    let relative = resolved.strip_prefix(workspace).ok()?;

    let mut parts: Vec<&str> = Vec::new();
    for component in relative.components() {
        match component {
            Utf8Component::Normal(part) => parts.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                parts.pop()?;
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

async fn lint(
    ctx: &BuildContext,
    config: &FrontkitConfig,
    paths: Vec<Utf8PathBuf>,
    styles: bool,
    formatter: Formatter,
    summary: &mut RunSummary,
) -> Result<(), OrchestratorError> {
    let tool = if styles {
        LintTool::Stylelint
    } else {
        LintTool::Eslint
    };
    let roots = if paths.is_empty() {
        config.lint.paths.clone()
    } else {
        paths
    };
    let configured = &config.lint.extensions;
    let extensions: Vec<String> = if tool == LintTool::Eslint && !configured.is_empty() {
        configured.clone()
    } else {
        tool.default_extensions()
            .iter()
            .map(|s| s.to_string())
            .collect()
    };

    let ignore = ignore_set(&ignore_patterns(ctx.workspace_root(), config))?;
    let files = find_sources(ctx.workspace_root(), &roots, &extensions, &ignore);
    info!(tool = tool.command_name(), files = files.len(), "linting");

    let linter = Linter::new(ctx, tool)?;
    match linter.lint(&files).await {
        Ok(report) => {
            // JSON consumers always get an array, even an empty one.
            let always = formatter.format() == OutputFormat::Json;
            print_lint(formatter, &report, always);
            summary.record_lint(&report);
        }
        Err(err) => {
            println!("{}", formatter.failed(tool.command_name(), &err));
            summary.failed += 1;
        }
    }
    Ok(())
}

async fn watch(
    ctx: &Arc<BuildContext>,
    config: &FrontkitConfig,
    formatter: Formatter,
    summary: &mut RunSummary,
) -> Result<(), OrchestratorError> {
    let root = ctx.workspace_root();
    let mut server = DevServer::new(root.to_owned(), &ignore_patterns(root, config))?;

    // Initial build; each target keeps its own compiler so a slow target
    // does not hold up the others.
    for (kind, entries) in [
        (CompilerKind::Script, &config.scripts),
        (CompilerKind::Style, &config.styles),
    ] {
        for entry in entries {
            let compiler = compiler_for(ctx, config, kind)?;
            let result = compiler
                .compile(&entry.entry, entry.output.as_deref())
                .await;
            record_build(formatter, summary, entry.entry.as_str(), result);
            server.add_target(WatchTarget::new(
                compiler,
                entry.entry.clone(),
                entry.output.clone(),
            ));
        }
    }
    if server.target_count() == 0 {
        return Err(OrchestratorError::NoEntries("scripts` or `styles"));
    }

    eprintln!("Watching for changes... (Ctrl+C to stop)");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let serve = server.run(tx, async {
        let _ = tokio::signal::ctrl_c().await;
    });
    tokio::pin!(serve);

    let outcome = loop {
        tokio::select! {
            result = &mut serve => break result,
            Some(event) = rx.recv() => report_rebuild(formatter, summary, event),
        }
    };
    while let Ok(event) = rx.try_recv() {
        report_rebuild(formatter, summary, event);
    }

    outcome.map_err(OrchestratorError::from)
}

fn report_rebuild(formatter: Formatter, summary: &mut RunSummary, event: RebuildEvent) {
    debug!(target = %event.target, trigger = %event.trigger, "rebuild finished");
    match event.result {
        // A change that arrived mid-build is dropped, not a failure.
        Err(err) if err.is_busy() => println!("{}", formatter.failed(&event.target, &err)),
        result => record_build(formatter, summary, &event.target, result),
    }
}

async fn exec(
    ctx: &BuildContext,
    command: &str,
    args: &[String],
    formatter: Formatter,
    summary: &mut RunSummary,
) {
    let runner = ctx
        .runner(command)
        .unwrap_or_else(|_| ProcessRunner::new(command));
    let options = SpawnOptions::new().with_working_directory(ctx.workspace_root().to_owned());
    let result = runner.run_to_end(args, &options).await;

    print!("{}", result.output);
    if let Some(source) = result.error {
        let err = ToolError::Process {
            tool: command.to_string(),
            source,
        };
        println!("{}", formatter.failed(command, &err));
        summary.failed += 1;
    }
}
