//! Watch mode: rebuild targets when their sources change.

use crate::compile::{CompileOutcome, Compiler};
use crate::error::ToolError;
use crate::sources::ignore_set;
use camino::{Utf8Path, Utf8PathBuf};
use globset::GlobSet;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// An entry point rebuilt whenever a matching source changes.
#[derive(Debug)]
pub struct WatchTarget {
    /// Display name, usually the entry path.
    pub name: String,
    pub entry: Utf8PathBuf,
    pub output: Option<Utf8PathBuf>,
    pub compiler: Compiler,
}

impl WatchTarget {
    /// Creates a target named after its entry.
    pub fn new(compiler: Compiler, entry: Utf8PathBuf, output: Option<Utf8PathBuf>) -> Self {
        Self {
            name: entry.to_string(),
            entry,
            output,
            compiler,
        }
    }

    /// Returns whether a change to `path` should trigger this target.
    fn watches(&self, path: &Utf8Path) -> bool {
        let file_name = path.file_name().unwrap_or("");
        self.compiler
            .kind()
            .source_extensions()
            .iter()
            .any(|ext| file_name.ends_with(ext))
    }
}

/// The outcome of one triggered rebuild.
#[derive(Debug)]
pub struct RebuildEvent {
    /// Name of the rebuilt target.
    pub target: String,
    /// The changed file that triggered the rebuild.
    pub trigger: Utf8PathBuf,
    pub result: Result<CompileOutcome, ToolError>,
}

/// Watches a workspace and rebuilds targets on change.
///
/// A target whose compiler is still busy when another change arrives
/// reports [`ToolError::is_busy`] for that change rather than queueing it.
#[derive(Debug)]
pub struct DevServer {
    root: Utf8PathBuf,
    ignore: GlobSet,
    targets: Vec<Arc<WatchTarget>>,
}

impl DevServer {
    /// Creates a server watching `root`, skipping `ignore` patterns (matched
    /// against workspace-relative paths) on top of the defaults.
    pub fn new(root: impl Into<Utf8PathBuf>, ignore: &[String]) -> Result<Self, ToolError> {
        Ok(Self {
            root: root.into(),
            ignore: ignore_set(ignore)?,
            targets: Vec::new(),
        })
    }

    /// Registers a target.
    pub fn add_target(&mut self, target: WatchTarget) {
        self.targets.push(Arc::new(target));
    }

    /// Number of registered targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Returns the targets affected by `paths`, each at most once, paired
    /// with the first path that triggered it.
    pub fn affected_targets(&self, paths: &[PathBuf]) -> Vec<(usize, Utf8PathBuf)> {
        let mut affected: Vec<(usize, Utf8PathBuf)> = Vec::new();
        for path in paths {
            let Ok(path) = Utf8PathBuf::try_from(path.clone()) else {
                continue;
            };
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            if self.ignore.is_match(relative.as_str()) {
                trace!(path = %relative, "ignored change");
                continue;
            }
            for (index, target) in self.targets.iter().enumerate() {
                if target.watches(relative) && !affected.iter().any(|(i, _)| *i == index) {
                    affected.push((index, relative.to_owned()));
                }
            }
        }
        affected
    }

    /// Watches until `shutdown` resolves, sending one [`RebuildEvent`] per
    /// triggered rebuild to `report`. In-flight rebuilds are killed on exit.
    pub async fn run<S>(
        &self,
        report: mpsc::UnboundedSender<RebuildEvent>,
        shutdown: S,
    ) -> Result<(), ToolError>
    where
        S: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(100);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.blocking_send(event);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .map_err(|e| ToolError::Watch(e.to_string()))?;

        watcher
            .watch(self.root.as_std_path(), RecursiveMode::Recursive)
            .map_err(|e| ToolError::Watch(e.to_string()))?;
        debug!(root = %self.root, targets = self.targets.len(), "watching");

        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break Ok(()),
                event = rx.recv() => {
                    let Some(event) = event else {
                        break Err(ToolError::Watch(
                            "watch channel closed unexpectedly".to_string(),
                        ));
                    };
                    if !is_content_change(&event.kind) {
                        continue;
                    }
                    for (index, trigger) in self.affected_targets(&event.paths) {
                        self.spawn_rebuild(index, trigger, report.clone());
                    }
                }
            }
        };

        drop(watcher);
        self.shutdown();
        outcome
    }

    fn spawn_rebuild(
        &self,
        index: usize,
        trigger: Utf8PathBuf,
        report: mpsc::UnboundedSender<RebuildEvent>,
    ) {
        let target = Arc::clone(&self.targets[index]);
        tokio::spawn(async move {
            let result = target
                .compiler
                .compile(&target.entry, target.output.as_deref())
                .await;
            let _ = report.send(RebuildEvent {
                target: target.name.clone(),
                trigger,
                result,
            });
        });
    }

    /// Kills every in-flight rebuild.
    pub fn shutdown(&self) {
        for target in &self.targets {
            target.compiler.kill();
        }
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
