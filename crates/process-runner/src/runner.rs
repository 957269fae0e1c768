//! The single-flight process runner.

use crate::spawn::{ProcessEvent, SpawnOptions, Spawner, SystemSpawner};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Why an invocation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// Another invocation is still running on the same runner.
    #[error("Still working...")]
    Busy,

    /// The command could not be started at all.
    #[error("{message}")]
    Spawn { message: String },

    /// The command ran and exited with a non-zero code, or was terminated
    /// by a signal (`code` is `None`).
    ///
    /// Only exit code 0 counts as success. A signal-terminated process has
    /// no exit code, and it is reported as a failure rather than passing a
    /// check that only rejects non-zero codes.
    ///
    /// `stderr` holds what the tool wrote to its error stream;
    /// `process_errors` holds failures reported by the process machinery
    /// (broken pipes, wait failures). Display concatenates the two.
    #[error("{stderr}{process_errors}")]
    Failed {
        code: Option<i32>,
        stderr: String,
        process_errors: String,
    },

    /// The invocation was killed before it completed.
    #[error("process was killed")]
    Killed,
}

/// The outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    /// Everything the command wrote to stdout, in order. Kept on failure.
    pub output: String,
    /// `None` on success.
    pub error: Option<InvocationError>,
}

impl InvocationResult {
    fn success(output: String) -> Self {
        Self {
            output,
            error: None,
        }
    }

    fn failure(output: String, error: InvocationError) -> Self {
        Self {
            output,
            error: Some(error),
        }
    }

    /// Returns whether the command succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the human-readable failure text, if any.
    pub fn error_text(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Converts into a `Result`, dropping the output on failure.
    pub fn into_result(self) -> Result<String, InvocationError> {
        match self.error {
            None => Ok(self.output),
            Some(error) => Err(error),
        }
    }
}

#[derive(Debug)]
struct ActiveProcess {
    generation: u64,
    kill: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct RunnerState {
    active: Option<ActiveProcess>,
    generation: u64,
}

/// Runs one external command at a time.
///
/// Cloning a runner is not supported; each collaborator owns its own.
pub struct ProcessRunner {
    command: String,
    spawner: Arc<dyn Spawner>,
    state: Arc<Mutex<RunnerState>>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("command", &self.command)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ProcessRunner {
    /// Creates a runner for `command`, a binary name on `PATH` or a path.
    ///
    /// Existence is not checked until the first [`run`](Self::run).
    pub fn new(command: impl Into<String>) -> Self {
        Self::with_spawner(command, Arc::new(SystemSpawner))
    }

    /// Creates a runner that starts processes through `spawner`.
    pub fn with_spawner(command: impl Into<String>, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            command: command.into(),
            spawner,
            state: Arc::new(Mutex::new(RunnerState::default())),
        }
    }

    /// The command this runner invokes.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns whether an invocation is in flight.
    pub fn is_running(&self) -> bool {
        lock(&self.state).active.is_some()
    }

    /// Starts the command and reports its outcome to `callback`.
    ///
    /// `callback` runs exactly once, unless [`kill`](Self::kill) is called
    /// first, in which case it never runs. When the runner is busy or the
    /// command cannot be started, `callback` runs before `run` returns.
    /// Otherwise it runs on a Tokio task once the process exits, after the
    /// runner has been marked idle again.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run<F>(&self, args: &[String], options: &SpawnOptions, callback: F)
    where
        F: FnOnce(InvocationResult) + Send + 'static,
    {
        let mut state = lock(&self.state);
        if state.active.is_some() {
            drop(state);
            debug!(command = %self.command, "runner busy, rejecting invocation");
            callback(InvocationResult::failure(
                String::new(),
                InvocationError::Busy,
            ));
            return;
        }

        let spawned = match self.spawner.spawn(&self.command, args, options) {
            Ok(spawned) => spawned,
            Err(e) => {
                drop(state);
                debug!(command = %self.command, error = %e, "failed to spawn");
                callback(InvocationResult::failure(
                    String::new(),
                    InvocationError::Spawn {
                        message: e.to_string(),
                    },
                ));
                return;
            }
        };

        state.generation += 1;
        let generation = state.generation;
        state.active = Some(ActiveProcess {
            generation,
            kill: spawned.kill,
        });
        drop(state);

        let mut events = spawned.events;
        let shared = Arc::clone(&self.state);
        let command = self.command.clone();

        tokio::spawn(async move {
            let mut output = String::new();
            let mut stderr = String::new();
            let mut process_errors = String::new();

            let code = loop {
                match events.recv().await {
                    Some(ProcessEvent::Stdout(chunk)) => output.push_str(&chunk),
                    Some(ProcessEvent::Stderr(chunk)) => stderr.push_str(&chunk),
                    Some(ProcessEvent::Error(message)) => process_errors.push_str(&message),
                    Some(ProcessEvent::Close(code)) => break code,
                    // The process side went away without reporting an exit.
                    None => break None,
                }
            };

            let still_ours = {
                let mut state = lock(&shared);
                match &state.active {
                    Some(active) if active.generation == generation => {
                        state.active = None;
                        true
                    }
                    _ => false,
                }
            };
            if !still_ours {
                trace!(command = %command, generation, "invocation was killed, dropping result");
                return;
            }

            let result = if code == Some(0) {
                InvocationResult::success(output)
            } else {
                debug!(command = %command, ?code, "command failed");
                InvocationResult::failure(
                    output,
                    InvocationError::Failed {
                        code,
                        stderr,
                        process_errors,
                    },
                )
            };
            callback(result);
        });
    }

    /// Runs the command and waits for it, keeping the output on failure.
    ///
    /// A killed invocation resolves to [`InvocationError::Killed`].
    pub async fn run_to_end(&self, args: &[String], options: &SpawnOptions) -> InvocationResult {
        let (tx, rx) = oneshot::channel();
        self.run(args, options, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or_else(|_| {
            InvocationResult::failure(String::new(), InvocationError::Killed)
        })
    }

    /// Runs the command and waits for its stdout.
    pub async fn run_async(
        &self,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<String, InvocationError> {
        self.run_to_end(args, options).await.into_result()
    }

    /// Terminates the in-flight invocation, if any.
    ///
    /// The runner becomes idle immediately and the pending callback is never
    /// invoked. Calling this while idle does nothing.
    pub fn kill(&self) {
        let active = lock(&self.state).active.take();
        if let Some(active) = active {
            debug!(command = %self.command, generation = active.generation, "killing process");
            let _ = active.kill.send(());
        }
    }
}

fn lock(state: &Mutex<RunnerState>) -> MutexGuard<'_, RunnerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn::SpawnedProcess;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Hands out pre-built processes in order; fails with ENOENT when empty.
    #[derive(Default)]
    struct ScriptedSpawner {
        queue: Mutex<VecDeque<SpawnedProcess>>,
        spawn_count: AtomicUsize,
    }

    struct ScriptedHandle {
        events: mpsc::UnboundedSender<ProcessEvent>,
        killed: oneshot::Receiver<()>,
    }

    impl ScriptedHandle {
        fn emit(&self, event: ProcessEvent) {
            self.events.send(event).unwrap();
        }
    }

    impl ScriptedSpawner {
        fn push_process(&self) -> ScriptedHandle {
            let (events_tx, events) = mpsc::unbounded_channel();
            let (kill, killed) = oneshot::channel();
            self.queue
                .lock()
                .unwrap()
                .push_back(SpawnedProcess { events, kill });
            ScriptedHandle {
                events: events_tx,
                killed,
            }
        }

        fn spawned(&self) -> usize {
            self.spawn_count.load(Ordering::SeqCst)
        }
    }

    impl Spawner for ScriptedSpawner {
        fn spawn(
            &self,
            _command: &str,
            _args: &[String],
            _options: &SpawnOptions,
        ) -> io::Result<SpawnedProcess> {
            let process = self.queue.lock().unwrap().pop_front();
            match process {
                Some(process) => {
                    self.spawn_count.fetch_add(1, Ordering::SeqCst);
                    Ok(process)
                }
                None => Err(io::Error::new(io::ErrorKind::NotFound, "ENOENT")),
            }
        }
    }

    fn runner_with(spawner: &Arc<ScriptedSpawner>) -> ProcessRunner {
        ProcessRunner::with_spawner("tool", spawner.clone())
    }

    fn start(runner: &ProcessRunner) -> oneshot::Receiver<InvocationResult> {
        let (tx, rx) = oneshot::channel();
        runner.run(&[], &SpawnOptions::default(), move |result| {
            let _ = tx.send(result);
        });
        rx
    }

    #[tokio::test]
    async fn test_success_concatenates_stdout() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        assert!(runner.is_running());
        process.emit(ProcessEvent::Stdout("a".into()));
        process.emit(ProcessEvent::Stdout("b".into()));
        process.emit(ProcessEvent::Stdout("c".into()));
        process.emit(ProcessEvent::Close(Some(0)));

        let result = rx.await.unwrap();
        assert_eq!(result.error_text(), None);
        assert_eq!(result.output, "abc");
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        process.emit(ProcessEvent::Stderr("oops".into()));
        process.emit(ProcessEvent::Close(Some(1)));

        let result = rx.await.unwrap();
        assert_eq!(result.error_text().as_deref(), Some("oops"));
        assert_eq!(result.output, "");
        assert_eq!(
            result.error,
            Some(InvocationError::Failed {
                code: Some(1),
                stderr: "oops".into(),
                process_errors: String::new(),
            })
        );
    }

    #[tokio::test]
    async fn test_output_kept_on_failure() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        process.emit(ProcessEvent::Stdout("src/a.js:1:1: bad [Error/no-undef]\n".into()));
        process.emit(ProcessEvent::Close(Some(1)));

        let result = rx.await.unwrap();
        assert!(!result.is_success());
        assert!(result.output.contains("no-undef"));
        assert_eq!(result.error_text().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_error_event_included_in_failure_text() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        process.emit(ProcessEvent::Error("ENOENT".into()));
        process.emit(ProcessEvent::Close(Some(1)));

        let result = rx.await.unwrap();
        assert!(result.error_text().unwrap().contains("ENOENT"));
        match result.error {
            Some(InvocationError::Failed {
                stderr,
                process_errors,
                ..
            }) => {
                assert_eq!(stderr, "");
                assert_eq!(process_errors, "ENOENT");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_busy_runner_rejects_synchronously() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let _first = start(&runner);
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replies);
        runner.run(&[], &SpawnOptions::default(), move |result| {
            sink.lock().unwrap().push(result);
        });

        // The busy reply arrives before `run` returns.
        let replies = replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].error, Some(InvocationError::Busy));
        assert_eq!(replies[0].error_text().as_deref(), Some("Still working..."));
        assert_eq!(replies[0].output, "");
        assert_eq!(spawner.spawned(), 1);
        drop(process);
    }

    #[tokio::test]
    async fn test_runner_reusable_after_completion() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let first = spawner.push_process();
        let second = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        first.emit(ProcessEvent::Stderr("nope".into()));
        first.emit(ProcessEvent::Close(Some(2)));
        assert!(!rx.await.unwrap().is_success());

        let rx = start(&runner);
        assert_eq!(spawner.spawned(), 2);
        second.emit(ProcessEvent::Stdout("ok".into()));
        second.emit(ProcessEvent::Close(Some(0)));
        let result = rx.await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.output, "ok");
    }

    #[tokio::test]
    async fn test_chunk_order_preserved() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        for chunk in ["1", "2", "3"] {
            process.emit(ProcessEvent::Stdout(chunk.into()));
        }
        process.emit(ProcessEvent::Close(Some(0)));

        assert_eq!(rx.await.unwrap().output, "123");
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let mut process = spawner.push_process();
        let runner = runner_with(&spawner);

        let _rx = start(&runner);
        runner.kill();
        runner.kill();

        assert!(!runner.is_running());
        assert_eq!(process.killed.try_recv(), Ok(()));
    }

    #[tokio::test]
    async fn test_kill_while_idle_is_noop() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let runner = runner_with(&spawner);
        runner.kill();
        assert!(!runner.is_running());
        assert_eq!(spawner.spawned(), 0);
    }

    #[tokio::test]
    async fn test_kill_suppresses_callback() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        runner.kill();
        process.emit(ProcessEvent::Stdout("late".into()));
        process.emit(ProcessEvent::Close(Some(0)));

        // The task finishes without calling back, dropping the sender.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_kill_then_new_run_not_disturbed_by_old_close() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let old = spawner.push_process();
        let new = spawner.push_process();
        let runner = runner_with(&spawner);

        let old_rx = start(&runner);
        runner.kill();
        let new_rx = start(&runner);
        assert!(runner.is_running());

        old.emit(ProcessEvent::Close(None));
        assert!(old_rx.await.is_err());
        assert!(runner.is_running());

        new.emit(ProcessEvent::Close(Some(0)));
        assert!(new_rx.await.unwrap().is_success());
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_spawn_failure_reported_immediately() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let runner = runner_with(&spawner);

        let result = runner.run_to_end(&[], &SpawnOptions::default()).await;
        match result.error {
            Some(InvocationError::Spawn { message }) => assert!(message.contains("ENOENT")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_signal_termination_is_failure() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        process.emit(ProcessEvent::Close(None));
        let result = rx.await.unwrap();
        assert!(matches!(
            result.error,
            Some(InvocationError::Failed { code: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_event_stream_counts_as_close() {
        let spawner = Arc::new(ScriptedSpawner::default());
        let process = spawner.push_process();
        let runner = runner_with(&spawner);

        let rx = start(&runner);
        process.emit(ProcessEvent::Stdout("partial".into()));
        drop(process);

        let result = rx.await.unwrap();
        assert_eq!(result.output, "partial");
        assert!(!result.is_success());
    }

    #[test]
    fn test_into_result() {
        let ok = InvocationResult::success("out".into());
        assert_eq!(ok.into_result(), Ok("out".to_string()));

        let err = InvocationResult::failure(String::new(), InvocationError::Busy);
        assert_eq!(err.into_result(), Err(InvocationError::Busy));
    }
}
