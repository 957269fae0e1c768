//! Process spawning and the event stream a spawned process produces.

use camino::Utf8PathBuf;
use std::collections::BTreeMap;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How the child's stdout and stderr are routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamMode {
    /// Pipe both streams back to the runner so they can be collected.
    #[default]
    Capture,
    /// Let the child write straight to the parent's console. Nothing is
    /// collected in this mode.
    Inherit,
}

/// Options for a single spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Directory the command runs in. Defaults to the current directory.
    pub working_directory: Option<Utf8PathBuf>,
    /// Stream routing.
    pub stream_mode: StreamMode,
    /// Extra environment variables, layered on top of the parent's.
    pub environment: BTreeMap<String, String>,
}

impl SpawnOptions {
    /// Creates options that capture output in the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the command inside `dir`.
    pub fn with_working_directory(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Sets the stream routing.
    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// One event from a running process.
///
/// Stream events for a process always arrive before its `Close` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk written to stdout.
    Stdout(String),
    /// A chunk written to stderr.
    Stderr(String),
    /// A low-level failure reported by the process machinery itself.
    Error(String),
    /// The process exited. `None` when it was terminated by a signal.
    Close(Option<i32>),
}

/// A process that has been started, as seen by the runner.
#[derive(Debug)]
pub struct SpawnedProcess {
    /// Events in emission order, ending with [`ProcessEvent::Close`].
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
    /// Sending on (or dropping) this terminates the process.
    pub kill: oneshot::Sender<()>,
}

/// Starts external commands.
pub trait Spawner: Send + Sync {
    /// Starts `command` with `args`.
    ///
    /// An error here means the command never started; no events follow.
    fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> io::Result<SpawnedProcess>;
}

/// Spawns real OS processes through `tokio::process`.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl Spawner for SystemSpawner {
    fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> io::Result<SpawnedProcess> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(&options.environment)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &options.working_directory {
            cmd.current_dir(dir);
        }
        match options.stream_mode {
            StreamMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            StreamMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        let mut child = cmd.spawn()?;
        debug!(command, pid = child.id(), "spawned process");

        let (tx, events) = mpsc::unbounded_channel();
        let (kill, kill_rx) = oneshot::channel::<()>();

        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(forward_stream(stdout, tx.clone(), ProcessEvent::Stdout)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stream(stderr, tx.clone(), ProcessEvent::Stderr)));

        let command = command.to_string();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    trace!(command = %command, "terminating process");
                    if let Err(e) = child.start_kill() {
                        let _ = tx.send(ProcessEvent::Error(e.to_string()));
                    }
                    child.wait().await
                }
            };

            // Drain both pipes before reporting the exit.
            for task in [stdout_task, stderr_task].into_iter().flatten() {
                let _ = task.await;
            }

            match status {
                Ok(status) => {
                    debug!(command = %command, code = ?status.code(), "process exited");
                    let _ = tx.send(ProcessEvent::Close(status.code()));
                }
                Err(e) => {
                    let _ = tx.send(ProcessEvent::Error(e.to_string()));
                    let _ = tx.send(ProcessEvent::Close(None));
                }
            }
        });

        Ok(SpawnedProcess { events, kill })
    }
}

/// Reads a pipe to its end, forwarding decoded chunks as events.
async fn forward_stream<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut decoder = Utf8Chunks::default();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = decoder.push(&buf[..n]);
                if !chunk.is_empty() && tx.send(wrap(chunk)).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(ProcessEvent::Error(e.to_string()));
                break;
            }
        }
    }
    if let Some(rest) = decoder.finish() {
        let _ = tx.send(wrap(rest));
    }
}

/// Decodes a byte stream as UTF-8 without splitting multi-byte characters
/// across chunk boundaries.
#[derive(Debug, Default)]
struct Utf8Chunks {
    pending: Vec<u8>,
}

impl Utf8Chunks {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete sequence at the end: hold it back for the next read.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(complete);
        let chunk = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        chunk
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_spawn_options_builder() {
        let options = SpawnOptions::new()
            .with_working_directory("/tmp/project")
            .with_stream_mode(StreamMode::Inherit)
            .with_env("NODE_ENV", "production");

        assert_eq!(
            options.working_directory.as_deref().map(|p| p.as_str()),
            Some("/tmp/project")
        );
        assert_eq!(options.stream_mode, StreamMode::Inherit);
        assert_eq!(
            options.environment.get("NODE_ENV").map(String::as_str),
            Some("production")
        );
    }

    #[test]
    fn test_default_mode_captures() {
        assert_eq!(SpawnOptions::default().stream_mode, StreamMode::Capture);
    }

    #[test]
    fn test_utf8_chunks_holds_split_character() {
        let mut decoder = Utf8Chunks::default();
        let bytes = "héllo".as_bytes();
        // "é" is two bytes; split it across reads.
        assert_eq!(decoder.push(&bytes[..2]), "h");
        assert_eq!(decoder.push(&bytes[2..]), "éllo");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_utf8_chunks_flushes_trailing_garbage() {
        let mut decoder = Utf8Chunks::default();
        assert_eq!(decoder.push(&[b'a', 0xC3]), "a");
        assert_eq!(decoder.finish().as_deref(), Some("\u{FFFD}"));
    }
}
