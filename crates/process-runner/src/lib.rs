//! Single-flight runner for external commands.
//!
//! A [`ProcessRunner`] wraps one named executable. Each call to
//! [`ProcessRunner::run`] spawns it, buffers what it writes to stdout and
//! stderr, and reports the outcome to a completion callback exactly once.
//! While an invocation is in flight, further calls are rejected with
//! [`InvocationError::Busy`] instead of being queued.
//!
//! # Example
//!
//! ```ignore
//! use process_runner::{ProcessRunner, SpawnOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = ProcessRunner::new("sass");
//!     let args = vec!["--version".to_string()];
//!     match runner.run_async(&args, &SpawnOptions::default()).await {
//!         Ok(stdout) => println!("sass {}", stdout.trim()),
//!         Err(e) => eprintln!("sass failed: {e}"),
//!     }
//! }
//! ```

mod runner;
mod spawn;

pub use runner::{InvocationError, InvocationResult, ProcessRunner};
pub use spawn::{ProcessEvent, SpawnOptions, SpawnedProcess, Spawner, StreamMode, SystemSpawner};
