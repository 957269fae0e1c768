//! End-to-end tests for the `frontkit` binary against a scratch workspace
//! with shell scripts standing in for the real tools.
//!
//! Note: These tests are skipped on Windows.

#![cfg(unix)]

use serde::Deserialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

// ============================================================================
// TEST INFRASTRUCTURE
// ============================================================================

const FAKE_ESBUILD: &str = "#!/bin/sh\nprintf 'console.log(\"%s\")' \"$1\"\n";

const SLOW_ESBUILD: &str = "#!/bin/sh\nsleep 0.5\nprintf 'console.log(\"%s\")' \"$1\"\n";

const FAKE_ESLINT: &str = r#"#!/bin/sh
status=0
for f; do
  case "$f" in
    *bad*) echo "$f:4:2: Missing semicolon. [Error/semi]"; status=1 ;;
  esac
done
exit $status
"#;

#[derive(Debug, Deserialize)]
struct JsonDiagnostic {
    file: String,
    line: u32,
    column: u32,
    severity: String,
    rule: Option<String>,
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/.bin")).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn tool(&self, name: &str, script: &str) {
        let path = self.path().join("node_modules/.bin").join(name);
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_frontkit"))
            .arg("--workspace")
            .arg(self.path())
            .args(args)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn spawn(&self, args: &[&str]) -> Child {
        Command::new(env!("CARGO_BIN_EXE_frontkit"))
            .arg("--workspace")
            .arg(self.path())
            .args(args)
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    /// Sorted file names in a workspace directory.
    fn list(&self, relative: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.path().join(relative))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if done() {
            return true;
        }
        sleep(Duration::from_millis(50));
    }
    done()
}

fn interrupt(child: &mut Child) -> std::process::ExitStatus {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(status.success());

    let mut exited = None;
    wait_until(Duration::from_secs(10), || {
        exited = child.try_wait().unwrap();
        exited.is_some()
    });
    match exited {
        Some(status) => status,
        None => {
            let _ = child.kill();
            panic!("frontkit watch did not stop on SIGINT");
        }
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// BUILDS
// ============================================================================

#[test]
fn js_builds_configured_scripts() {
    let ws = Workspace::new();
    ws.tool("esbuild", FAKE_ESBUILD);
    ws.file("src/main.js", "console.log(1)");
    ws.file(
        "frontkit.json",
        r#"{
            // one fixed output, one numbered
            "scripts": [
                { "entry": "src/main.js", "output": "public/app.js" },
                { "entry": "src/main.js" }
            ]
        }"#,
    );

    let output = ws.run(&["--output", "machine", "js"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let fixed = ws.path().join("public/app.js");
    let numbered = ws.path().join("dist/bundle-1.js");
    assert_eq!(
        fs::read_to_string(&fixed).unwrap(),
        "console.log(\"src/main.js\")"
    );
    assert!(numbered.is_file());
    assert!(ws.path().join("dist/bundle-1.js.gz").is_file());

    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("BUILT src/main.js "));
    assert!(lines[0].ends_with(" 26"));
}

#[test]
fn js_without_entries_fails() {
    let ws = Workspace::new();
    ws.tool("esbuild", FAKE_ESBUILD);

    let output = ws.run(&["js"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("nothing to build"));
}

#[test]
fn invalid_config_is_reported() {
    let ws = Workspace::new();
    ws.file("frontkit.json", "{ \"scripts\": [ }");

    let output = ws.run(&["js"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("frontkit.json"));
}

// ============================================================================
// WATCH
// ============================================================================

#[test]
fn watch_rebuilds_once_per_change() {
    let ws = Workspace::new();
    ws.tool("esbuild", SLOW_ESBUILD);
    let entry = ws.file("src/main.js", "console.log(1)");
    ws.file(
        "frontkit.json",
        r#"{ "outDir": "./dist", "gzip": false, "scripts": [{ "entry": "src/main.js" }] }"#,
    );

    let mut child = ws.spawn(&["--output", "machine", "watch"]);
    let bundle = ws.path().join("dist/bundle-1.js");
    assert!(wait_until(Duration::from_secs(10), || bundle.is_file()));
    // Let the watcher and the Ctrl+C handler come up after the initial build.
    sleep(Duration::from_millis(1000));

    fs::write(&entry, "console.log(2)").unwrap();
    let rebuilt = ws.path().join("dist/bundle-2.js");
    assert!(wait_until(Duration::from_secs(10), || rebuilt.is_file()));
    // A rebuild triggered by its own output would keep numbering upwards.
    sleep(Duration::from_millis(2000));
    assert_eq!(ws.list("dist"), vec!["bundle-1.js", "bundle-2.js"]);

    let status = interrupt(&mut child);
    let mut out = String::new();
    child.stdout.take().unwrap().read_to_string(&mut out).unwrap();
    assert!(status.success(), "stdout: {out}");

    let built = out.lines().filter(|l| l.starts_with("BUILT src/main.js ")).count();
    assert_eq!(built, 2, "stdout: {out}");
}

// ============================================================================
// LINT
// ============================================================================

#[test]
fn lint_json_reports_errors_and_fails() {
    let ws = Workspace::new();
    ws.tool("eslint", FAKE_ESLINT);
    ws.file("src/bad.js", "let a = 1");
    ws.file("src/good.js", "let b = 2;");
    ws.file("src/notes.txt", "not linted");

    let output = ws.run(&["--output", "json", "lint"]);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));

    let diagnostics: Vec<JsonDiagnostic> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].file, "src/bad.js");
    assert_eq!((diagnostics[0].line, diagnostics[0].column), (4, 2));
    assert_eq!(diagnostics[0].severity, "error");
    assert_eq!(diagnostics[0].rule.as_deref(), Some("semi"));
}

#[test]
fn lint_clean_workspace_succeeds() {
    let ws = Workspace::new();
    ws.tool("eslint", FAKE_ESLINT);
    ws.file("src/good.js", "let b = 2;");

    let output = ws.run(&["lint"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("0 errors and 0 warnings"));
}

// ============================================================================
// EXEC
// ============================================================================

#[test]
fn exec_prints_captured_output() {
    let ws = Workspace::new();
    let output = ws.run(&["exec", "sh", "-c", "printf hello"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "hello");
}

#[test]
fn exec_failure_sets_exit_code() {
    let ws = Workspace::new();
    let output = ws.run(&[
        "--output",
        "machine",
        "exec",
        "sh",
        "-c",
        "printf partial; echo boom >&2; exit 4",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "partialFAILED sh sh: boom\n");
}

#[test]
fn exec_runs_in_workspace() {
    let ws = Workspace::new();
    ws.file("marker.txt", "");
    let output = ws.run(&["exec", "ls"]);
    assert!(stdout(&output).contains("marker.txt"));
}
