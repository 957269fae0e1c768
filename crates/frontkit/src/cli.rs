//! CLI argument parsing.

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// Front-end build pipeline: bundle scripts, compile stylesheets, lint,
/// generate docs, and rebuild on change.
#[derive(Debug, Parser)]
#[command(name = "frontkit")]
#[command(version, about, long_about = None, propagate_version = true)]
pub struct Args {
    /// Workspace root
    #[arg(long, default_value = ".", global = true)]
    pub workspace: Utf8PathBuf,

    /// Path to the config file (default: <workspace>/frontkit.json)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bundle scripts with esbuild
    Js {
        /// Entry to bundle (default: every configured script)
        entry: Option<Utf8PathBuf>,
    },

    /// Compile stylesheets with sass
    Sass {
        /// Entry to compile (default: every configured stylesheet)
        entry: Option<Utf8PathBuf>,
    },

    /// Lint sources with ESLint, or stylelint with --styles
    Lint {
        /// Files or directories to lint (default: configured paths)
        paths: Vec<Utf8PathBuf>,

        /// Lint stylesheets instead of scripts
        #[arg(long)]
        styles: bool,
    },

    /// Generate API documentation with JSDoc
    Docs,

    /// Rebuild configured scripts and stylesheets on change
    Watch,

    /// Run a command and print its captured output
    Exec {
        /// Program to run
        command: String,

        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable, colored output (default)
    #[default]
    Human,
    /// JSON output
    Json,
    /// Machine-readable (one line per diagnostic)
    Machine,
}

impl Args {
    /// Returns the log filter directive for the verbosity count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
