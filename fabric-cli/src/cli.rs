//! Command-line surface (spec.md §6): `balance`, `status`, `report`, `recommend <file> <prompt>`.
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

/// Verbosity levels exposed on the command line, mapped onto [`slog::Level`] by the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for slog::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical => slog::Level::Critical,
            LogLevel::Error => slog::Level::Error,
            LogLevel::Warning => slog::Level::Warning,
            LogLevel::Info => slog::Level::Info,
            LogLevel::Debug => slog::Level::Debug,
            LogLevel::Trace => slog::Level::Trace,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "fabric-cli", version, about = "Operate a task-dispatch fabric")]
pub struct Cli {
    /// Minimum log level.
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one load-balancing cycle across registered workers and report the migrations made.
    Balance,

    /// Print the registry, queue depths, and DLQ depths for every known worker.
    Status,

    /// Emit a worker metrics/alert report for the trailing sampling window.
    Report,

    /// Classify a prompt (optionally with an attached file) and show which worker it would route to.
    Recommend {
        /// Path to a file to attach to the request (read for its presence only, not its contents).
        file: PathBuf,
        /// The prompt text to classify and score against registered workers.
        prompt: String,
    },
}
