//! Entry point: parse arguments, configure logging, dispatch to the selected command, and map
//! any error to the exit codes documented for the control surface (spec.md §6).
mod cli;
mod commands;
mod error;
mod fabric;
mod logging;

use clap::Parser;
use fabric_context::Context;

use crate::cli::Cli;
use crate::cli::Command;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    let logger = logging::configure(args.log_level.into());
    let ctx = Context::root(logger.clone()).build();

    let result = match args.command {
        Command::Balance => commands::balance::run(&ctx).await,
        Command::Status => commands::status::run(&ctx).await,
        Command::Report => commands::report::run(&ctx).await,
        Command::Recommend { file, prompt } => commands::recommend::run(&ctx, &file, &prompt).await,
    };

    if let Err(error) = result {
        slog::error!(logger, "Command failed"; "error" => %error);
        eprintln!("fabric-cli: {error}");
        std::process::exit(error.exit_code());
    }
}
