mod cli;
mod commands;
mod errors;
mod render;

use std::process::ExitCode;

use clap::Parser as _;
use stagewire_core::{Role, init_observability};
use tracing::error;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let role = match cli.command {
        Commands::Serve(_) => Role::Server,
        Commands::Ask(_) | Commands::Chat(_) => Role::Client,
    };
    init_observability(role);

    let result = match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await,
        Commands::Ask(args) => commands::run_ask(args).await,
        Commands::Chat(args) => commands::run_chat(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(event = "cli.command_failed", domain = "cli", error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
