use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "stagewire",
    version,
    about = "Live, line-delimited view of a multi-stage pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the pipeline endpoint backed by a replay script.
    Serve(ServeArgs),
    /// Send one message and render the streamed response.
    Ask(AskArgs),
    /// Interactive conversation; `/clear` starts over, `/quit` exits.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to bind (overrides STAGEWIRE_BIND).
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// JSON-lines replay script; the built-in counselor script when omitted.
    #[arg(long)]
    pub script: Option<PathBuf>,
    /// Pause between replayed events, in milliseconds.
    #[arg(long, default_value_t = 25)]
    pub delay_ms: u64,
    /// Step ceiling per run (overrides STAGEWIRE_MAX_STEPS).
    #[arg(long)]
    pub max_steps: Option<u32>,
    /// Merge tool results into tool-call-finish payloads.
    #[arg(long)]
    pub include_tool_results: bool,
}

#[derive(Debug, Args)]
pub struct ClientArgs {
    /// Server base URL (overrides STAGEWIRE_SERVER_URL).
    #[arg(long)]
    pub server: Option<String>,
    /// Print records as JSON instead of rendering them.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Message to send.
    #[arg(required = true, num_args = 1..)]
    pub message: Vec<String>,
    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[command(flatten)]
    pub client: ClientArgs,
}
