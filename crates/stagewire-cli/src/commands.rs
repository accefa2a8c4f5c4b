use std::collections::HashSet;
use std::time::Duration;

use stagewire_client::{
    ClientConfig, Conversation, CounselorProcess, PipelineClient, ResponseSummary, Snapshot,
};
use stagewire_server::{AppContext, DemuxConfig, Script, ScriptedEngine, ServerConfig, serve};
use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{AskArgs, ChatArgs, ClientArgs, ServeArgs};
use crate::errors::CliError;
use crate::render;

/// Replay script served when `--script` is not given.
pub const BUILTIN_SCRIPT: &str = include_str!("../scripts/counselor.jsonl");

pub async fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = args.bind {
        config = config.bind_addr(bind);
    }
    if let Some(max_steps) = args.max_steps {
        config = config.max_steps(max_steps);
    }
    let config = config.validated()?;

    let script = match &args.script {
        Some(path) => Script::load(path).await?,
        None => Script::from_jsonl(BUILTIN_SCRIPT)?,
    };
    info!(
        event = "cli.script_loaded",
        domain = "cli",
        steps = script.steps.len(),
        custom = args.script.is_some(),
        "replay script loaded"
    );

    let engine = ScriptedEngine::new(script).with_delay(Duration::from_millis(args.delay_ms));
    let ctx = AppContext::builder()
        .engine(engine)
        .demux_config(DemuxConfig::default().with_tool_results(args.include_tool_results))
        .server_config(config)
        .build()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(event = "cli.shutdown_requested", domain = "cli", "ctrl-c received");
            let _ = shutdown_tx.send(true);
        }
    });
    serve(ctx, shutdown_rx).await?;
    Ok(())
}

pub async fn run_ask(args: AskArgs) -> Result<(), CliError> {
    let client = build_client(&args.client)?;
    let abort = abort_on_ctrl_c();
    let mut conversation = Conversation::<CounselorProcess>::new();
    let message = args.message.join(" ");
    let summary = turn(&client, &mut conversation, &message, &abort, args.client.json).await?;
    match summary.pipeline_error() {
        Some(error) => Err(CliError::Remote(error.to_string())),
        None => Ok(()),
    }
}

/// Reads messages until EOF, `/quit`, or ctrl-c at the prompt. During a
/// turn ctrl-c only aborts the response.
pub async fn run_chat(args: ChatArgs) -> Result<(), CliError> {
    let client = build_client(&args.client)?;
    let abort = abort_on_ctrl_c();
    let mut conversation = Conversation::<CounselorProcess>::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();

    loop {
        stderr.write_all(b"you> ").await?;
        stderr.flush().await?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                conversation.clear();
                eprintln!("(conversation cleared)");
                continue;
            }
            message => {
                abort.send_replace(false);
                let summary =
                    turn(&client, &mut conversation, message, &abort, args.client.json).await?;
                if let Some(error) = summary.pipeline_error() {
                    eprintln!("pipeline error: {error}");
                }
            }
        }
    }
    Ok(())
}

fn build_client(args: &ClientArgs) -> Result<PipelineClient, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(server) = &args.server {
        config = config.base_url(server.clone());
    }
    Ok(PipelineClient::new(config)?)
}

/// Every ctrl-c flips the returned flag to true; callers reset it per turn.
fn abort_on_ctrl_c() -> watch::Sender<bool> {
    let (tx, _) = watch::channel(false);
    let signal_tx = tx.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            signal_tx.send_replace(true);
        }
    });
    tx
}

async fn turn(
    client: &PipelineClient,
    conversation: &mut Conversation<CounselorProcess>,
    message: &str,
    abort: &watch::Sender<bool>,
    json: bool,
) -> Result<ResponseSummary, CliError> {
    let start = conversation.records().len();
    let watcher = watch_progress(conversation.subscribe());
    let result = client.ask(conversation, message, abort.subscribe()).await;
    watcher.abort();
    let summary = result?;

    if summary.aborted {
        eprintln!("(response aborted)");
    }
    for diagnostic in &summary.diagnostics {
        warn!(
            event = "cli.stream_diagnostic",
            domain = "cli",
            kind = diagnostic.kind(),
            detail = %diagnostic,
            "stream input dropped"
        );
    }
    // The first new record is the user's own message; an abort before the
    // response started adds none.
    let skip = if conversation.records().len() > start { start + 1 } else { start };
    for record in conversation.records().iter().skip(skip) {
        if json {
            println!("{}", render::record_json(record)?);
        } else {
            println!("{}", render::render_record(record));
        }
    }
    Ok(summary)
}

/// Prints a status line whenever a record appears or a tool call settles.
fn watch_progress(mut rx: watch::Receiver<Snapshot<CounselorProcess>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen = rx.borrow_and_update().len();
        let mut settled = HashSet::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            for (index, record) in snapshot.iter().enumerate() {
                let fresh = index >= seen;
                let settling = record.in_progress() == Some(false)
                    && settled.insert(record.process_id.clone());
                if fresh || settling {
                    eprintln!("{}", render::status_line(record));
                }
            }
            seen = snapshot.len();
        }
    })
}
