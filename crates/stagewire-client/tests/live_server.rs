mod common;

use common::TestKind;
use pretty_assertions::assert_eq;
use serde_json::json;
use stagewire_client::{ClientConfig, Conversation, PipelineClient};
use stagewire_server::{
    AppContext, DemuxConfig, PipelineEvent, PipelineOutcome, Script, ScriptStep, ScriptedEngine,
    serve_on,
};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

type Server = (String, watch::Sender<bool>, tokio::task::JoinHandle<()>);

async fn start_server(script: Script) -> Server {
    start_server_with(ScriptedEngine::new(script)).await
}

async fn start_server_with(engine: ScriptedEngine) -> Server {
    let ctx = AppContext::builder()
        .engine(engine)
        .demux_config(DemuxConfig::default().with_tool_results(true))
        .build()
        .expect("context");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        serve_on(listener, ctx, shutdown_rx).await.expect("serve");
    });
    (base_url, shutdown, handle)
}

fn script() -> Script {
    Script::new(vec![
        ScriptStep::Event(PipelineEvent::text_delta("S1", "p1", "{\"a\":")),
        ScriptStep::Event(PipelineEvent::text_delta("S1", "p1", "1}")),
        ScriptStep::Event(PipelineEvent::tool_call("t1", "webSearch", json!({ "query": "x" }))),
        ScriptStep::Event(PipelineEvent::tool_result(
            "t1",
            "webSearch",
            json!({ "query": "x" }),
            Some(json!("ok")),
        )),
        ScriptStep::Outcome(PipelineOutcome::Completed {
            result: json!({ "researchSynthesis": [] }),
        }),
    ])
}

#[tokio::test]
async fn ask_reconciles_a_live_response() {
    let (base_url, shutdown, handle) = start_server(script()).await;
    let client = PipelineClient::new(ClientConfig::default().base_url(base_url)).expect("client");
    let mut conversation = Conversation::<TestKind>::new();
    let (_abort_tx, abort_rx) = watch::channel(false);

    let summary = client
        .ask(&mut conversation, "what should we study?", abort_rx)
        .await
        .expect("ask");
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert!(!summary.aborted);

    let records = conversation.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].kind, TestKind::User);
    assert_eq!(records[0].data, json!({ "text": "what should we study?" }));
    assert_eq!(records[1].process_id, "p1");
    assert_eq!(records[1].data, json!({ "a": 1 }));
    assert_eq!(records[2].process_id, "t1");
    assert_eq!(
        records[2].data,
        json!({ "query": "x", "result": "ok", "inProgress": false })
    );

    drop(client);
    let _ = shutdown.send(true);
    handle.await.expect("server task");
}

#[tokio::test]
async fn pipeline_failure_surfaces_as_diagnostic() {
    let (base_url, shutdown, handle) = start_server(Script::new(vec![
        ScriptStep::Event(PipelineEvent::text_delta("S1", "p1", "{\"a\":1}")),
        ScriptStep::Outcome(PipelineOutcome::Failed {
            error: "boom".to_string(),
        }),
    ]))
    .await;
    let client = PipelineClient::new(ClientConfig::default().base_url(base_url)).expect("client");
    let mut conversation = Conversation::<TestKind>::new();
    let (_abort_tx, abort_rx) = watch::channel(false);

    let summary = client
        .ask(&mut conversation, "hi", abort_rx)
        .await
        .expect("ask");
    assert_eq!(summary.pipeline_error(), Some("boom"));
    assert_eq!(conversation.records().len(), 2);

    drop(client);
    let _ = shutdown.send(true);
    handle.await.expect("server task");
}

#[tokio::test]
async fn blank_messages_are_not_sent() {
    let client = PipelineClient::new(ClientConfig::default()).expect("client");
    let mut conversation = Conversation::<TestKind>::new();
    let (_abort_tx, abort_rx) = watch::channel(false);
    assert!(client.ask(&mut conversation, "  ", abort_rx).await.is_err());
    assert!(conversation.records().is_empty());
}

#[tokio::test]
async fn slow_stream_outlives_the_idle_read_timeout() {
    // Five steps at 300 ms each: the whole response takes longer than the
    // read timeout, but no single gap does.
    let engine = ScriptedEngine::new(script()).with_delay(Duration::from_millis(300));
    let (base_url, shutdown, handle) = start_server_with(engine).await;
    let config = ClientConfig::default()
        .base_url(base_url)
        .connect_timeout(Duration::from_secs(1))
        .read_timeout(Duration::from_secs(1));
    let client = PipelineClient::new(config).expect("client");
    let mut conversation = Conversation::<TestKind>::new();
    let (_abort_tx, abort_rx) = watch::channel(false);

    let started = std::time::Instant::now();
    let summary = client
        .ask(&mut conversation, "take your time", abort_rx)
        .await
        .expect("ask");
    assert!(started.elapsed() > Duration::from_secs(1));
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert!(!summary.aborted);
    assert_eq!(conversation.records().len(), 3);

    drop(client);
    let _ = shutdown.send(true);
    handle.await.expect("server task");
}

#[tokio::test]
async fn abort_while_waiting_for_headers_leaves_conversation_untouched() {
    // Accepts connections into the backlog but never answers.
    let silent = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base_url = format!("http://{}", silent.local_addr().expect("addr"));
    let client = PipelineClient::new(ClientConfig::default().base_url(base_url)).expect("client");
    let mut conversation = Conversation::<TestKind>::new();
    let (abort_tx, abort_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = abort_tx.send(true);
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        client.ask(&mut conversation, "anyone there?", abort_rx),
    )
    .await
    .expect("abort ends the wait")
    .expect("ask");
    assert!(summary.aborted);
    assert_eq!(summary.upserts, 0);
    assert!(conversation.records().is_empty());
    drop(silent);
}
