use std::net::SocketAddr;

use pretty_assertions::assert_eq;
use serde_json::json;
use stagewire_core::{LineDecoder, NDJSON_CONTENT_TYPE, StreamEvent};
use stagewire_server::{
    AppContext, PipelineEvent, PipelineOutcome, Script, ScriptStep, ScriptedEngine, serve_on,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

struct TestServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(script: Script) -> Self {
        let ctx = AppContext::builder()
            .engine(ScriptedEngine::new(script))
            .build()
            .expect("context");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            serve_on(listener, ctx, shutdown_rx).await.expect("serve");
        });
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.await.expect("server task");
    }
}

fn counselor_script() -> Script {
    Script::new(vec![
        ScriptStep::Event(PipelineEvent::WorkflowStart { run_id: None }),
        ScriptStep::Event(PipelineEvent::text_delta("S1", "p1", "{\"a\":")),
        ScriptStep::Event(PipelineEvent::text_delta("S1", "p1", "1}")),
        ScriptStep::Event(PipelineEvent::tool_call(
            "t1",
            "webSearchTool",
            json!({ "query": "x" }),
        )),
        ScriptStep::Event(PipelineEvent::tool_result(
            "t1",
            "webSearchTool",
            json!({ "query": "x" }),
            Some(json!("ok")),
        )),
        ScriptStep::Event(PipelineEvent::WorkflowFinish),
        ScriptStep::Outcome(PipelineOutcome::Completed {
            result: json!({ "researchSynthesis": [] }),
        }),
    ])
}

fn decode_body(body: &[u8]) -> Vec<StreamEvent> {
    let mut decoder = LineDecoder::new();
    let events = decoder
        .push_chunk(body)
        .into_iter()
        .map(|r| r.expect("valid line"))
        .collect();
    assert_eq!(decoder.finish(), 0);
    events
}

#[tokio::test]
async fn pipeline_endpoint_streams_ndjson_events() {
    let server = TestServer::start(counselor_script()).await;
    let response = reqwest::Client::new()
        .post(server.url("/api/pipeline"))
        .json(&json!({ "message": "help my kid with math" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().expect("header"),
        NDJSON_CONTENT_TYPE
    );
    assert_eq!(
        response.headers()["cache-control"].to_str().expect("header"),
        "no-cache"
    );

    let body = response.bytes().await.expect("body");
    assert_eq!(
        decode_body(&body),
        vec![
            StreamEvent::stage_chunk("S1", "p1", "{\"a\":"),
            StreamEvent::stage_chunk("S1", "p1", "1}"),
            StreamEvent::tool_start("web-search", "t1", r#"{"query":"x"}"#),
            StreamEvent::tool_finish("web-search", "t1", r#"{"query":"x"}"#),
        ]
    );
    server.stop().await;
}

#[tokio::test]
async fn missing_or_empty_message_yields_single_error_line() {
    let server = TestServer::start(counselor_script()).await;
    let client = reqwest::Client::new();
    for body in [json!({}), json!({ "message": 42 }), json!({ "message": "" })] {
        let response = client
            .post(server.url("/api/pipeline"))
            .json(&body)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), 200);
        let body = response.bytes().await.expect("body");
        assert_eq!(
            decode_body(&body),
            vec![StreamEvent::error("No user message provided.")]
        );
    }
    drop(client);
    server.stop().await;
}

#[tokio::test]
async fn failed_run_closes_with_error_line() {
    let server = TestServer::start(Script::new(vec![
        ScriptStep::Event(PipelineEvent::text_delta("S1", "p1", "{")),
        ScriptStep::Outcome(PipelineOutcome::Failed {
            error: "boom".to_string(),
        }),
    ]))
    .await;
    let body = reqwest::Client::new()
        .post(server.url("/api/pipeline"))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .expect("request")
        .bytes()
        .await
        .expect("body");
    assert_eq!(
        decode_body(&body),
        vec![
            StreamEvent::stage_chunk("S1", "p1", "{"),
            StreamEvent::error("boom"),
        ]
    );
    server.stop().await;
}

#[tokio::test]
async fn health_reports_ok() {
    let server = TestServer::start(counselor_script()).await;
    let text = reqwest::get(server.url("/health"))
        .await
        .expect("request")
        .text()
        .await
        .expect("body");
    assert_eq!(text, "ok");
    server.stop().await;
}
