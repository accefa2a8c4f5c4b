//! NDJSON streaming endpoint.

use std::convert::Infallible;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt as _;
use serde_json::Value;
use stagewire_core::{NDJSON_CONTENT_TYPE, StreamEvent, encode_line};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::context::{AppContext, single_event};
use crate::errors::ServerError;

pub const PIPELINE_PATH: &str = "/api/pipeline";
pub const HEALTH_PATH: &str = "/health";
pub const MISSING_MESSAGE: &str = "No user message provided.";

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route(PIPELINE_PATH, post(run_pipeline))
        .route(HEALTH_PATH, get(health))
        .with_state(ctx)
}

async fn health() -> &'static str {
    "ok"
}

async fn run_pipeline(State(ctx): State<AppContext>, body: Bytes) -> Response {
    let events = match extract_message(&body) {
        Some(message) => ctx.open_stream(message).await,
        None => {
            warn!(
                event = "http.request_rejected",
                domain = "http",
                body_len = body.len(),
                "request without message"
            );
            single_event(StreamEvent::error(MISSING_MESSAGE))
        }
    };
    ndjson_response(events)
}

/// The request's `message`, if it is a non-blank string.
fn extract_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match value.get("message")? {
        Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
        _ => None,
    }
}

fn ndjson_response(events: mpsc::Receiver<StreamEvent>) -> Response {
    let lines = futures::stream::unfold(events, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
    .filter_map(|event| async move {
        match encode_line(&event) {
            Ok(line) => Some(Ok::<_, Infallible>(line)),
            Err(err) => {
                warn!(
                    event = "http.event_unencodable",
                    domain = "http",
                    kind = event.kind(),
                    error = %err,
                    "dropping event"
                );
                None
            }
        }
    });
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Binds `ctx.config().bind_addr` and serves until `shutdown` turns true.
pub async fn serve(ctx: AppContext, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
    let addr = ctx.config().bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_on(listener, ctx, shutdown).await
}

pub async fn serve_on(
    listener: TcpListener,
    ctx: AppContext,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let local = listener.local_addr().map_err(ServerError::Serve)?;
    info!(
        event = "http.server_listening",
        domain = "http",
        addr = %local,
        engine = ctx.engine_name(),
        "stagewire server listening"
    );
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(ServerError::Serve)?;
    info!(event = "http.server_stopped", domain = "http", "stagewire server stopped");
    Ok(())
}

async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}
