//! HTTP transport for the pipeline endpoint.

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::conversation::Conversation;
use crate::errors::ClientError;
use crate::process::ProcessKind;
use crate::reconciler::ResponseSummary;
use crate::repair::RepairParser;

#[derive(Clone, Debug)]
pub struct PipelineClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl PipelineClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let config = config.validated()?;
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(idle) = config.read_timeout {
            builder = builder.read_timeout(idle);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Posts `message` and returns the streaming response once headers arrive.
    pub async fn open(&self, message: &str) -> Result<reqwest::Response, ClientError> {
        let url = self.config.pipeline_url();
        debug!(
            event = "client.request_opened",
            domain = "client",
            url = %url,
            message_len = message.len(),
            "opening pipeline stream"
        );
        let response = self
            .http
            .post(&url)
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(ClientError::Request)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Runs one conversational turn.
    ///
    /// The prompt is composed from the records that exist before this turn.
    /// The user's message is recorded once the server has answered with
    /// headers; then the response is reconciled into `conversation` until it
    /// ends or `abort` turns true. An abort while waiting for headers drops
    /// the request and leaves the conversation untouched.
    pub async fn ask<K, P>(
        &self,
        conversation: &mut Conversation<K, P>,
        text: &str,
        mut abort: watch::Receiver<bool>,
    ) -> Result<ResponseSummary, ClientError>
    where
        K: ProcessKind,
        P: RepairParser,
    {
        if text.trim().is_empty() {
            return Err(ClientError::Config("message must not be empty".into()));
        }
        let prompt = conversation.compose_prompt(text);
        let response = tokio::select! {
            biased;
            _ = wait_for_abort(&mut abort) => {
                info!(
                    event = "client.request_aborted",
                    domain = "client",
                    "aborted before the response started"
                );
                return Ok(ResponseSummary {
                    aborted: true,
                    ..ResponseSummary::default()
                });
            }
            response = self.open(&prompt) => response?,
        };
        conversation.submit(text);
        let summary = conversation
            .begin_response()
            .drive(response.bytes_stream(), abort)
            .await;
        info!(
            event = "client.turn_finished",
            domain = "client",
            upserts = summary.upserts,
            diagnostics = summary.diagnostics.len(),
            aborted = summary.aborted,
            "turn finished"
        );
        Ok(summary)
    }
}

/// Resolves once `abort` reads true; never resolves if the sender is gone.
async fn wait_for_abort(abort: &mut watch::Receiver<bool>) {
    if abort.wait_for(|aborted| *aborted).await.is_err() {
        std::future::pending::<()>().await;
    }
}
