//! Contract between the HTTP surface and whatever executes the pipeline.
//!
//! An engine turns one [`PipelineRequest`] into a [`PipelineRun`]: a stream
//! of heterogeneous [`PipelineEvent`]s, a one-shot final
//! [`PipelineOutcome`], and an [`AbortHandle`] the server fires when the
//! consumer goes away.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{oneshot, watch};

use crate::errors::PipelineError;

/// One generation fragment produced inside a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GenerationChunk {
    #[serde(rename_all = "camelCase")]
    TextDelta { run_id: String, text: String },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        result: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ToolError {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        error: Option<Value>,
    },
    /// Any chunk shape the wire does not carry (reasoning, usage, finish).
    #[serde(other)]
    Other,
}

/// Internal pipeline feed item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PipelineEvent {
    #[serde(rename_all = "camelCase")]
    WorkflowStart {
        #[serde(default)]
        run_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StepStart { step_id: String },
    #[serde(rename_all = "camelCase")]
    StepOutput {
        #[serde(default)]
        step_name: Option<String>,
        #[serde(default)]
        step_id: Option<String>,
        output: GenerationChunk,
    },
    #[serde(rename_all = "camelCase")]
    StepFinish { step_id: String },
    WorkflowFinish,
    #[serde(other)]
    Other,
}

impl PipelineEvent {
    /// Tag of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowStart { .. } => "workflow-start",
            Self::StepStart { .. } => "step-start",
            Self::StepOutput { .. } => "step-output",
            Self::StepFinish { .. } => "step-finish",
            Self::WorkflowFinish => "workflow-finish",
            Self::Other => "other",
        }
    }

    pub fn text_delta(
        step_name: impl Into<String>,
        run_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::StepOutput {
            step_name: Some(step_name.into()),
            step_id: None,
            output: GenerationChunk::TextDelta {
                run_id: run_id.into(),
                text: text.into(),
            },
        }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self::StepOutput {
            step_name: None,
            step_id: None,
            output: GenerationChunk::ToolCall {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                args,
            },
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        result: Option<Value>,
    ) -> Self {
        Self::StepOutput {
            step_name: None,
            step_id: None,
            output: GenerationChunk::ToolResult {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                args,
                result,
            },
        }
    }
}

/// Final status of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum PipelineOutcome {
    Completed { result: Value },
    Failed { error: String },
    /// The run paused waiting for external input; no result is expected.
    Suspended,
}

/// Input for one pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineRequest {
    pub request_id: uuid::Uuid,
    /// Composed prompt sent by the client.
    pub message: String,
    /// Step ceiling the engine must honor.
    pub max_steps: u32,
}

impl PipelineRequest {
    pub fn new(message: impl Into<String>, max_steps: u32) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4(),
            message: message.into(),
            max_steps,
        }
    }
}

pub type PipelineEventStream =
    Pin<Box<dyn Stream<Item = Result<PipelineEvent, PipelineError>> + Send + 'static>>;

/// Handle used to cancel an in-flight run.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Creates a connected handle and signal pair.
    pub fn pair() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    /// Requests cancellation. Best-effort; the engine observes it through its
    /// [`AbortSignal`].
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Engine-side view of an [`AbortHandle`].
#[derive(Clone, Debug)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is aborted. Never resolves if every handle is
    /// dropped without aborting.
    pub async fn aborted(&mut self) {
        let observed = self.rx.wait_for(|aborted| *aborted).await.map(|_| ());
        if observed.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A started run.
pub struct PipelineRun {
    pub run_id: uuid::Uuid,
    pub events: PipelineEventStream,
    pub outcome: oneshot::Receiver<PipelineOutcome>,
    pub abort: AbortHandle,
}

/// Executes the multi-stage pipeline.
#[async_trait::async_trait]
pub trait PipelineEngine: Send + Sync + 'static {
    /// Engine name, for logging.
    fn name(&self) -> &str;

    /// Starts a run. Errors here happen before any event is produced.
    async fn start(&self, request: PipelineRequest) -> Result<PipelineRun, PipelineError>;
}
