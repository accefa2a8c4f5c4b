//! Translation of the internal pipeline feed into wire events.

use std::sync::Arc;

use futures::StreamExt as _;
use serde_json::Value;
use stagewire_core::counselor::{ADVISOR_RESPONSE, WEB_SEARCH};
use stagewire_core::{Mode, Schema, StreamEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::pipeline::{GenerationChunk, PipelineEvent, PipelineOutcome, PipelineRun};

pub const MISSING_OUTCOME_MESSAGE: &str = "Pipeline finished without a result.";
pub const PANIC_MESSAGE: &str = "Unexpected error while running pipeline.";

/// Maps engine tool names onto wire tool names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolRoute {
    /// Substring matched against the engine's tool name.
    pub pattern: String,
    pub wire_name: String,
}

impl ToolRoute {
    pub fn new(pattern: impl Into<String>, wire_name: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            wire_name: wire_name.into(),
        }
    }

    fn matches(&self, tool_name: &str) -> bool {
        tool_name.contains(&self.pattern)
    }
}

#[derive(Clone, Debug)]
pub struct DemuxConfig {
    pub tool_routes: Vec<ToolRoute>,
    /// Merge tool results into the finish payload under `result`.
    pub include_tool_results: bool,
    /// Full schema a completed run's result must satisfy.
    pub result_schema: Schema,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            tool_routes: vec![
                ToolRoute::new("webSearch", WEB_SEARCH),
                ToolRoute::new("web-search", WEB_SEARCH),
            ],
            include_tool_results: false,
            result_schema: ADVISOR_RESPONSE.clone(),
        }
    }
}

impl DemuxConfig {
    pub fn with_tool_route(mut self, route: ToolRoute) -> Self {
        self.tool_routes.push(route);
        self
    }

    pub fn with_tool_results(mut self, include: bool) -> Self {
        self.include_tool_results = include;
        self
    }

    pub fn with_result_schema(mut self, schema: Schema) -> Self {
        self.result_schema = schema;
        self
    }
}

/// Stateless translator from [`PipelineEvent`] to [`StreamEvent`].
#[derive(Clone, Debug, Default)]
pub struct Demultiplexer {
    config: DemuxConfig,
}

impl Demultiplexer {
    pub fn new(config: DemuxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Translates one feed item; `None` when the item has no wire form.
    pub fn translate(&self, event: PipelineEvent) -> Option<StreamEvent> {
        let (step_name, step_id, output) = match event {
            PipelineEvent::StepOutput {
                step_name,
                step_id,
                output,
            } => (step_name, step_id, output),
            other => {
                debug!(
                    event = "demux.pipeline_event_dropped",
                    domain = "demux",
                    kind = other.kind(),
                    "lifecycle event"
                );
                return None;
            }
        };

        match output {
            GenerationChunk::TextDelta { run_id, text } => {
                if text.is_empty() {
                    return None;
                }
                let stage_id = step_name
                    .filter(|name| !name.is_empty())
                    .or(step_id.filter(|id| !id.is_empty()))
                    .unwrap_or_else(|| run_id.clone());
                Some(StreamEvent::stage_chunk(stage_id, run_id, text))
            }
            GenerationChunk::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => {
                let wire_name = self.route(&tool_name, &tool_call_id)?;
                Some(StreamEvent::tool_start(wire_name, tool_call_id, args.to_string()))
            }
            GenerationChunk::ToolResult {
                tool_call_id,
                tool_name,
                args,
                result,
            } => {
                let wire_name = self.route(&tool_name, &tool_call_id)?;
                let text = self.finish_text(args, result);
                Some(StreamEvent::tool_finish(wire_name, tool_call_id, text))
            }
            GenerationChunk::ToolError {
                tool_call_id,
                tool_name,
                args,
                error,
            } => {
                let wire_name = self.route(&tool_name, &tool_call_id)?;
                warn!(
                    event = "demux.tool_failed",
                    domain = "demux",
                    tool = %tool_name,
                    tool_call_id = %tool_call_id,
                    "tool reported an error"
                );
                let text = self.finish_text(args, error);
                Some(StreamEvent::tool_finish(wire_name, tool_call_id, text))
            }
            GenerationChunk::Other => {
                debug!(
                    event = "demux.pipeline_event_dropped",
                    domain = "demux",
                    kind = "step-output",
                    "unsupported generation chunk"
                );
                None
            }
        }
    }

    /// Maps the run's final status to at most one closing event.
    pub fn conclude(&self, outcome: Option<PipelineOutcome>) -> Option<StreamEvent> {
        match outcome {
            None => {
                error!(
                    event = "demux.pipeline_outcome_missing",
                    domain = "demux",
                    "engine dropped its result"
                );
                Some(StreamEvent::error(MISSING_OUTCOME_MESSAGE))
            }
            Some(PipelineOutcome::Failed { error }) => {
                error!(
                    event = "demux.pipeline_failed",
                    domain = "demux",
                    error = %error,
                    "pipeline failed"
                );
                if error.trim().is_empty() {
                    Some(StreamEvent::error("Pipeline failed without additional details."))
                } else {
                    Some(StreamEvent::error(error))
                }
            }
            Some(PipelineOutcome::Suspended) => {
                info!(event = "demux.pipeline_suspended", domain = "demux", "pipeline suspended");
                None
            }
            Some(PipelineOutcome::Completed { result }) => {
                match self.config.result_schema.validate(&result, Mode::Full) {
                    Ok(_) => {
                        info!(
                            event = "demux.pipeline_completed",
                            domain = "demux",
                            "pipeline completed"
                        );
                        None
                    }
                    Err(err) => {
                        error!(
                            event = "demux.pipeline_result_invalid",
                            domain = "demux",
                            error = %err,
                            "completed result failed validation"
                        );
                        Some(StreamEvent::error(format!(
                            "Pipeline completed but result parsing failed: {err}"
                        )))
                    }
                }
            }
        }
    }

    fn route(&self, tool_name: &str, tool_call_id: &str) -> Option<String> {
        let route = self
            .config
            .tool_routes
            .iter()
            .find(|route| route.matches(tool_name));
        let Some(route) = route else {
            debug!(
                event = "demux.tool_unrouted",
                domain = "demux",
                tool = %tool_name,
                "tool has no wire route"
            );
            return None;
        };
        if tool_call_id.is_empty() {
            warn!(
                event = "demux.tool_call_id_missing",
                domain = "demux",
                tool = %tool_name,
                "dropping tool event without call id"
            );
            return None;
        }
        Some(route.wire_name.clone())
    }

    fn finish_text(&self, args: Value, payload: Option<Value>) -> String {
        match (args, payload) {
            (Value::Object(mut map), Some(payload)) if self.config.include_tool_results => {
                map.insert("result".to_string(), payload);
                Value::Object(map).to_string()
            }
            (args, _) => args.to_string(),
        }
    }

    /// Spawns the demultiplexing task for `run` and returns the receiving end
    /// of its bounded output channel.
    ///
    /// Dropping the receiver aborts the run. A panic inside the task is turned
    /// into a single error event by a supervisor task.
    pub fn spawn(
        self: &Arc<Self>,
        run: PipelineRun,
        capacity: usize,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let supervisor_tx = tx.clone();
        let abort = run.abort.clone();
        let run_id = run.run_id;
        let task = tokio::spawn(demux_task(Arc::clone(self), run, tx));
        tokio::spawn(async move {
            if let Err(join_err) = task.await
                && join_err.is_panic()
            {
                error!(
                    event = "demux.panicked",
                    domain = "demux",
                    run_id = %run_id,
                    "demultiplexer task panicked"
                );
                abort.abort();
                let _ = supervisor_tx.send(StreamEvent::error(PANIC_MESSAGE)).await;
            }
        });
        rx
    }
}

async fn demux_task(demux: Arc<Demultiplexer>, run: PipelineRun, tx: mpsc::Sender<StreamEvent>) {
    let PipelineRun {
        run_id,
        mut events,
        outcome,
        abort,
    } = run;
    debug!(event = "demux.started", domain = "demux", run_id = %run_id, "demultiplexing run");

    let mut emitted = 0_u64;
    loop {
        tokio::select! {
            _ = tx.closed() => {
                info!(
                    event = "demux.consumer_disconnected",
                    domain = "demux",
                    run_id = %run_id,
                    emitted,
                    "aborting run"
                );
                abort.abort();
                return;
            }
            next = events.next() => match next {
                Some(Ok(event)) => {
                    let Some(wire) = demux.translate(event) else {
                        continue;
                    };
                    if tx.send(wire).await.is_err() {
                        info!(
                            event = "demux.consumer_disconnected",
                            domain = "demux",
                            run_id = %run_id,
                            emitted,
                            "aborting run"
                        );
                        abort.abort();
                        return;
                    }
                    emitted = emitted.saturating_add(1);
                }
                Some(Err(err)) => {
                    error!(
                        event = "demux.pipeline_feed_failed",
                        domain = "demux",
                        run_id = %run_id,
                        error = %err,
                        "aborting run"
                    );
                    abort.abort();
                    let _ = tx.send(StreamEvent::error(err.to_string())).await;
                    return;
                }
                None => break,
            }
        }
    }

    let outcome = tokio::select! {
        _ = tx.closed() => {
            abort.abort();
            return;
        }
        outcome = outcome => outcome.ok(),
    };
    if let Some(closing) = demux.conclude(outcome) {
        let _ = tx.send(closing).await;
    }
    debug!(
        event = "demux.finished",
        domain = "demux",
        run_id = %run_id,
        emitted,
        "run demultiplexed"
    );
}
