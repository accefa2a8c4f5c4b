//! Engine that replays a recorded pipeline run.
//!
//! Scripts are JSON lines, one step per line:
//!
//! ```text
//! {"event": {"type": "step-output", "stepName": "...", "output": {...}}}
//! {"fail": "upstream went away"}
//! {"outcome": {"status": "completed", "result": {...}}}
//! ```
//!
//! Blank lines and lines starting with `//` are ignored. A script without an
//! `outcome` line ends with the result channel dropped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::pipeline::{
    AbortHandle, AbortSignal, PipelineEngine, PipelineEvent, PipelineOutcome, PipelineRequest,
    PipelineRun,
};

const FEED_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStep {
    Event(PipelineEvent),
    /// Breaks the feed with an error item.
    Fail(String),
    Outcome(PipelineOutcome),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Script {
    pub steps: Vec<ScriptStep>,
}

impl Script {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps }
    }

    pub fn from_jsonl(text: &str) -> Result<Self, PipelineError> {
        let mut steps = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let step = serde_json::from_str(line).map_err(|e| PipelineError::Script {
                line: idx + 1,
                message: e.to_string(),
            })?;
            steps.push(step);
        }
        Ok(Self { steps })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            PipelineError::start(format!("cannot read script {}: {e}", path.display()))
        })?;
        Self::from_jsonl(&text)
    }
}

/// Replays a [`Script`] for every request, pacing events by a fixed delay.
///
/// `step-start` events count against the request's `max_steps`; exceeding it
/// fails the run.
#[derive(Clone, Debug)]
pub struct ScriptedEngine {
    script: Arc<Script>,
    delay: Duration,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl PipelineEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self, request: PipelineRequest) -> Result<PipelineRun, PipelineError> {
        if self.script.steps.is_empty() {
            return Err(PipelineError::start("script has no steps"));
        }
        let run_id = uuid::Uuid::new_v4();
        info!(
            event = "engine.pipeline_started",
            domain = "engine",
            engine = "scripted",
            run_id = %run_id,
            request_id = %request.request_id,
            message_len = request.message.len(),
            "replaying script"
        );
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (abort, signal) = AbortHandle::pair();
        tokio::spawn(replay(
            Arc::clone(&self.script),
            self.delay,
            request.max_steps,
            tx,
            outcome_tx,
            signal,
        ));

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(PipelineRun {
            run_id,
            events: Box::pin(events),
            outcome: outcome_rx,
            abort,
        })
    }
}

async fn replay(
    script: Arc<Script>,
    delay: Duration,
    max_steps: u32,
    tx: mpsc::Sender<Result<PipelineEvent, PipelineError>>,
    outcome_tx: oneshot::Sender<PipelineOutcome>,
    mut signal: AbortSignal,
) {
    let mut steps_started = 0_u32;
    for step in script.steps.iter() {
        if !delay.is_zero() {
            tokio::select! {
                _ = signal.aborted() => {
                    debug!(event = "engine.replay_aborted", domain = "engine", "replay aborted");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if signal.is_aborted() {
            debug!(event = "engine.replay_aborted", domain = "engine", "replay aborted");
            return;
        }
        match step {
            ScriptStep::Event(event) => {
                if matches!(event, PipelineEvent::StepStart { .. }) {
                    steps_started = steps_started.saturating_add(1);
                    if steps_started > max_steps {
                        warn!(
                            event = "engine.step_limit_exceeded",
                            domain = "engine",
                            max_steps,
                            "stopping replay"
                        );
                        let _ = outcome_tx.send(PipelineOutcome::Failed {
                            error: format!("Pipeline exceeded the limit of {max_steps} steps."),
                        });
                        return;
                    }
                }
                if tx.send(Ok(event.clone())).await.is_err() {
                    return;
                }
            }
            ScriptStep::Fail(message) => {
                let _ = tx.send(Err(PipelineError::feed(message.clone()))).await;
                return;
            }
            ScriptStep::Outcome(outcome) => {
                drop(tx);
                let _ = outcome_tx.send(outcome.clone());
                return;
            }
        }
    }
}
