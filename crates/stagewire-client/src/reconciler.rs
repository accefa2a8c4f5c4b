//! Per-response reconciliation of wire events into the registry.

use futures::{Stream, StreamExt as _};
use stagewire_core::{LineDecoder, StreamEvent};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::accumulator::Accumulator;
use crate::adapter::Reconciled;
use crate::conversation::Conversation;
use crate::errors::Diagnostic;
use crate::process::ProcessKind;
use crate::registry::Upsert;
use crate::repair::RepairParser;

/// What one response did to the conversation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseSummary {
    /// Decoded wire events, including rejected ones.
    pub events: usize,
    pub upserts: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub aborted: bool,
}

impl ResponseSummary {
    /// Message of the server's error event, if one arrived.
    pub fn pipeline_error(&self) -> Option<&str> {
        self.diagnostics.iter().find_map(|d| match d {
            Diagnostic::Pipeline(message) => Some(message.as_str()),
            _ => None,
        })
    }
}

/// Applies one response's events to a [`Conversation`].
///
/// Holds the response's line decoder and stage accumulators. Upserts are
/// committed as soon as they reconcile, so readers see the response live;
/// aborting drops whatever is still buffered.
pub struct ResponseReconciler<'c, K: ProcessKind, P: RepairParser> {
    conversation: &'c mut Conversation<K, P>,
    decoder: LineDecoder,
    accumulator: Accumulator,
    summary: ResponseSummary,
}

impl<'c, K: ProcessKind, P: RepairParser> ResponseReconciler<'c, K, P> {
    pub(crate) fn new(conversation: &'c mut Conversation<K, P>) -> Self {
        Self {
            conversation,
            decoder: LineDecoder::new(),
            accumulator: Accumulator::new(),
            summary: ResponseSummary::default(),
        }
    }

    /// Feeds raw transport bytes; returns the number of upserts they caused.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> usize {
        let mut upserts = 0;
        for decoded in self.decoder.push_chunk(chunk) {
            match decoded {
                Ok(event) => {
                    if self.apply(event).is_some() {
                        upserts += 1;
                    }
                }
                Err(err) => self.diagnose(Diagnostic::MalformedLine(err.to_string())),
            }
        }
        upserts
    }

    /// Applies one decoded event.
    pub fn apply(&mut self, event: StreamEvent) -> Option<Upsert> {
        self.summary.events += 1;
        let upsert = match event {
            StreamEvent::StageOutputChunk {
                text,
                stage_id,
                process_id,
            } => self.stage_chunk(&stage_id, &process_id, &text),
            StreamEvent::ToolCallStart {
                text,
                process_id,
                tool_name,
            } => self.tool_event("tool-call-start", &tool_name, &process_id, &text, true),
            StreamEvent::ToolCallFinish {
                text,
                process_id,
                tool_name,
            } => self.tool_event("tool-call-finish", &tool_name, &process_id, &text, false),
            StreamEvent::Error { message } => {
                self.diagnose(Diagnostic::Pipeline(message));
                None
            }
        };
        if upsert.is_some() {
            self.summary.upserts += 1;
        }
        upsert
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.summary.diagnostics
    }

    /// Ends the response normally. An unterminated trailing line is dropped.
    pub fn finish(mut self) -> ResponseSummary {
        let decoder = std::mem::take(&mut self.decoder);
        let discarded = decoder.finish();
        if discarded > 0 {
            self.diagnose(Diagnostic::TrailingBytes(discarded));
        }
        debug!(
            event = "reconciler.response_finished",
            domain = "reconciler",
            events = self.summary.events,
            upserts = self.summary.upserts,
            diagnostics = self.summary.diagnostics.len(),
            "response reconciled"
        );
        self.summary
    }

    /// Ends the response without committing anything still buffered.
    pub fn abort(mut self) -> ResponseSummary {
        self.decoder.reset();
        self.accumulator.clear();
        self.summary.aborted = true;
        info!(
            event = "reconciler.response_aborted",
            domain = "reconciler",
            events = self.summary.events,
            "response aborted"
        );
        self.summary
    }

    /// Consumes `stream` until it ends, fails, or `abort` turns true.
    ///
    /// A transport failure ends the response like a clean close and is noted
    /// as a diagnostic.
    pub async fn drive<S, B, E>(
        mut self,
        stream: S,
        mut abort: watch::Receiver<bool>,
    ) -> ResponseSummary
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        if *abort.borrow() {
            return self.abort();
        }
        let mut stream = std::pin::pin!(stream);
        let mut abort_live = true;
        loop {
            tokio::select! {
                biased;
                changed = abort.changed(), if abort_live => {
                    match changed {
                        Ok(()) if *abort.borrow() => return self.abort(),
                        Ok(()) => {}
                        Err(_) => abort_live = false,
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            self.push_chunk(chunk.as_ref());
                        }
                        Some(Err(err)) => {
                            self.diagnose(Diagnostic::Transport(err.to_string()));
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
        self.finish()
    }

    fn stage_chunk(&mut self, stage_id: &str, process_id: &str, text: &str) -> Option<Upsert> {
        if process_id.is_empty() {
            self.diagnose(Diagnostic::MissingProcessId {
                kind: "stage-output-chunk",
            });
            return None;
        }
        if text.is_empty() {
            return None;
        }
        let Some(kind) = K::from_stage_id(stage_id) else {
            self.diagnose(Diagnostic::UnknownStage {
                stage_id: stage_id.to_string(),
            });
            return None;
        };
        let accumulated = self.accumulator.append(stage_id, process_id, text);
        let reconciled = self
            .conversation
            .adapter()
            .stage_update(kind, process_id, accumulated);
        self.settle(reconciled)
    }

    fn tool_event(
        &mut self,
        event: &'static str,
        tool_name: &str,
        process_id: &str,
        text: &str,
        in_progress: bool,
    ) -> Option<Upsert> {
        if process_id.is_empty() {
            self.diagnose(Diagnostic::MissingProcessId { kind: event });
            return None;
        }
        let Some(kind) = K::from_tool_name(tool_name) else {
            self.diagnose(Diagnostic::UnknownTool {
                tool_name: tool_name.to_string(),
            });
            return None;
        };
        let reconciled = self
            .conversation
            .adapter()
            .tool_update(kind, process_id, text, in_progress);
        self.settle(reconciled)
    }

    fn settle(&mut self, reconciled: Reconciled<K>) -> Option<Upsert> {
        match reconciled {
            Reconciled::Update(record) => Some(self.conversation.commit(record)),
            Reconciled::Pending => None,
            Reconciled::Rejected(diagnostic) => {
                self.diagnose(diagnostic);
                None
            }
        }
    }

    fn diagnose(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Pipeline(message) => {
                warn!(
                    event = "reconciler.pipeline_error",
                    domain = "reconciler",
                    message = %message,
                    "server reported an error"
                );
            }
            Diagnostic::MalformedFragment { .. } => {
                debug!(
                    event = "reconciler.fragment_dropped",
                    domain = "reconciler",
                    diagnostic = %diagnostic,
                    "fragment dropped"
                );
            }
            other => {
                warn!(
                    event = "reconciler.fragment_dropped",
                    domain = "reconciler",
                    kind = other.kind(),
                    diagnostic = %other,
                    "input dropped"
                );
            }
        }
        self.summary.diagnostics.push(diagnostic);
    }
}
