use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::adapter::PartialParseAdapter;
use crate::process::{CounselorProcess, ProcessKind, ProcessRecord};
use crate::reconciler::ResponseReconciler;
use crate::registry::{ProcessRegistry, Upsert};
use crate::repair::{PrefixRepair, RepairParser};

pub type Snapshot<K> = Arc<[Arc<ProcessRecord<K>>]>;

/// Client-side state of one conversation.
///
/// Owns the registry across requests. The registry has a single writer (this
/// value, or the [`ResponseReconciler`] borrowing it); readers on other tasks
/// follow [`Conversation::subscribe`] and receive a fresh immutable snapshot
/// after every upsert.
pub struct Conversation<K: ProcessKind = CounselorProcess, P: RepairParser = PrefixRepair> {
    registry: ProcessRegistry<K>,
    adapter: PartialParseAdapter<K, P>,
    snapshots: watch::Sender<Snapshot<K>>,
}

impl<K: ProcessKind> Conversation<K, PrefixRepair> {
    pub fn new() -> Self {
        Self::with_parser(PrefixRepair)
    }
}

impl<K: ProcessKind> Default for Conversation<K, PrefixRepair> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ProcessKind, P: RepairParser> Conversation<K, P> {
    pub fn with_parser(parser: P) -> Self {
        let registry = ProcessRegistry::new();
        let (snapshots, _) = watch::channel(registry.snapshot());
        Self {
            registry,
            adapter: PartialParseAdapter::with_parser(parser),
            snapshots,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<K>> {
        self.snapshots.subscribe()
    }

    pub fn records(&self) -> &[Arc<ProcessRecord<K>>] {
        self.registry.records()
    }

    pub fn registry(&self) -> &ProcessRegistry<K> {
        &self.registry
    }

    /// Records the user's message as a pseudo-process and returns its id.
    ///
    /// Blank messages are ignored.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        let kind = K::user_message();
        let process_id = format!("{text}{}", chrono::Utc::now().timestamp_millis());
        let data = match kind.schema().validate_partial(&json!({ "text": text })) {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    event = "conversation.user_message_rejected",
                    domain = "conversation",
                    error = %err,
                    "user message does not match its schema"
                );
                return None;
            }
        };
        self.commit(ProcessRecord::new(kind, process_id.clone(), data));
        Some(process_id)
    }

    /// Renders the request body for `text`: the prompt followed by the data
    /// of every record so far, so the pipeline can build on earlier output.
    pub fn compose_prompt(&self, text: &str) -> String {
        let past: Vec<&Value> = self.registry.records().iter().map(|r| &r.data).collect();
        let past = serde_json::to_string_pretty(&past).unwrap_or_else(|_| "[]".to_string());
        format!(
            "## User's Prompt\n{text}\n\n## Past Messages\n\
             The following entries are your own earlier responses in this conversation. \
             Build on them; if the list is empty, start from scratch.\n{past}"
        )
    }

    /// Starts a new conversation.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.publish();
        debug!(
            event = "conversation.cleared",
            domain = "conversation",
            "registry cleared"
        );
    }

    /// Begins reconciling one response. Decoder and accumulator state live in
    /// the returned reconciler and die with it.
    pub fn begin_response(&mut self) -> ResponseReconciler<'_, K, P> {
        ResponseReconciler::new(self)
    }

    pub(crate) fn adapter(&self) -> &PartialParseAdapter<K, P> {
        &self.adapter
    }

    pub(crate) fn commit(&mut self, record: ProcessRecord<K>) -> Upsert {
        let upsert = self.registry.upsert(record);
        self.publish();
        upsert
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.registry.snapshot());
    }
}
