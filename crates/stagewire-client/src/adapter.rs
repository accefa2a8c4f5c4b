//! Turns raw fragments into schema-checked process records.

use std::marker::PhantomData;

use serde_json::{Map, Value};

use crate::errors::Diagnostic;
use crate::process::{ProcessKind, ProcessRecord};
use crate::repair::{ParseState, PrefixRepair, RepairParser};

/// Outcome of reconciling one fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciled<K> {
    /// A new best-effort view of the process.
    Update(ProcessRecord<K>),
    /// Not enough text yet; nothing to do.
    Pending,
    /// The fragment was dropped.
    Rejected(Diagnostic),
}

#[derive(Debug)]
pub struct PartialParseAdapter<K, P = PrefixRepair> {
    parser: P,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ProcessKind> PartialParseAdapter<K, PrefixRepair> {
    pub fn new() -> Self {
        Self::with_parser(PrefixRepair)
    }
}

impl<K: ProcessKind> Default for PartialParseAdapter<K, PrefixRepair> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ProcessKind, P: RepairParser> PartialParseAdapter<K, P> {
    pub fn with_parser(parser: P) -> Self {
        Self {
            parser,
            _kind: PhantomData,
        }
    }

    /// Reconciles the whole accumulated text of a stage generation.
    pub fn stage_update(&self, kind: K, process_id: &str, accumulated: &str) -> Reconciled<K> {
        match self.parser.parse(accumulated) {
            ParseState::NoMatch | ParseState::Parsing => Reconciled::Pending,
            ParseState::Malformed => Reconciled::Rejected(Diagnostic::MalformedFragment {
                process_id: process_id.to_string(),
            }),
            ParseState::Successful(value) | ParseState::Repaired(value) => match value {
                Value::Object(map) => self.validated(kind, process_id, map),
                _ => Reconciled::Rejected(Diagnostic::NonObject {
                    process_id: process_id.to_string(),
                }),
            },
        }
    }

    /// Reconciles the serialized arguments of a tool event and stamps
    /// `inProgress`. Absent or `null` arguments count as an empty object.
    pub fn tool_update(
        &self,
        kind: K,
        process_id: &str,
        text: &str,
        in_progress: bool,
    ) -> Reconciled<K> {
        let mut map = match self.parser.parse(text) {
            ParseState::NoMatch => Map::new(),
            ParseState::Parsing => return Reconciled::Pending,
            ParseState::Malformed => {
                return Reconciled::Rejected(Diagnostic::MalformedFragment {
                    process_id: process_id.to_string(),
                });
            }
            ParseState::Successful(value) | ParseState::Repaired(value) => match value {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                _ => {
                    return Reconciled::Rejected(Diagnostic::NonObject {
                        process_id: process_id.to_string(),
                    });
                }
            },
        };
        map.insert("inProgress".to_string(), Value::Bool(in_progress));
        self.validated(kind, process_id, map)
    }

    fn validated(&self, kind: K, process_id: &str, map: Map<String, Value>) -> Reconciled<K> {
        match kind.schema().validate_partial(&Value::Object(map)) {
            Ok(data) => Reconciled::Update(ProcessRecord::new(kind, process_id, data)),
            Err(error) => Reconciled::Rejected(Diagnostic::SchemaRejected {
                process_id: process_id.to_string(),
                error,
            }),
        }
    }
}
