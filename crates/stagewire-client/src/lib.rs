//! Client half of stagewire: consumes the line-delimited event stream and
//! reconciles it, fragment by fragment, into an ordered registry of typed
//! process records.

pub mod accumulator;
/// Fragment parsing and partial-schema validation.
pub mod adapter;
pub mod client;
pub mod config;
pub mod conversation;
pub mod errors;
/// Process kinds and records.
pub mod process;
pub mod reconciler;
pub mod registry;
/// Repair parsing of incomplete JSON.
pub mod repair;

pub use accumulator::Accumulator;
pub use adapter::{PartialParseAdapter, Reconciled};
pub use client::PipelineClient;
pub use config::ClientConfig;
pub use conversation::{Conversation, Snapshot};
pub use errors::{ClientError, Diagnostic};
pub use process::{CounselorProcess, ProcessKind, ProcessRecord};
pub use reconciler::{ResponseReconciler, ResponseSummary};
pub use registry::{ProcessRegistry, Upsert};
pub use repair::{ParseState, PrefixRepair, RepairParser};
