use stagewire_core::SchemaError;

/// Errors of the HTTP client and its configuration.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(String),
    /// The request could not be sent.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// An absorbed failure.
///
/// Nothing in the reconciliation path aborts the stream; problems are
/// recorded here and the offending input is dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Diagnostic {
    #[error("malformed stream line: {0}")]
    MalformedLine(String),
    #[error("unknown stage {stage_id:?}")]
    UnknownStage { stage_id: String },
    #[error("unknown tool {tool_name:?}")]
    UnknownTool { tool_name: String },
    #[error("process {process_id} produced a value that is not an object")]
    NonObject { process_id: String },
    #[error("process {process_id} produced malformed JSON")]
    MalformedFragment { process_id: String },
    #[error("process {process_id} rejected by schema: {error}")]
    SchemaRejected {
        process_id: String,
        error: SchemaError,
    },
    #[error("{kind} event without a process id")]
    MissingProcessId { kind: &'static str },
    /// The server reported a pipeline failure.
    #[error("pipeline error: {0}")]
    Pipeline(String),
    #[error("discarded {0} bytes of an unterminated line")]
    TrailingBytes(usize),
    /// The transport failed mid-stream; the response ended early.
    #[error("transport closed: {0}")]
    Transport(String),
}

impl Diagnostic {
    /// Short name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedLine(_) => "malformed_line",
            Self::UnknownStage { .. } => "unknown_stage",
            Self::UnknownTool { .. } => "unknown_tool",
            Self::NonObject { .. } => "non_object",
            Self::MalformedFragment { .. } => "malformed_fragment",
            Self::SchemaRejected { .. } => "schema_rejected",
            Self::MissingProcessId { .. } => "missing_process_id",
            Self::Pipeline(_) => "pipeline",
            Self::TrailingBytes(_) => "trailing_bytes",
            Self::Transport(_) => "transport",
        }
    }
}
