use serde::{Deserialize, Serialize};

/// One line on the wire.
///
/// The `event` tag and the camelCase field names are part of the protocol and
/// must not change without a coordinated client release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Content fragment of an ongoing stage generation.
    StageOutputChunk {
        text: String,
        #[serde(rename = "stageId")]
        stage_id: String,
        #[serde(rename = "processId")]
        process_id: String,
    },
    /// A tool invocation has begun; `text` carries the serialized arguments.
    ToolCallStart {
        text: String,
        #[serde(rename = "processId")]
        process_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    /// The invocation with the same `process_id` has concluded (success or failure).
    ToolCallFinish {
        text: String,
        #[serde(rename = "processId")]
        process_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    /// Failure notice. The server closes the stream after sending one.
    Error { message: String },
}

impl StreamEvent {
    pub fn stage_chunk(
        stage_id: impl Into<String>,
        process_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::StageOutputChunk {
            text: text.into(),
            stage_id: stage_id.into(),
            process_id: process_id.into(),
        }
    }

    pub fn tool_start(
        tool_name: impl Into<String>,
        process_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::ToolCallStart {
            text: text.into(),
            process_id: process_id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_finish(
        tool_name: impl Into<String>,
        process_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::ToolCallFinish {
            text: text.into(),
            process_id: process_id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StageOutputChunk { .. } => "stage-output-chunk",
            Self::ToolCallStart { .. } => "tool-call-start",
            Self::ToolCallFinish { .. } => "tool-call-finish",
            Self::Error { .. } => "error",
        }
    }

    /// Process identity carried by the event, if any.
    pub fn process_id(&self) -> Option<&str> {
        match self {
            Self::StageOutputChunk { process_id, .. }
            | Self::ToolCallStart { process_id, .. }
            | Self::ToolCallFinish { process_id, .. } => Some(process_id),
            Self::Error { .. } => None,
        }
    }
}
