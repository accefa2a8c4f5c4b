use serde::{Serialize, Serializer};
use serde_json::Value;
use stagewire_core::Schema;
use stagewire_core::counselor::{
    ADVISOR_RESPONSE, DEEP_RESEARCH_RESULT, GATHER_LEARNER_UNDERSTANDING,
    LEARNER_UNDERSTANDING, PERFORM_DEEP_RESEARCH, SYNTHESIZE_ADVISOR_PLAN, USER_MESSAGE,
    WEB_SEARCH, WEB_SEARCH_CALL,
};

/// Closed set of process kinds a client knows how to render.
///
/// Implementations are expected to be fieldless enums so renderers can match
/// them exhaustively.
pub trait ProcessKind: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    fn from_stage_id(stage_id: &str) -> Option<Self>;
    fn from_tool_name(tool_name: &str) -> Option<Self>;
    /// Kind of the pseudo-process holding the user's own message.
    fn user_message() -> Self;
    /// Full schema of the kind's data; updates are validated against it in
    /// deep-partial mode.
    fn schema(&self) -> &'static Schema;
    fn as_str(&self) -> &'static str;
}

/// Process kinds of the counselor pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounselorProcess {
    LearnerUnderstanding,
    DeepResearch,
    AdvisorPlan,
    WebSearch,
    UserMessage,
}

impl ProcessKind for CounselorProcess {
    fn from_stage_id(stage_id: &str) -> Option<Self> {
        match stage_id {
            GATHER_LEARNER_UNDERSTANDING => Some(Self::LearnerUnderstanding),
            PERFORM_DEEP_RESEARCH => Some(Self::DeepResearch),
            SYNTHESIZE_ADVISOR_PLAN => Some(Self::AdvisorPlan),
            _ => None,
        }
    }

    fn from_tool_name(tool_name: &str) -> Option<Self> {
        (tool_name == WEB_SEARCH).then_some(Self::WebSearch)
    }

    fn user_message() -> Self {
        Self::UserMessage
    }

    fn schema(&self) -> &'static Schema {
        match self {
            Self::LearnerUnderstanding => &*LEARNER_UNDERSTANDING,
            Self::DeepResearch => &*DEEP_RESEARCH_RESULT,
            Self::AdvisorPlan => &*ADVISOR_RESPONSE,
            Self::WebSearch => &*WEB_SEARCH_CALL,
            Self::UserMessage => &*USER_MESSAGE,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::LearnerUnderstanding => GATHER_LEARNER_UNDERSTANDING,
            Self::DeepResearch => PERFORM_DEEP_RESEARCH,
            Self::AdvisorPlan => SYNTHESIZE_ADVISOR_PLAN,
            Self::WebSearch => WEB_SEARCH,
            Self::UserMessage => "user-message",
        }
    }
}

/// One rendered unit: a stage generation, a tool invocation or a user message.
///
/// Serializes as `{"kind", "processId", "data"}` with the kind's wire name.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", bound(serialize = "K: ProcessKind"))]
pub struct ProcessRecord<K> {
    #[serde(serialize_with = "serialize_kind")]
    pub kind: K,
    pub process_id: String,
    /// Deep-partial, schema-normalized object.
    pub data: Value,
}

impl<K: ProcessKind> ProcessRecord<K> {
    pub fn new(kind: K, process_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            process_id: process_id.into(),
            data,
        }
    }

    /// `inProgress` flag of tool records; `None` for other kinds.
    pub fn in_progress(&self) -> Option<bool> {
        self.data.get("inProgress").and_then(Value::as_bool)
    }
}

fn serialize_kind<K, S>(kind: &K, serializer: S) -> Result<S::Ok, S::Error>
where
    K: ProcessKind,
    S: Serializer,
{
    serializer.serialize_str(kind.as_str())
}
