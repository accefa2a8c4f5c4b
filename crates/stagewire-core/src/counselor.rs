//! Stage catalogue of the counselor pipeline: stage ids, tool names and the
//! output schema each one streams.

use once_cell::sync::Lazy;

use crate::schema::{Field, Schema};

pub const GATHER_LEARNER_UNDERSTANDING: &str = "gather-learner-understanding";
pub const PERFORM_DEEP_RESEARCH: &str = "perform-deep-research";
pub const SYNTHESIZE_ADVISOR_PLAN: &str = "synthesize-advisor-plan";

/// Wire name of the web search tool.
pub const WEB_SEARCH: &str = "web-search";

/// Stage ids in pipeline order.
pub const STAGES: [&str; 3] = [
    GATHER_LEARNER_UNDERSTANDING,
    PERFORM_DEEP_RESEARCH,
    SYNTHESIZE_ADVISOR_PLAN,
];

/// Upper bound on search results a research stage may report.
pub const MAX_SEARCH_RESULTS: usize = 5;

pub static LEARNER_UNDERSTANDING: Lazy<Schema> = Lazy::new(|| {
    Schema::object([
        Field::required(
            "learnerProfile",
            Schema::object([Field::required(
                "identity",
                Schema::object([
                    Field::required("name", Schema::String),
                    Field::required("stage", Schema::String),
                ]),
            )]),
        ),
        Field::required("weakness", Schema::strings()),
        Field::required("strengths", Schema::strings()),
        Field::required("guardianSignals", Schema::strings()),
        Field::required(
            "recommendedResearchQueries",
            Schema::array(Schema::object([
                Field::required("query", Schema::String),
                Field::required("rationale", Schema::String),
                Field::required("focusArea", Schema::String),
            ]))
            .min_items(1),
        ),
    ])
});

pub static DEEP_RESEARCH_RESULT: Lazy<Schema> = Lazy::new(|| {
    Schema::object([
        Field::required(
            "searchResults",
            Schema::array(Schema::object([
                Field::required("title", Schema::String),
                Field::required("url", Schema::String),
                Field::required("content", Schema::String),
            ]))
            .max_items(MAX_SEARCH_RESULTS),
        ),
        Field::optional(
            "error",
            Schema::Union(vec![
                Schema::String,
                Schema::object(Vec::<Field>::new()).passthrough(),
            ]),
        ),
    ])
});

pub static ADVISOR_RESPONSE: Lazy<Schema> = Lazy::new(|| {
    Schema::object([
        Field::optional("response", Schema::String),
        Field::required(
            "researchSynthesis",
            Schema::array(Schema::object([
                Field::required("query", Schema::String),
                Field::required("headline", Schema::String),
                Field::required("keyFindings", Schema::strings()),
                Field::required("implications", Schema::strings()),
                Field::required(
                    "references",
                    Schema::array(Schema::object([
                        Field::required("title", Schema::String),
                        Field::required("url", Schema::String),
                        Field::required("note", Schema::String),
                    ])),
                ),
            ])),
        ),
    ])
});

/// Arguments of a web search call plus the in-flight flag the client injects.
pub static WEB_SEARCH_CALL: Lazy<Schema> = Lazy::new(|| {
    Schema::object([
        Field::required("query", Schema::String),
        Field::required("inProgress", Schema::Boolean),
        Field::optional("result", Schema::Any),
    ])
});

pub static USER_MESSAGE: Lazy<Schema> =
    Lazy::new(|| Schema::object([Field::required("text", Schema::String)]));

/// Output schema of a stage id, if the stage is part of the pipeline.
pub fn stage_schema(stage_id: &str) -> Option<&'static Schema> {
    match stage_id {
        GATHER_LEARNER_UNDERSTANDING => Some(&*LEARNER_UNDERSTANDING),
        PERFORM_DEEP_RESEARCH => Some(&*DEEP_RESEARCH_RESULT),
        SYNTHESIZE_ADVISOR_PLAN => Some(&*ADVISOR_RESPONSE),
        _ => None,
    }
}
