mod common;

use common::{TestKind, wire};
use pretty_assertions::assert_eq;
use serde_json::json;
use stagewire_client::{Conversation, CounselorProcess, Diagnostic, ProcessRecord, ResponseSummary};
use stagewire_core::StreamEvent;

fn reconcile(bytes: &[u8], chunk_size: usize) -> (Vec<ProcessRecord<TestKind>>, ResponseSummary) {
    let mut conversation = Conversation::<TestKind>::new();
    let mut response = conversation.begin_response();
    for chunk in bytes.chunks(chunk_size) {
        response.push_chunk(chunk);
    }
    let summary = response.finish();
    (
        conversation.records().iter().map(|r| (**r).clone()).collect(),
        summary,
    )
}

fn stage_then_tool() -> Vec<StreamEvent> {
    vec![
        StreamEvent::stage_chunk("S1", "p1", r#"{"a":1}"#),
        StreamEvent::tool_start("web-search", "t1", r#"{"query":"x"}"#),
        StreamEvent::tool_finish("web-search", "t1", r#"{"query":"x","result":"ok"}"#),
    ]
}

#[test]
fn stage_and_tool_events_yield_two_ordered_records() {
    let (records, summary) = reconcile(&wire(&stage_then_tool()), 4096);
    assert!(summary.diagnostics.is_empty());
    assert_eq!(
        records,
        vec![
            ProcessRecord::new(TestKind::Stage, "p1", json!({ "a": 1 })),
            ProcessRecord::new(
                TestKind::Search,
                "t1",
                json!({ "query": "x", "result": "ok", "inProgress": false }),
            ),
        ]
    );
}

#[test]
fn error_event_is_a_diagnostic_and_leaves_records_alone() {
    let before = vec![StreamEvent::stage_chunk("S1", "p1", r#"{"a":1}"#)];
    let mut with_error = before.clone();
    with_error.push(StreamEvent::error("boom"));

    let (expected, _) = reconcile(&wire(&before), 4096);
    let (records, summary) = reconcile(&wire(&with_error), 4096);
    assert_eq!(records, expected);
    assert_eq!(summary.diagnostics, vec![Diagnostic::Pipeline("boom".into())]);
    assert_eq!(summary.pipeline_error(), Some("boom"));
}

#[test]
fn replaying_the_same_events_gives_the_same_registry() {
    let bytes = wire(&stage_then_tool());
    assert_eq!(reconcile(&bytes, 4096).0, reconcile(&bytes, 4096).0);
}

#[test]
fn result_does_not_depend_on_transport_chunking() {
    let bytes = wire(&stage_then_tool());
    let (expected, _) = reconcile(&bytes, bytes.len());
    for size in 1..=bytes.len() {
        let (records, summary) = reconcile(&bytes, size);
        assert_eq!(records, expected, "chunk size {size}");
        assert!(summary.diagnostics.is_empty(), "chunk size {size}");
    }
}

#[test]
fn malformed_line_between_valid_lines_is_skipped() {
    let events = stage_then_tool();
    let clean = wire(&events);
    let mut dirty = wire(&events[..1]);
    dirty.extend_from_slice(b"oops, not json\n");
    dirty.extend(wire(&events[1..]));

    let (expected, _) = reconcile(&clean, 4096);
    let (records, summary) = reconcile(&dirty, 4096);
    assert_eq!(records, expected);
    assert_eq!(summary.diagnostics.len(), 1);
    assert!(matches!(summary.diagnostics[0], Diagnostic::MalformedLine(_)));
}

#[test]
fn partial_json_grows_into_one_record() {
    let mut conversation = Conversation::<TestKind>::new();
    let mut response = conversation.begin_response();
    response.apply(StreamEvent::stage_chunk("S1", "p1", r#"{"title":"A"#));
    assert!(response.diagnostics().is_empty());
    response.apply(StreamEvent::stage_chunk("S1", "p1", r#"BC"}"#));
    let summary = response.finish();

    assert!(summary.diagnostics.is_empty());
    assert_eq!(summary.upserts, 2);
    assert_eq!(conversation.records().len(), 1);
    assert_eq!(
        *conversation.records()[0],
        ProcessRecord::new(TestKind::Stage, "p1", json!({ "title": "ABC" }))
    );
}

#[test]
fn character_by_character_stream_never_duplicates_a_process() {
    let document = r#"{"headline":"Plan","items":[{"n":1},{"n":2}],"done":true}"#;
    let events: Vec<_> = document
        .chars()
        .map(|c| StreamEvent::stage_chunk("S1", "p1", c.to_string()))
        .collect();
    let (records, summary) = reconcile(&wire(&events), 64);
    assert!(summary.diagnostics.is_empty(), "{:?}", summary.diagnostics);
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].data,
        json!({ "headline": "Plan", "items": [{ "n": 1 }, { "n": 2 }], "done": true })
    );
}

#[test]
fn interleaved_processes_keep_first_appearance_order() {
    let events = vec![
        StreamEvent::stage_chunk("S1", "p2", r#"{"b":"#),
        StreamEvent::stage_chunk("S1", "p1", r#"{"a":1}"#),
        StreamEvent::tool_start("web-search", "t1", r#"{"query":"q"}"#),
        StreamEvent::stage_chunk("S1", "p2", r#"2}"#),
        StreamEvent::tool_finish("web-search", "t1", r#"{"query":"q"}"#),
    ];
    let (records, _) = reconcile(&wire(&events), 4096);
    let ids: Vec<_> = records.iter().map(|r| r.process_id.as_str()).collect();
    assert_eq!(ids, vec!["p2", "p1", "t1"]);
    assert_eq!(records[0].data, json!({ "b": 2 }));
    assert_eq!(records[2].in_progress(), Some(false));
}

#[test]
fn records_persist_across_responses_until_cleared() {
    let mut conversation = Conversation::<TestKind>::new();
    conversation.submit("first question");

    let mut response = conversation.begin_response();
    response.push_chunk(&wire(&stage_then_tool()));
    response.finish();
    assert_eq!(conversation.records().len(), 3);
    assert_eq!(conversation.records()[0].kind, TestKind::User);

    let mut response = conversation.begin_response();
    response.push_chunk(&wire(&[StreamEvent::stage_chunk("S1", "p9", "{}")]));
    response.finish();
    assert_eq!(conversation.records().len(), 4);

    conversation.clear();
    assert!(conversation.records().is_empty());
}

#[test]
fn schema_rejected_update_keeps_the_earlier_record() {
    let stage = stagewire_core::counselor::GATHER_LEARNER_UNDERSTANDING;
    let mut conversation = Conversation::<CounselorProcess>::new();
    let snapshots = conversation.subscribe();
    let mut response = conversation.begin_response();

    response.apply(StreamEvent::stage_chunk(
        stage,
        "p1",
        r#"{"learnerProfile":{"identity":{"name":"Ada""#,
    ));
    assert!(response.diagnostics().is_empty());
    let accepted = json!({ "learnerProfile": { "identity": { "name": "Ada" } } });
    assert_eq!(snapshots.borrow()[0].data, accepted);

    // `stage` must be a string.
    assert_eq!(
        response.apply(StreamEvent::stage_chunk(stage, "p1", r#","stage":5}}"#)),
        None
    );
    let summary = response.finish();

    assert_eq!(summary.upserts, 1);
    assert_eq!(summary.diagnostics.len(), 1);
    assert!(matches!(
        &summary.diagnostics[0],
        Diagnostic::SchemaRejected { process_id, .. } if process_id == "p1"
    ));
    let snapshot = snapshots.borrow();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        *snapshot[0],
        ProcessRecord::new(CounselorProcess::LearnerUnderstanding, "p1", accepted)
    );
}
