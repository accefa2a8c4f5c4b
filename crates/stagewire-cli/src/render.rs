//! Plain-text rendering of counselor records.

use std::fmt::Write as _;

use serde_json::Value;
use stagewire_client::{CounselorProcess, ProcessKind, ProcessRecord};

type Record = ProcessRecord<CounselorProcess>;

/// One-line progress note for stderr.
pub fn status_line(record: &Record) -> String {
    match record.kind {
        CounselorProcess::WebSearch => {
            let query = str_at(&record.data, "query").unwrap_or("…");
            match record.in_progress() {
                Some(false) => format!("[search] done: {query}"),
                _ => format!("[search] searching: {query}"),
            }
        }
        CounselorProcess::UserMessage => "[you] message sent".to_string(),
        kind => format!("[{}] streaming", kind.as_str()),
    }
}

pub fn render_record(record: &Record) -> String {
    let mut out = String::new();
    let data = &record.data;
    match record.kind {
        CounselorProcess::UserMessage => {
            let _ = writeln!(out, "> {}", str_at(data, "text").unwrap_or_default());
        }
        CounselorProcess::LearnerUnderstanding => {
            let _ = writeln!(out, "## Learner");
            let identity = data.pointer("/learnerProfile/identity");
            if let Some(name) = identity.and_then(|i| str_at(i, "name")) {
                let stage = identity.and_then(|i| str_at(i, "stage")).unwrap_or("?");
                let _ = writeln!(out, "{name} ({stage})");
            }
            bullets(&mut out, "Strengths", data.get("strengths"));
            bullets(&mut out, "Weaknesses", data.get("weakness"));
            bullets(&mut out, "Guardian signals", data.get("guardianSignals"));
            let queries: Vec<&str> = items(data.get("recommendedResearchQueries"))
                .filter_map(|q| str_at(q, "query"))
                .collect();
            if !queries.is_empty() {
                let _ = writeln!(out, "Research queries:");
                for query in queries {
                    let _ = writeln!(out, "  - {query}");
                }
            }
        }
        CounselorProcess::DeepResearch => {
            let _ = writeln!(out, "## Research");
            for result in items(data.get("searchResults")) {
                let title = str_at(result, "title").unwrap_or("(untitled)");
                let _ = writeln!(out, "- {title}");
                if let Some(url) = str_at(result, "url") {
                    let _ = writeln!(out, "  {url}");
                }
            }
            match data.get("error") {
                Some(Value::String(error)) => {
                    let _ = writeln!(out, "error: {error}");
                }
                Some(error @ Value::Object(_)) => {
                    let _ = writeln!(out, "error: {error}");
                }
                _ => {}
            }
        }
        CounselorProcess::AdvisorPlan => {
            let _ = writeln!(out, "## Plan");
            if let Some(response) = str_at(data, "response") {
                let _ = writeln!(out, "{response}");
            }
            for section in items(data.get("researchSynthesis")) {
                let _ = writeln!(out, "### {}", str_at(section, "headline").unwrap_or("…"));
                bullets(&mut out, "Key findings", section.get("keyFindings"));
                bullets(&mut out, "Implications", section.get("implications"));
                for reference in items(section.get("references")) {
                    let title = str_at(reference, "title").unwrap_or_default();
                    let url = str_at(reference, "url").unwrap_or_default();
                    let _ = writeln!(out, "  [{title}] {url}");
                }
            }
        }
        CounselorProcess::WebSearch => {
            let query = str_at(data, "query").unwrap_or_default();
            let state = if record.in_progress() == Some(false) {
                "done"
            } else {
                "in progress"
            };
            let _ = writeln!(out, "(web search: {query}, {state})");
        }
    }
    out
}

/// One JSON line per record for `--json` output.
pub fn record_json(record: &Record) -> serde_json::Result<String> {
    serde_json::to_string(record)
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .map(|a| a.as_slice())
        .unwrap_or_default()
        .iter()
}

fn bullets(out: &mut String, title: &str, value: Option<&Value>) {
    let entries: Vec<&str> = items(value).filter_map(Value::as_str).collect();
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}:");
    for entry in entries {
        let _ = writeln!(out, "  - {entry}");
    }
}
