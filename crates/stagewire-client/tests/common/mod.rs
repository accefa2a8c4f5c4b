#![allow(dead_code)]

use once_cell::sync::Lazy;
use stagewire_client::ProcessKind;
use stagewire_core::counselor::{USER_MESSAGE, WEB_SEARCH, WEB_SEARCH_CALL};
use stagewire_core::{Field, Schema, StreamEvent, encode_line};

static OPEN_OBJECT: Lazy<Schema> = Lazy::new(|| Schema::object(Vec::<Field>::new()).passthrough());

/// Kind set with one free-form stage `S1`, the web search tool and the user
/// message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestKind {
    Stage,
    Search,
    User,
}

impl ProcessKind for TestKind {
    fn from_stage_id(stage_id: &str) -> Option<Self> {
        (stage_id == "S1").then_some(Self::Stage)
    }

    fn from_tool_name(tool_name: &str) -> Option<Self> {
        (tool_name == WEB_SEARCH).then_some(Self::Search)
    }

    fn user_message() -> Self {
        Self::User
    }

    fn schema(&self) -> &'static Schema {
        match self {
            Self::Stage => &*OPEN_OBJECT,
            Self::Search => &*WEB_SEARCH_CALL,
            Self::User => &*USER_MESSAGE,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Stage => "S1",
            Self::Search => WEB_SEARCH,
            Self::User => "user-message",
        }
    }
}

pub fn wire(events: &[StreamEvent]) -> Vec<u8> {
    events
        .iter()
        .flat_map(|event| encode_line(event).expect("encode").into_bytes())
        .collect()
}
