//! Best-effort parsing of a JSON document that is still being written.
//!
//! [`PrefixRepair`] scans the text once, remembering the last offset at which
//! the prefix could be closed into a valid document together with the
//! closers needed to do so. The repaired candidate is `text[..cut] + closers`,
//! validated by `serde_json`. Object keys that are still being written and
//! dangling `:`/`,` never move the cut, so a partially typed key simply does
//! not appear yet.

use serde_json::{Number, Value};

/// Result of parsing accumulated text.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseState {
    /// Nothing to parse yet.
    NoMatch,
    /// A valid prefix that does not yet contain a value.
    Parsing,
    /// The text is a complete document.
    Successful(Value),
    /// The text was closed into a document; the value is a best-effort view.
    Repaired(Value),
    /// The text can never become valid JSON by appending more input.
    Malformed,
}

impl ParseState {
    /// The parsed value of the two parse states.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Successful(value) | Self::Repaired(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Successful(value) | Self::Repaired(value) => Some(value),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoMatch => "no-match",
            Self::Parsing => "parsing",
            Self::Successful(_) => "successful-parse",
            Self::Repaired(_) => "repaired-parse",
            Self::Malformed => "malformed",
        }
    }
}

/// Parses possibly incomplete JSON. Implementations must be pure.
pub trait RepairParser: Send + Sync {
    fn parse(&self, text: &str) -> ParseState;
}

/// Default [`RepairParser`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PrefixRepair;

impl RepairParser for PrefixRepair {
    fn parse(&self, text: &str) -> ParseState {
        if text.trim().is_empty() {
            return ParseState::NoMatch;
        }
        if let Ok(value) = serde_json::from_str(text) {
            return ParseState::Successful(value);
        }
        match close_prefix(text) {
            Err(Malformed) => ParseState::Malformed,
            Ok(None) => ParseState::Parsing,
            Ok(Some(repaired)) => match serde_json::from_str(&repaired) {
                Ok(value) => ParseState::Repaired(value),
                Err(_) => ParseState::Malformed,
            },
        }
    }
}

impl<F> RepairParser for F
where
    F: Fn(&str) -> ParseState + Send + Sync,
{
    fn parse(&self, text: &str) -> ParseState {
        self(text)
    }
}

#[derive(Debug)]
struct Malformed;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expect {
    Value,
    /// Right after `[`.
    ValueOrEnd,
    /// Right after `{`.
    KeyOrEnd,
    Key,
    Colon,
    CommaOrEnd,
    /// The top-level value is complete.
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StringRole {
    Key,
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Escape {
    None,
    Pending,
    Unicode { left: u8, code: u32 },
}

struct Cut {
    end: usize,
    closers: String,
}

struct Scanner<'a> {
    text: &'a str,
    stack: Vec<Container>,
    expect: Expect,
    string: Option<StringRole>,
    escape: Escape,
    high_surrogate: bool,
    literal_start: Option<usize>,
    cut: Option<Cut>,
}

fn close_prefix(text: &str) -> Result<Option<String>, Malformed> {
    let mut scanner = Scanner {
        text,
        stack: Vec::new(),
        expect: Expect::Value,
        string: None,
        escape: Escape::None,
        high_surrogate: false,
        literal_start: None,
        cut: None,
    };
    for (idx, ch) in text.char_indices() {
        scanner.step(idx, ch)?;
    }
    scanner.finish()
}

impl Scanner<'_> {
    fn step(&mut self, idx: usize, ch: char) -> Result<(), Malformed> {
        let end = idx + ch.len_utf8();
        if let Some(role) = self.string {
            return self.string_char(role, end, ch);
        }
        if let Some(start) = self.literal_start {
            if is_literal_char(ch) {
                return Ok(());
            }
            self.finish_literal(start, idx)?;
        }
        if matches!(ch, ' ' | '\t' | '\n' | '\r') {
            return Ok(());
        }
        match self.expect {
            Expect::Done => Err(Malformed),
            Expect::ValueOrEnd if ch == ']' => self.close(end),
            Expect::Value | Expect::ValueOrEnd => self.begin_value(idx, end, ch),
            Expect::KeyOrEnd | Expect::Key => match ch {
                '"' => {
                    self.string = Some(StringRole::Key);
                    Ok(())
                }
                '}' if self.expect == Expect::KeyOrEnd => self.close(end),
                _ => Err(Malformed),
            },
            Expect::Colon if ch == ':' => {
                self.expect = Expect::Value;
                Ok(())
            }
            Expect::Colon => Err(Malformed),
            Expect::CommaOrEnd => match (ch, self.stack.last()) {
                (',', Some(Container::Object)) => {
                    self.expect = Expect::Key;
                    Ok(())
                }
                (',', Some(Container::Array)) => {
                    self.expect = Expect::Value;
                    Ok(())
                }
                ('}', Some(Container::Object)) | (']', Some(Container::Array)) => self.close(end),
                _ => Err(Malformed),
            },
        }
    }

    fn begin_value(&mut self, idx: usize, end: usize, ch: char) -> Result<(), Malformed> {
        match ch {
            '{' => {
                self.stack.push(Container::Object);
                self.expect = Expect::KeyOrEnd;
                self.mark(end, false);
            }
            '[' => {
                self.stack.push(Container::Array);
                self.expect = Expect::ValueOrEnd;
                self.mark(end, false);
            }
            '"' => {
                self.string = Some(StringRole::Value);
                self.mark(end, true);
            }
            c if c == '-' || c.is_ascii_digit() || matches!(c, 't' | 'f' | 'n') => {
                self.literal_start = Some(idx);
            }
            _ => return Err(Malformed),
        }
        Ok(())
    }

    fn string_char(&mut self, role: StringRole, end: usize, ch: char) -> Result<(), Malformed> {
        match self.escape {
            Escape::None => match ch {
                '"' => {
                    self.string = None;
                    match role {
                        StringRole::Key => self.expect = Expect::Colon,
                        StringRole::Value => self.value_complete(end),
                    }
                }
                '\\' => self.escape = Escape::Pending,
                c if (c as u32) < 0x20 => return Err(Malformed),
                _ => {
                    if role == StringRole::Value && !self.high_surrogate {
                        self.mark(end, true);
                    }
                }
            },
            Escape::Pending => match ch {
                'u' => self.escape = Escape::Unicode { left: 4, code: 0 },
                '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => {
                    self.escape = Escape::None;
                    self.high_surrogate = false;
                    if role == StringRole::Value {
                        self.mark(end, true);
                    }
                }
                _ => return Err(Malformed),
            },
            Escape::Unicode { left, code } => {
                let digit = ch.to_digit(16).ok_or(Malformed)?;
                let code = code * 16 + digit;
                if left > 1 {
                    self.escape = Escape::Unicode {
                        left: left - 1,
                        code,
                    };
                } else {
                    self.escape = Escape::None;
                    // A lone high surrogate only parses once its low half arrives.
                    self.high_surrogate = (0xD800..0xDC00).contains(&code);
                    if role == StringRole::Value && !self.high_surrogate {
                        self.mark(end, true);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_literal(&mut self, start: usize, end: usize) -> Result<(), Malformed> {
        if !is_complete_literal(&self.text[start..end]) {
            return Err(Malformed);
        }
        self.literal_start = None;
        self.value_complete(end);
        Ok(())
    }

    fn close(&mut self, end: usize) -> Result<(), Malformed> {
        self.stack.pop().ok_or(Malformed)?;
        self.value_complete(end);
        Ok(())
    }

    fn value_complete(&mut self, end: usize) {
        self.expect = if self.stack.is_empty() {
            Expect::Done
        } else {
            Expect::CommaOrEnd
        };
        self.mark(end, false);
    }

    fn mark(&mut self, end: usize, in_string: bool) {
        self.cut = Some(Cut {
            end,
            closers: self.closers(in_string),
        });
    }

    fn closers(&self, in_string: bool) -> String {
        let mut closers = String::with_capacity(self.stack.len() + 1);
        if in_string {
            closers.push('"');
        }
        for container in self.stack.iter().rev() {
            closers.push(match container {
                Container::Object => '}',
                Container::Array => ']',
            });
        }
        closers
    }

    fn finish(mut self) -> Result<Option<String>, Malformed> {
        if let Some(start) = self.literal_start {
            let literal = &self.text[start..];
            if is_complete_literal(literal) {
                self.finish_literal(start, self.text.len())?;
            } else if let Some(completed) = complete_literal(literal)? {
                let mut repaired = String::with_capacity(self.text.len() + self.stack.len() + 4);
                repaired.push_str(&self.text[..start]);
                repaired.push_str(&completed);
                repaired.push_str(&self.closers(false));
                return Ok(Some(repaired));
            }
        }
        Ok(self.cut.map(|cut| {
            let mut repaired = String::with_capacity(cut.end + cut.closers.len());
            repaired.push_str(&self.text[..cut.end]);
            repaired.push_str(&cut.closers);
            repaired
        }))
    }
}

fn is_literal_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.')
}

fn is_complete_literal(literal: &str) -> bool {
    matches!(literal, "true" | "false" | "null") || serde_json::from_str::<Number>(literal).is_ok()
}

/// Completes a literal cut off by the end of input: keyword prefixes are
/// filled in, numbers are trimmed back to their longest valid prefix.
fn complete_literal(literal: &str) -> Result<Option<String>, Malformed> {
    if literal.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return ["true", "false", "null"]
            .into_iter()
            .find(|word| word.starts_with(literal))
            .map(|word| Some(word.to_string()))
            .ok_or(Malformed);
    }
    Ok((1..=literal.len())
        .rev()
        .map(|end| &literal[..end])
        .find(|candidate| serde_json::from_str::<Number>(candidate).is_ok())
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(text: &str) -> ParseState {
        PrefixRepair.parse(text)
    }

    #[test]
    fn complete_document_is_successful() {
        assert_eq!(parse(r#"{"a":1}"#), ParseState::Successful(json!({ "a": 1 })));
        assert_eq!(parse(" [1, 2] \n"), ParseState::Successful(json!([1, 2])));
    }

    #[test]
    fn empty_input_is_no_match() {
        assert_eq!(parse(""), ParseState::NoMatch);
        assert_eq!(parse("  \n"), ParseState::NoMatch);
    }

    #[test]
    fn open_string_value_is_closed() {
        assert_eq!(parse(r#"{"title":"A"#), ParseState::Repaired(json!({ "title": "A" })));
        assert_eq!(parse(r#"{"title":""#), ParseState::Repaired(json!({ "title": "" })));
    }

    #[test]
    fn partial_key_and_dangling_separators_are_dropped() {
        assert_eq!(parse("{"), ParseState::Repaired(json!({})));
        assert_eq!(parse(r#"{"ti"#), ParseState::Repaired(json!({})));
        assert_eq!(parse(r#"{"title""#), ParseState::Repaired(json!({})));
        assert_eq!(parse(r#"{"title":"#), ParseState::Repaired(json!({})));
        assert_eq!(parse(r#"{"a":1,"#), ParseState::Repaired(json!({ "a": 1 })));
        assert_eq!(parse(r#"{"a":1,"b"#), ParseState::Repaired(json!({ "a": 1 })));
    }

    #[test]
    fn nested_containers_are_closed_in_order() {
        assert_eq!(
            parse(r#"{"queries":[{"query":"robo"#),
            ParseState::Repaired(json!({ "queries": [{ "query": "robo" }] }))
        );
        assert_eq!(
            parse(r#"{"a":[1,[2,"#),
            ParseState::Repaired(json!({ "a": [1, [2]] }))
        );
        assert_eq!(parse(r#"{"a":{}"#), ParseState::Repaired(json!({ "a": {} })));
    }

    #[test]
    fn trailing_literals_are_completed() {
        assert_eq!(parse(r#"{"ok":tr"#), ParseState::Repaired(json!({ "ok": true })));
        assert_eq!(parse(r#"{"v":n"#), ParseState::Repaired(json!({ "v": null })));
        assert_eq!(parse(r#"{"n":12"#), ParseState::Repaired(json!({ "n": 12 })));
        assert_eq!(parse(r#"{"n":1.5e"#), ParseState::Repaired(json!({ "n": 1.5 })));
        assert_eq!(parse(r#"{"n":-"#), ParseState::Repaired(json!({})));
    }

    #[test]
    fn lone_sign_without_cut_is_still_parsing() {
        assert_eq!(parse("-"), ParseState::Parsing);
    }

    #[test]
    fn escapes_are_never_split() {
        assert_eq!(parse(r#"{"t":"a\"#), ParseState::Repaired(json!({ "t": "a" })));
        assert_eq!(parse(r#"{"t":"a\u00"#), ParseState::Repaired(json!({ "t": "a" })));
        assert_eq!(parse(r#"{"t":"aé"#), ParseState::Repaired(json!({ "t": "aé" })));
        assert_eq!(parse(r#"{"t":"a\ud83d"#), ParseState::Repaired(json!({ "t": "a" })));
        assert_eq!(
            parse(r#"{"t":"a😀"#),
            ParseState::Repaired(json!({ "t": "a😀" }))
        );
    }

    #[test]
    fn multibyte_text_is_kept_whole() {
        assert_eq!(
            parse(r#"{"name":"学習"#),
            ParseState::Repaired(json!({ "name": "学習" }))
        );
    }

    #[test]
    fn impossible_prefixes_are_malformed() {
        assert_eq!(parse("not json"), ParseState::Malformed);
        assert_eq!(parse(r#"{"a":1}}"#), ParseState::Malformed);
        assert_eq!(parse(r#"{"a" 1"#), ParseState::Malformed);
        assert_eq!(parse(r#"{"a":tx"#), ParseState::Malformed);
        assert_eq!(parse(r#"{"a":tru,"#), ParseState::Malformed);
        assert_eq!(parse(r#"{,"#), ParseState::Malformed);
        assert_eq!(parse("{\"a\":\"x\ny\""), ParseState::Malformed);
    }

    #[test]
    fn growth_never_errors_between_fragments() {
        let full = r#"{"title":"ABC","tags":["x","y"],"done":false}"#;
        let mut last = None;
        for end in 1..=full.len() {
            let state = parse(&full[..end]);
            assert!(
                matches!(state, ParseState::Successful(_) | ParseState::Repaired(_)),
                "prefix {:?} gave {}",
                &full[..end],
                state.name()
            );
            last = state.into_value();
        }
        assert_eq!(
            last,
            Some(json!({ "title": "ABC", "tags": ["x", "y"], "done": false }))
        );
    }

    #[test]
    fn closures_are_parsers() {
        let always_pending = |_: &str| ParseState::Parsing;
        assert_eq!(always_pending.parse("{}"), ParseState::Parsing);
    }
}
