/// Errors raised while encoding or decoding wire lines.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The event could not be serialized.
    #[error("failed to encode stream event: {0}")]
    Encode(#[source] serde_json::Error),
    /// A complete line was not a valid stream event.
    #[error("invalid stream line ({preview}): {source}")]
    Decode {
        /// First characters of the offending line.
        preview: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A value did not match its schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: expected {expected}, found {found}")]
pub struct SchemaError {
    /// JSON-pointer-like location of the mismatch (`$` is the root).
    pub path: String,
    pub expected: String,
    pub found: String,
}

impl SchemaError {
    pub(crate) fn new(path: &str, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Returns at most `max` characters of `text`, marking truncation with `…`.
pub fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().nth(max).is_some() {
        out.push('…');
    }
    out
}
