use std::collections::HashMap;

/// Append-only text buffers, one per (stage id, process id).
#[derive(Debug, Default)]
pub struct Accumulator {
    buffers: HashMap<(String, String), String>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and returns the whole accumulated value.
    pub fn append(&mut self, stage_id: &str, process_id: &str, text: &str) -> &str {
        let buffer = self
            .buffers
            .entry((stage_id.to_string(), process_id.to_string()))
            .or_default();
        buffer.push_str(text);
        buffer
    }

    pub fn get(&self, stage_id: &str, process_id: &str) -> Option<&str> {
        self.buffers
            .get(&(stage_id.to_string(), process_id.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
