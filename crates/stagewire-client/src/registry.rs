//! Ordered process records with upsert-by-identity.
//!
//! The registry is a plain vector: order is first appearance, and an update
//! replaces its record in place. Lookups scan from the end because the
//! process being updated is almost always one of the most recent. Records
//! are shared behind `Arc`, so a snapshot copies pointers and an upsert
//! swaps one of them.

use std::sync::Arc;

use crate::process::ProcessRecord;

/// Where an upsert landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Replaced(usize),
    Appended(usize),
}

impl Upsert {
    pub fn index(self) -> usize {
        match self {
            Self::Replaced(idx) | Self::Appended(idx) => idx,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessRegistry<K> {
    records: Vec<Arc<ProcessRecord<K>>>,
}

impl<K> Default for ProcessRegistry<K> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<K: Clone> ProcessRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the last record with the same process id, or appends.
    pub fn upsert(&mut self, record: ProcessRecord<K>) -> Upsert {
        match self
            .records
            .iter()
            .rposition(|existing| existing.process_id == record.process_id)
        {
            Some(idx) => {
                self.records[idx] = Arc::new(record);
                Upsert::Replaced(idx)
            }
            None => {
                self.records.push(Arc::new(record));
                Upsert::Appended(self.records.len() - 1)
            }
        }
    }

    pub fn records(&self) -> &[Arc<ProcessRecord<K>>] {
        &self.records
    }

    pub fn get(&self, process_id: &str) -> Option<&ProcessRecord<K>> {
        self.records
            .iter()
            .rev()
            .find(|record| record.process_id == process_id)
            .map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Immutable view of the current records.
    pub fn snapshot(&self) -> Arc<[Arc<ProcessRecord<K>>]> {
        Arc::from(self.records.as_slice())
    }
}
