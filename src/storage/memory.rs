//! In-memory reference backend.
//!
//! `BTreeMap` keeps souls in byte order, which is exactly the order the
//! list contract requires. `put_if` is a real compare-and-swap, so the
//! patch loop gets genuine conflict detection here.

use std::collections::BTreeMap;

use crate::core::{GraphData, ListOptions, Node, Soul};

use super::{PutOutcome, Storage, StorageError};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// `None` entries are persisted tombstones - known-deleted, kept so a
    /// deletion survives restarts of the layer above.
    map: BTreeMap<Soul, Option<Node>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, soul: &Soul) -> Result<Option<Node>, StorageError> {
        Ok(self.map.get(soul).cloned().flatten())
    }

    fn list(&self, options: &ListOptions) -> Result<GraphData, StorageError> {
        let mut keys: Vec<&Soul> = self
            .map
            .keys()
            .filter(|soul| options.matches(soul.as_str()))
            .collect();
        if options.reverse {
            keys.reverse();
        }
        if let Some(limit) = options.limit {
            keys.truncate(limit);
        }

        let mut result = GraphData::new();
        for key in keys {
            result.insert(key.clone(), self.map.get(key).cloned().flatten());
        }
        Ok(result)
    }

    fn put(&mut self, soul: &Soul, node: Option<Node>) -> Result<(), StorageError> {
        self.map.insert(soul.clone(), node);
        Ok(())
    }

    fn put_if(
        &mut self,
        soul: &Soul,
        expected: Option<&Node>,
        node: Option<Node>,
    ) -> Result<PutOutcome, StorageError> {
        let current = self.map.get(soul).and_then(|entry| entry.as_ref());
        if current != expected {
            return Ok(PutOutcome::Conflict);
        }
        self.map.insert(soul.clone(), node);
        Ok(PutOutcome::Written)
    }
}
