//! Graph adapter over a raw key/record store.
//!
//! Multi-soul puts are made to appear atomic per soul (not globally) and
//! convergent under concurrent writers: each soul runs a read-diff-merge-
//! write loop that retries from the read whenever the backing store reports
//! a conflict. The loop is capped; past the cap the error surfaces instead
//! of livelocking.

use tracing::warn;

use crate::config::AdapterConfig;
use crate::core::{diff, merge_graph, DiffOptions, GraphData, LexQuery, MergeMode, Node, Soul};
use crate::wire::Originators;

use super::{AdapterError, GraphAdapter, PutOutcome, Storage, StorageError};

pub struct GraphStorageAdapter<S: Storage> {
    storage: S,
    config: AdapterConfig,
}

impl<S: Storage> GraphStorageAdapter<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, AdapterConfig::default())
    }

    pub fn with_config(storage: S, config: AdapterConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn assert_entry(&self, soul: &Soul, node: Option<&Node>) -> Result<(), StorageError> {
        let key_size = soul.as_str().len();
        if key_size > self.config.max_key_size {
            return Err(StorageError::KeyTooLarge {
                soul: soul.to_string(),
                size: key_size,
                max: self.config.max_key_size,
            });
        }
        if let Some(node) = node {
            let size = serde_json::to_vec(node)
                .map(|bytes| bytes.len())
                .unwrap_or(usize::MAX);
            if size > self.config.max_value_size {
                return Err(StorageError::ValueTooLarge {
                    soul: soul.to_string(),
                    size,
                    max: self.config.max_value_size,
                });
            }
        }
        Ok(())
    }

    /// Reconcile one incoming soul against persisted state.
    ///
    /// Returns the per-soul diff that was actually written, or `None` when
    /// persisted state already covered the incoming node.
    fn patch_soul(
        &mut self,
        soul: &Soul,
        incoming: &Option<Node>,
    ) -> Result<Option<Option<Node>>, StorageError> {
        let mut incoming_graph = GraphData::new();
        incoming_graph.insert(soul.clone(), incoming.clone());

        for attempt in 1..=self.config.max_patch_retries {
            let existing = self.storage.get(soul)?;
            let mut existing_graph = GraphData::new();
            // the key is always present: a missing record reads as a known
            // null, so an incoming tombstone is never re-written
            existing_graph.insert(soul.clone(), existing.clone());

            let Some(mut node_diff) =
                diff(&incoming_graph, &existing_graph, &DiffOptions::default())
            else {
                return Ok(None);
            };

            merge_graph(&mut existing_graph, &node_diff, MergeMode::InPlace);
            let to_write = existing_graph.remove(soul).flatten();
            self.assert_entry(soul, to_write.as_ref())?;

            match self.storage.put_if(soul, existing.as_ref(), to_write)? {
                PutOutcome::Written => return Ok(node_diff.remove(soul)),
                PutOutcome::Conflict => {
                    warn!(soul = %soul, attempt, "unsuccessful patch, retrying");
                }
            }
        }

        Err(StorageError::RetriesExhausted {
            soul: soul.to_string(),
            attempts: self.config.max_patch_retries,
        })
    }
}

impl<S: Storage> GraphAdapter for GraphStorageAdapter<S> {
    fn get(&mut self, query: &LexQuery) -> Result<GraphData, AdapterError> {
        if let Some(list) = query.list_options() {
            if let Some(0) = list.limit {
                return Err(StorageError::InvalidLimit { limit: 0 }.into());
            }
            let mut window = list;
            // a bounded scan needs one extra record so continuation from the
            // exclusive boundary does not drop a row
            if window.start.is_some() {
                if let Some(limit) = window.limit {
                    window.limit = Some(limit + 1);
                }
            }
            return Ok(self.storage.list(&window)?);
        }

        let mut result = GraphData::new();
        if let Some(soul) = &query.soul {
            if let Some(node) = self.storage.get(soul)? {
                result.insert(soul.clone(), Some(node));
            }
        }
        Ok(result)
    }

    fn put(
        &mut self,
        graph: &GraphData,
        _originators: Option<&Originators>,
    ) -> Result<Option<GraphData>, AdapterError> {
        // souls are independent: one soul's merge never blocks another's
        let mut union = GraphData::new();
        for (soul, node) in graph {
            if let Some(node_diff) = self.patch_soul(soul, node)? {
                union.insert(soul.clone(), node_diff);
            }
        }
        Ok(if union.is_empty() { None } else { Some(union) })
    }
}
