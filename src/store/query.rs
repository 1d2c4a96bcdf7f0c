//! Live query objects.
//!
//! One `LiveQuery` per canonical descriptor string, shared by every
//! subscriber of that descriptor. Tracks the reference edges it has
//! dereferenced so target-node updates route back to the right parent, and
//! the query strings it holds open for those targets.

use std::collections::BTreeMap;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::core::{LexQuery, Node, Soul};

/// Subscription identity within one store.
pub type SubscriptionId = u64;

/// One delivery to a subscriber. `node` is `None` for "known absent"
/// (tombstone or an empty direct-query reply).
#[derive(Clone, Debug, PartialEq)]
pub struct QueryUpdate {
    pub soul: Soul,
    pub node: Option<Node>,
}

/// Query lifecycle. Terminal state is `Destroyed`; `off()` is the only way
/// there, entered directly or when the last listener detaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    Pending,
    /// Network ask issued, awaiting the first reply.
    Asked,
    Receiving,
    Destroyed,
}

struct QuerySender {
    id: SubscriptionId,
    sender: Sender<QueryUpdate>,
}

pub(crate) struct LiveQuery {
    options: LexQuery,
    state: QueryState,
    /// target soul -> originating (parent) soul for dereferenced edges
    targets: BTreeMap<Soul, Soul>,
    /// canonical strings of target-soul queries this query holds open
    target_queries: Vec<String>,
    subscribers: Vec<QuerySender>,
    /// phantom holds from parent/path queries keeping this query alive
    held: usize,
    ask_id: Option<String>,
}

impl LiveQuery {
    pub fn new(options: LexQuery) -> Self {
        Self {
            options,
            state: QueryState::Pending,
            targets: BTreeMap::new(),
            target_queries: Vec::new(),
            subscribers: Vec::new(),
            held: 0,
            ask_id: None,
        }
    }

    pub fn options(&self) -> &LexQuery {
        &self.options
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    pub fn matches(&self, soul: &Soul) -> bool {
        self.options.matches(soul)
    }

    /// Parent soul if `soul` is a tracked dereference target.
    pub fn target_parent(&self, soul: &Soul) -> Option<Soul> {
        self.targets.get(soul).cloned()
    }

    pub fn set_ref(&mut self, target: Soul, parent: Soul) {
        self.targets.insert(target, parent);
    }

    pub fn holds(&self, query_string: &str) -> bool {
        self.target_queries.iter().any(|qs| qs == query_string)
    }

    pub fn add_target_query(&mut self, query_string: String) {
        self.target_queries.push(query_string);
    }

    pub fn add_hold(&mut self) {
        self.held += 1;
    }

    pub fn release_hold(&mut self) {
        self.held = self.held.saturating_sub(1);
    }

    pub fn mark_asked(&mut self, ask_id: String) {
        if self.state == QueryState::Pending {
            self.state = QueryState::Asked;
            self.ask_id = Some(ask_id);
        }
    }

    pub fn subscribe(&mut self, id: SubscriptionId) -> Receiver<QueryUpdate> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(QuerySender { id, sender });
        receiver
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|sub| sub.id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.subscribers.len() + self.held
    }

    /// Publish to every subscriber, pruning any whose receiver is gone.
    pub fn receive(&mut self, soul: &Soul, node: Option<&Node>) {
        if self.state != QueryState::Destroyed {
            self.state = QueryState::Receiving;
        }
        let update = QueryUpdate {
            soul: soul.clone(),
            node: node.cloned(),
        };
        self.subscribers
            .retain(|sub| sub.sender.send(update.clone()).is_ok());
    }

    /// Deliver only to one subscriber (initial snapshot replay).
    pub fn send_to(&self, id: SubscriptionId, soul: &Soul, node: Option<&Node>) {
        if let Some(sub) = self.subscribers.iter().find(|sub| sub.id == id) {
            let _ = sub.sender.send(QueryUpdate {
                soul: soul.clone(),
                node: node.cloned(),
            });
        }
    }

    /// Tear down: release the network ask and every held target query.
    /// Returns what must be released by the registry. Idempotent.
    pub fn off(&mut self) -> (Option<String>, Vec<String>) {
        if self.state == QueryState::Destroyed {
            return (None, Vec::new());
        }
        self.state = QueryState::Destroyed;
        self.subscribers.clear();
        self.targets.clear();
        (self.ask_id.take(), std::mem::take(&mut self.target_queries))
    }
}
