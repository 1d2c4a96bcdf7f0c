//! The graph store.
//!
//! Owns the authoritative in-memory snapshot, runs the read/write
//! middleware chains around every mutation, and dispatches live updates to
//! subscribed queries - including one-hop reference resolution.
//!
//! INVARIANT: the snapshot is mutated only inside `receive_graph_data`'s
//! merge step; every other code path treats it as read-only.

use std::collections::VecDeque;

use crossbeam::channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::config::StoreConfig;
use crate::core::{
    add_missing_state, merge_node, now_millis, select_nodes, CoreError, GraphData, LexQuery,
    MergeMode, Node, Soul,
};
use crate::error::Transience;
use crate::wire::{message_id, Message};

use super::connector::Connector;
use super::middleware::{MiddlewareError, MiddlewareFn, MiddlewareKind, MiddlewareToken, PutOptions};
use super::path::{flatten_value, path_data, PathValue};
use super::query::{LiveQuery, QueryState, QueryUpdate, SubscriptionId};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
}

impl StoreError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }
}

/// Acknowledgment of a put. Exactly one receipt or error per call.
///
/// `diff` is the data that survived the write-middleware chain and was
/// merged; `None` means a stage vetoed the put or nothing changed (silent
/// no-op downstream). `msg_id` cancels related network listeners via
/// [`GraphStore::off`].
#[derive(Clone, Debug)]
pub struct PutReceipt {
    pub msg_id: String,
    pub diff: Option<GraphData>,
}

/// Store-level event, for "wait for first reply" consumers and logging.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    GraphData {
        diff: GraphData,
        id: Option<String>,
        reply_to: Option<String>,
    },
    Put {
        msg_id: String,
        diff: GraphData,
    },
    ConnectorConnected {
        name: String,
    },
    ConnectorDisconnected {
        name: String,
    },
}

/// Handle for one live-query subscription. Drain `updates()` to observe
/// deliveries; pass back to [`GraphStore::unlisten`] to detach.
pub struct QuerySubscription {
    pub(crate) id: SubscriptionId,
    pub(crate) query_string: String,
    receiver: Receiver<QueryUpdate>,
}

impl QuerySubscription {
    pub fn updates(&self) -> &Receiver<QueryUpdate> {
        &self.receiver
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }
}

/// One delivery from a path query: the final path key and its value.
#[derive(Clone, Debug)]
pub struct PathUpdate {
    pub key: String,
    pub value: Option<PathValue>,
}

/// Handle for one path subscription.
pub struct PathSubscription {
    pub(crate) id: SubscriptionId,
    receiver: Receiver<PathUpdate>,
}

impl PathSubscription {
    pub fn updates(&self) -> &Receiver<PathUpdate> {
        &self.receiver
    }
}

struct PathQueryState {
    id: SubscriptionId,
    keys: Vec<String>,
    /// every soul this path has subscribed so far (holds on soul queries)
    holds: Vec<String>,
    souls: Vec<Soul>,
    last_value: Option<PathValue>,
    /// "complete but empty" is reported once, not on every merge
    reported: bool,
    sender: Sender<PathUpdate>,
}

pub struct GraphStore {
    id: String,
    config: StoreConfig,
    graph: GraphData,
    read_middleware: Vec<(u64, MiddlewareFn)>,
    write_middleware: Vec<(u64, MiddlewareFn)>,
    /// Insertion-ordered: dispatch order is part of the contract.
    queries: IndexMap<String, LiveQuery>,
    path_queries: Vec<PathQueryState>,
    connectors: Vec<Box<dyn Connector>>,
    active_connectors: usize,
    event_taps: Vec<Sender<StoreEvent>>,
    pending_inbound: VecDeque<Message>,
    draining: bool,
    next_sub_id: SubscriptionId,
    next_middleware_id: u64,
}

impl GraphStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            id: message_id(),
            config,
            graph: GraphData::new(),
            read_middleware: Vec::new(),
            write_middleware: Vec::new(),
            queries: IndexMap::new(),
            path_queries: Vec::new(),
            connectors: Vec::new(),
            active_connectors: 0,
            event_taps: Vec::new(),
            pending_inbound: VecDeque::new(),
            draining: false,
            next_sub_id: 0,
            next_middleware_id: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read-only view of the authoritative snapshot.
    pub fn graph(&self) -> &GraphData {
        &self.graph
    }

    // =========================================================================
    // Connectors
    // =========================================================================

    pub fn connect(&mut self, connector: Box<dyn Connector>) {
        if connector.is_connected() {
            self.active_connectors += 1;
            let name = connector.name().to_string();
            self.emit(StoreEvent::ConnectorConnected { name });
        }
        self.connectors.push(connector);
    }

    pub fn disconnect(&mut self, name: &str) {
        let Some(index) = self.connectors.iter().position(|c| c.name() == name) else {
            return;
        };
        let connector = self.connectors.remove(index);
        if connector.is_connected() {
            self.active_connectors = self.active_connectors.saturating_sub(1);
            self.emit(StoreEvent::ConnectorDisconnected {
                name: name.to_string(),
            });
        }
    }

    pub fn active_connectors(&self) -> usize {
        self.active_connectors
    }

    /// Tap the store-level event stream.
    pub fn events(&mut self) -> Receiver<StoreEvent> {
        let (sender, receiver) = unbounded();
        self.event_taps.push(sender);
        receiver
    }

    // =========================================================================
    // Middleware
    // =========================================================================

    /// Register a middleware stage. Order matters and is preserved; the
    /// same function registered twice runs twice.
    pub fn use_middleware(&mut self, stage: MiddlewareFn, kind: MiddlewareKind) -> MiddlewareToken {
        let token = MiddlewareToken(self.next_middleware_id);
        self.next_middleware_id += 1;
        match kind {
            MiddlewareKind::Read => self.read_middleware.push((token.0, stage)),
            MiddlewareKind::Write => self.write_middleware.push((token.0, stage)),
        }
        token
    }

    pub fn unuse_middleware(&mut self, token: MiddlewareToken, kind: MiddlewareKind) {
        let chain = match kind {
            MiddlewareKind::Read => &mut self.read_middleware,
            MiddlewareKind::Write => &mut self.write_middleware,
        };
        chain.retain(|(id, _)| *id != token.0);
    }

    fn run_chain(
        chain: &mut [(u64, MiddlewareFn)],
        diff: GraphData,
        snapshot: &GraphData,
        options: Option<&PutOptions>,
    ) -> Result<Option<GraphData>, MiddlewareError> {
        let mut current = Some(diff);
        for (_, stage) in chain.iter_mut() {
            let Some(data) = current.take() else { break };
            current = stage(data, snapshot, options)?;
        }
        Ok(current)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write graph data.
    ///
    /// Stamps missing state, runs the write-middleware chain in order (a
    /// stage returning `None` aborts silently), merges the surviving diff
    /// and fans it out to connectors. The returned receipt is the put's
    /// acknowledgment; a middleware failure is the error case.
    pub fn put(&mut self, data: GraphData, options: &PutOptions) -> Result<PutReceipt, StoreError> {
        let msg_id = message_id();
        let annotated = add_missing_state(data, now_millis());

        let mut chain = std::mem::take(&mut self.write_middleware);
        let outcome = Self::run_chain(&mut chain, annotated, &self.graph, Some(options));
        self.write_middleware = chain;

        let diff = match outcome? {
            Some(diff) if !diff.is_empty() => diff,
            _ => {
                return Ok(PutReceipt {
                    msg_id,
                    diff: None,
                })
            }
        };

        self.receive_graph_data(diff.clone(), Some(msg_id.clone()), None)?;

        let put_msg = Message {
            id: Some(msg_id.clone()),
            put: Some(diff.clone()),
            ..Message::default()
        };
        let mut replies = Vec::new();
        for connector in &mut self.connectors {
            if let Some(reply) = connector.put(&put_msg) {
                replies.push(reply);
            }
        }
        for reply in replies {
            if let Some(err) = &reply.err {
                warn!(%err, "connector rejected put");
            }
        }

        self.emit(StoreEvent::Put {
            msg_id: msg_id.clone(),
            diff: diff.clone(),
        });
        self.drain_inbound();

        Ok(PutReceipt {
            msg_id,
            diff: Some(diff),
        })
    }

    /// Write a nested value at a multi-segment path, flattening objects
    /// into edge-connected nodes first.
    pub fn put_path(
        &mut self,
        path: &[&str],
        value: &serde_json::Value,
        options: &PutOptions,
    ) -> Result<PutReceipt, StoreError> {
        let keys: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let (graph, _soul) = flatten_value(&keys, value).map_err(StoreError::Core)?;
        self.put(graph, options)
    }

    /// Update graph data from a local or external source.
    ///
    /// Runs the read-middleware chain (transform or veto), merges per soul
    /// into the snapshot, then notifies every query whose descriptor
    /// matches each soul or that tracks it as a dereferenced target.
    pub fn receive_graph_data(
        &mut self,
        diff: GraphData,
        id: Option<String>,
        reply_to: Option<String>,
    ) -> Result<(), StoreError> {
        let mut chain = std::mem::take(&mut self.read_middleware);
        let outcome = Self::run_chain(&mut chain, diff, &self.graph, None);
        self.read_middleware = chain;

        let Some(diff) = outcome? else {
            return Ok(());
        };
        if diff.is_empty() {
            return Ok(());
        }

        let mode = if self.config.mutable {
            MergeMode::InPlace
        } else {
            MergeMode::Copy
        };
        for (soul, updates) in &diff {
            let prior = self.graph.remove(soul).flatten();
            let merged = merge_node(prior, updates, mode);
            self.graph.insert(soul.clone(), merged);
        }

        let souls: Vec<Soul> = diff.keys().cloned().collect();
        for soul in &souls {
            self.dispatch_soul(soul);
        }
        self.refresh_path_queries();

        self.emit(StoreEvent::GraphData { diff, id, reply_to });
        self.drain_inbound();
        Ok(())
    }

    /// Release network listeners tied to a request id.
    pub fn off(&mut self, msg_id: &str) {
        for connector in &mut self.connectors {
            connector.off(msg_id);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Subscribe to every node matching a descriptor. Matching snapshot
    /// data replays immediately; later merges stream through the handle.
    pub fn query_many(&mut self, options: LexQuery) -> QuerySubscription {
        let query_string = options.canonical();
        let created = !self.queries.contains_key(&query_string);
        if created {
            self.queries
                .insert(query_string.clone(), LiveQuery::new(options.clone()));
        }

        let id = self.next_sub_id;
        self.next_sub_id += 1;
        let receiver = self
            .queries
            .get_mut(&query_string)
            .expect("query just ensured")
            .subscribe(id);

        if created {
            self.ask_query(&query_string);
        }

        // replay current snapshot to the new subscriber only
        let selected: Vec<Node> = select_nodes(&self.graph, &options)
            .into_iter()
            .cloned()
            .collect();
        for node in selected {
            let parent_soul = node.soul().clone();
            match node.ref_target() {
                Some(target) => {
                    if let Some(query) = self.queries.get_mut(&query_string) {
                        query.set_ref(target.clone(), parent_soul.clone());
                    }
                    self.ensure_ref_query(&query_string, &target);
                    if let Some(entry) = self.graph.get(&target) {
                        let target_node = entry.clone();
                        if let Some(query) = self.queries.get(&query_string) {
                            query.send_to(id, &parent_soul, target_node.as_ref());
                        }
                    }
                }
                None => {
                    if let Some(query) = self.queries.get(&query_string) {
                        query.send_to(id, &parent_soul, Some(&node));
                    }
                }
            }
        }

        self.drain_inbound();
        QuerySubscription {
            id,
            query_string,
            receiver,
        }
    }

    /// Subscribe to a multi-segment path, dereferencing edges one hop at a
    /// time. Delivers the resolved value whenever it changes; an
    /// intermediate soul still unknown leaves the path incomplete and
    /// silent until its data arrives.
    pub fn query(&mut self, path: &[&str]) -> Result<PathSubscription, StoreError> {
        if path.is_empty() {
            return Err(StoreError::Core(
                crate::core::InvalidPath {
                    reason: "no path specified".into(),
                }
                .into(),
            ));
        }
        let keys: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let id = self.next_sub_id;
        self.next_sub_id += 1;
        let (sender, receiver) = unbounded();

        let mut state = PathQueryState {
            id,
            keys,
            holds: Vec::new(),
            souls: Vec::new(),
            last_value: None,
            reported: false,
            sender,
        };
        self.evaluate_path_query(&mut state);
        self.path_queries.push(state);
        self.drain_inbound();
        Ok(PathSubscription { id, receiver })
    }

    /// Detach one subscriber. The query is evicted immediately when its
    /// listener count reaches zero - re-subscribing re-issues the ask.
    /// Idempotent.
    pub fn unlisten(&mut self, subscription: &QuerySubscription) {
        let Some(query) = self.queries.get_mut(&subscription.query_string) else {
            return;
        };
        query.unsubscribe(subscription.id);
        if query.listener_count() == 0 {
            self.evict(subscription.query_string.clone());
        }
    }

    /// Detach a path subscription, releasing its holds on soul queries.
    /// Idempotent.
    pub fn unlisten_path(&mut self, subscription: &PathSubscription) {
        let Some(index) = self
            .path_queries
            .iter()
            .position(|pq| pq.id == subscription.id)
        else {
            return;
        };
        let state = self.path_queries.remove(index);
        for query_string in state.holds {
            if let Some(query) = self.queries.get_mut(&query_string) {
                query.release_hold();
                if query.listener_count() == 0 {
                    self.evict(query_string);
                }
            }
        }
    }

    /// Number of live queries (targets and path holds included).
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn emit(&mut self, event: StoreEvent) {
        self.event_taps.retain(|tap| tap.send(event.clone()).is_ok());
    }

    /// Dispatch one merged soul to matching queries, in registry insertion
    /// order. Ref nodes register their target and deliver the target's data
    /// when it is already known (inline from this diff or the snapshot);
    /// otherwise delivery waits for the target soul's own arrival.
    fn dispatch_soul(&mut self, soul: &Soul) {
        let node = self.graph.get(soul).cloned().flatten();

        // collect against an immutable registry, then apply
        let mut deliveries: Vec<(String, Soul, Option<Node>)> = Vec::new();
        let mut refs: Vec<(String, Soul)> = Vec::new();

        for (query_string, query) in &self.queries {
            if query.state() == QueryState::Destroyed {
                continue;
            }
            if query.matches(soul) {
                match node.as_ref().and_then(Node::ref_target) {
                    Some(target) => {
                        refs.push((query_string.clone(), target.clone()));
                        if self.graph.contains_key(&target) {
                            let target_node = self.graph.get(&target).cloned().flatten();
                            deliveries.push((query_string.clone(), soul.clone(), target_node));
                        }
                    }
                    None => {
                        deliveries.push((query_string.clone(), soul.clone(), node.clone()));
                    }
                }
            } else if let Some(parent) = query.target_parent(soul) {
                deliveries.push((query_string.clone(), parent, node.clone()));
            }
        }

        for (query_string, target) in refs {
            if let Some(query) = self.queries.get_mut(&query_string) {
                query.set_ref(target.clone(), soul.clone());
            }
            self.ensure_ref_query(&query_string, &target);
        }
        for (query_string, against, delivered) in deliveries {
            if let Some(query) = self.queries.get_mut(&query_string) {
                query.receive(&against, delivered.as_ref());
            }
        }
    }

    /// Make sure a point query exists for a dereferenced target soul and is
    /// held open by the parent query, so the target's data eventually
    /// arrives and keeps flowing.
    fn ensure_ref_query(&mut self, parent_query_string: &str, target: &Soul) {
        let target_query_string = LexQuery::for_soul(target.clone()).canonical();

        let already_held = self
            .queries
            .get(parent_query_string)
            .is_some_and(|query| query.holds(&target_query_string));
        if already_held {
            return;
        }

        let created = !self.queries.contains_key(&target_query_string);
        if created {
            self.queries.insert(
                target_query_string.clone(),
                LiveQuery::new(LexQuery::for_soul(target.clone())),
            );
        }

        if let Some(parent) = self.queries.get_mut(parent_query_string) {
            parent.add_target_query(target_query_string.clone());
        }
        if let Some(target_query) = self.queries.get_mut(&target_query_string) {
            target_query.add_hold();
        }
        if created {
            self.ask_query(&target_query_string);
        }
    }

    /// Issue the network ask for a pending query through every connected
    /// connector, queueing replies for the drain loop. An empty direct
    /// reply to a point query records "known absent" so waiting consumers
    /// learn the soul has no data.
    fn ask_query(&mut self, query_string: &str) {
        let Some(query) = self.queries.get_mut(query_string) else {
            return;
        };
        if query.state() != QueryState::Pending {
            return;
        }
        let options = query.options().clone();
        let point_soul = options.soul.clone();

        let ask = Message::get_request(options);
        let ask_id = ask.id.clone().unwrap_or_default();
        query.mark_asked(ask_id);

        let mut replies = Vec::new();
        for connector in &mut self.connectors {
            if !connector.is_connected() {
                continue;
            }
            if let Some(reply) = connector.get(&ask) {
                replies.push(reply);
            }
        }

        for reply in replies {
            if reply.put_is_empty() {
                if let Some(soul) = &point_soul {
                    let mut absent = GraphData::new();
                    absent.insert(soul.clone(), None);
                    self.pending_inbound.push_back(Message {
                        put: Some(absent),
                        reply_to: reply.reply_to.clone(),
                        ..Message::default()
                    });
                }
            } else {
                self.pending_inbound.push_back(reply);
            }
        }
    }

    fn drain_inbound(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        while let Some(message) = self.pending_inbound.pop_front() {
            let Some(put) = message.put else { continue };
            if let Err(err) = self.receive_graph_data(put, message.id, message.reply_to) {
                warn!(%err, "inbound graph data rejected");
            }
        }
        self.draining = false;
    }

    /// Re-resolve every path query after a merge, subscribing newly
    /// discovered constituent souls and emitting when the value changed.
    fn refresh_path_queries(&mut self) {
        let mut path_queries = std::mem::take(&mut self.path_queries);
        for state in path_queries.iter_mut() {
            self.evaluate_path_query(state);
        }
        self.path_queries = path_queries;
    }

    fn evaluate_path_query(&mut self, state: &mut PathQueryState) {
        let data = path_data(&state.keys, &self.graph);

        for soul in &data.souls {
            if state.souls.contains(soul) {
                continue;
            }
            state.souls.push(soul.clone());
            let query_string = LexQuery::for_soul(soul.clone()).canonical();
            let created = !self.queries.contains_key(&query_string);
            if created {
                self.queries
                    .insert(query_string.clone(), LiveQuery::new(LexQuery::for_soul(soul.clone())));
            }
            if let Some(query) = self.queries.get_mut(&query_string) {
                query.add_hold();
            }
            state.holds.push(query_string.clone());
            if created {
                self.ask_query(&query_string);
            }
        }

        let changed = match (&data.value, &state.last_value) {
            (Some(value), prior) => prior.as_ref() != Some(value),
            (None, _) => data.complete && !state.reported,
        };
        if changed {
            state.reported = true;
            state.last_value = data.value.clone();
            let key = state.keys.last().cloned().unwrap_or_default();
            let _ = state.sender.send(PathUpdate {
                key,
                value: data.value,
            });
        }
    }

    /// Evict a query and cascade through the target queries it held open.
    fn evict(&mut self, query_string: String) {
        let mut worklist = vec![query_string];
        while let Some(query_string) = worklist.pop() {
            let Some(query) = self.queries.get_mut(&query_string) else {
                continue;
            };
            if query.listener_count() > 0 {
                continue;
            }
            let (ask_id, released) = query.off();
            self.queries.shift_remove(&query_string);
            if let Some(ask_id) = ask_id {
                for connector in &mut self.connectors {
                    connector.off(&ask_id);
                }
            }
            for target_query_string in released {
                if let Some(target) = self.queries.get_mut(&target_query_string) {
                    target.release_hold();
                    if target.listener_count() == 0 {
                        worklist.push(target_query_string);
                    }
                }
            }
        }
    }
}
