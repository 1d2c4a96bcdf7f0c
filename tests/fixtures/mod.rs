//! Shared scenario-test fixtures: graph builders, in-memory peers, and
//! storage wrappers that inject write contention.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use crossbeam::channel::{unbounded, Receiver, Sender};

use rhizome::{
    AdapterError, GraphAdapter, GraphData, GraphStorageAdapter, LexQuery, MemoryStorage, Message,
    Node, Originators, Peer, PutOutcome, Soul, Storage, StorageError, Value,
};

pub fn soul(s: &str) -> Soul {
    Soul::new(s).unwrap()
}

pub fn node(s: &str, entries: &[(&str, Value, u64)]) -> Node {
    let mut n = Node::new(soul(s));
    for (key, value, stamp) in entries {
        n.insert(*key, value.clone(), *stamp);
    }
    n
}

pub fn graph_one(s: &str, entries: &[(&str, Value, u64)]) -> GraphData {
    let mut graph = GraphData::new();
    graph.insert(soul(s), Some(node(s, entries)));
    graph
}

/// Storage handle shareable between two adapters (federation's internal and
/// persistence sides reading the same records).
#[derive(Clone, Default)]
pub struct SharedStorage {
    inner: Arc<Mutex<MemoryStorage>>,
}

impl SharedStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for SharedStorage {
    fn get(&self, soul: &Soul) -> Result<Option<Node>, StorageError> {
        self.inner.lock().unwrap().get(soul)
    }

    fn list(
        &self,
        options: &rhizome::ListOptions,
    ) -> Result<GraphData, StorageError> {
        self.inner.lock().unwrap().list(options)
    }

    fn put(&mut self, soul: &Soul, node: Option<Node>) -> Result<(), StorageError> {
        self.inner.lock().unwrap().put(soul, node)
    }

    fn put_if(
        &mut self,
        soul: &Soul,
        expected: Option<&Node>,
        node: Option<Node>,
    ) -> Result<PutOutcome, StorageError> {
        self.inner.lock().unwrap().put_if(soul, expected, node)
    }
}

/// Storage that lets a competing writer slip in right before the first
/// optimistic write, forcing one conflict/retry round.
pub struct ContentiousStorage {
    inner: MemoryStorage,
    compete_once: Option<(Soul, Node)>,
}

impl ContentiousStorage {
    pub fn new(compete_soul: Soul, compete_node: Node) -> Self {
        Self {
            inner: MemoryStorage::new(),
            compete_once: Some((compete_soul, compete_node)),
        }
    }
}

impl Storage for ContentiousStorage {
    fn get(&self, soul: &Soul) -> Result<Option<Node>, StorageError> {
        self.inner.get(soul)
    }

    fn list(
        &self,
        options: &rhizome::ListOptions,
    ) -> Result<GraphData, StorageError> {
        self.inner.list(options)
    }

    fn put(&mut self, soul: &Soul, node: Option<Node>) -> Result<(), StorageError> {
        self.inner.put(soul, node)
    }

    fn put_if(
        &mut self,
        soul: &Soul,
        expected: Option<&Node>,
        node: Option<Node>,
    ) -> Result<PutOutcome, StorageError> {
        if let Some((competing_soul, competing_node)) = self.compete_once.take() {
            self.inner.put(&competing_soul, Some(competing_node))?;
        }
        self.inner.put_if(soul, expected, node)
    }
}

/// Storage whose optimistic writes never succeed.
#[derive(Default)]
pub struct AlwaysConflicting {
    inner: MemoryStorage,
}

impl Storage for AlwaysConflicting {
    fn get(&self, soul: &Soul) -> Result<Option<Node>, StorageError> {
        self.inner.get(soul)
    }

    fn list(
        &self,
        options: &rhizome::ListOptions,
    ) -> Result<GraphData, StorageError> {
        self.inner.list(options)
    }

    fn put(&mut self, soul: &Soul, node: Option<Node>) -> Result<(), StorageError> {
        self.inner.put(soul, node)
    }

    fn put_if(
        &mut self,
        _soul: &Soul,
        _expected: Option<&Node>,
        _node: Option<Node>,
    ) -> Result<PutOutcome, StorageError> {
        Ok(PutOutcome::Conflict)
    }
}

/// Record of everything a test peer was asked to store.
pub type PutLog = Arc<Mutex<Vec<(GraphData, Originators)>>>;

/// In-memory peer: answers gets from its own adapter, records puts, and
/// exposes a channel tests push "changelog" messages through.
pub struct LocalPeer {
    name: String,
    adapter: GraphStorageAdapter<MemoryStorage>,
    puts: PutLog,
    changes_tx: Sender<Message>,
    changes_rx: Receiver<Message>,
    pub connected: bool,
    pub authenticated: bool,
    pub fail_puts: bool,
}

impl LocalPeer {
    pub fn new(name: &str) -> Self {
        let (changes_tx, changes_rx) = unbounded();
        Self {
            name: name.to_string(),
            adapter: GraphStorageAdapter::new(MemoryStorage::new()),
            puts: Arc::new(Mutex::new(Vec::new())),
            changes_tx,
            changes_rx,
            connected: true,
            authenticated: true,
            fail_puts: false,
        }
    }

    /// Preload data the peer will serve on `get_from_peer`.
    pub fn seed(&mut self, graph: &GraphData) {
        self.adapter.put(graph, None).unwrap();
    }

    pub fn put_log(&self) -> PutLog {
        Arc::clone(&self.puts)
    }

    pub fn change_feed(&self) -> Sender<Message> {
        self.changes_tx.clone()
    }
}

impl Peer for LocalPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn get_from_peer(&mut self, query: &LexQuery) -> Result<Message, AdapterError> {
        let graph = self.adapter.get(query)?;
        Ok(Message::put_reply(None, graph))
    }

    fn put_in_peer(
        &mut self,
        graph: &GraphData,
        originators: &Originators,
    ) -> Result<Message, AdapterError> {
        if self.fail_puts {
            return Err(AdapterError::Peer {
                peer: self.name.clone(),
                reason: "unreachable".into(),
            });
        }
        self.puts
            .lock()
            .unwrap()
            .push((graph.clone(), originators.clone()));
        self.adapter.put(graph, Some(originators))?;
        Ok(Message::ok_reply(None))
    }

    fn changes(&self) -> &Receiver<Message> {
        &self.changes_rx
    }
}
