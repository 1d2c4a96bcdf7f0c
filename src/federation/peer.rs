//! Peer seam for server-to-server replication.
//!
//! The socket transport lives outside the core. A peer is anything that can
//! answer `get`/`put` requests and surface inbound change messages on a
//! channel the pump drains.

use crossbeam::channel::Receiver;

use crate::core::{GraphData, LexQuery};
use crate::storage::AdapterError;
use crate::wire::{Message, Originators};

/// One remote server.
pub trait Peer {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn is_authenticated(&self) -> bool;

    /// Authentication hook invoked on connect.
    fn authenticate(&mut self, _public: &str, _secret: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Request matching data from the peer.
    fn get_from_peer(&mut self, query: &LexQuery) -> Result<Message, AdapterError>;

    /// Push a diff to the peer, originator-stamped by the caller.
    fn put_in_peer(
        &mut self,
        graph: &GraphData,
        originators: &Originators,
    ) -> Result<Message, AdapterError>;

    /// Changes the peer publishes toward us (its changelog subscription).
    fn changes(&self) -> &Receiver<Message>;
}

/// The peer set of one federation adapter.
#[derive(Default)]
pub struct Peers {
    peers: Vec<Box<dyn Peer>>,
}

impl Peers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, peer: Box<dyn Peer>) {
        self.peers.push(peer);
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Peer>> {
        self.peers.iter_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.peers.iter().map(|p| p.name().to_string()).collect()
    }
}
