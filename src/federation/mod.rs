//! Federation: the merge/diff pipeline applied across a network boundary.
//!
//! Wraps an `(internal, peers, persistence)` triple. Reads pull from peers
//! before answering locally; writes persist locally then fan out, stamped
//! with this server's identity so the change is never echoed back.
//! Inbound peer changes re-run the exact same diff/merge/adapter-put
//! pipeline as local writes - replication adds no second conflict path.

pub mod peer;
mod writer;

use tracing::{debug, warn};

use crate::config::FederationConfig;
use crate::core::{GraphData, LexQuery, ServerName};
use crate::storage::{AdapterError, GraphAdapter};
use crate::validator::validate_graph;
use crate::wire::{Message, Originators};

pub use peer::{Peer, Peers};

use writer::PeersWriter;

pub struct FederationAdapter {
    server_name: ServerName,
    internal: Box<dyn GraphAdapter>,
    peers: Peers,
    persistence: Box<dyn GraphAdapter>,
    config: FederationConfig,
    writer: PeersWriter,
}

impl FederationAdapter {
    pub fn new(
        server_name: ServerName,
        internal: Box<dyn GraphAdapter>,
        peers: Peers,
        persistence: Box<dyn GraphAdapter>,
        config: FederationConfig,
    ) -> Self {
        let writer = PeersWriter::new(server_name.clone());
        Self {
            server_name,
            internal,
            peers,
            persistence,
            config,
            writer,
        }
    }

    pub fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Drain pending inbound changes from every peer.
    ///
    /// Loop-prevention invariant: a change stamped with our own server
    /// identity is dropped - never re-processed, never re-forwarded.
    /// Returns how many messages were applied.
    pub fn sync_inbound(&mut self) -> usize {
        if !self.config.reverse_peer_sync {
            return 0;
        }
        let mut inbound: Vec<(String, Message)> = Vec::new();
        for peer in self.peers.iter_mut() {
            let name = peer.name().to_string();
            while let Ok(message) = peer.changes().try_recv() {
                inbound.push((name.clone(), message));
            }
        }

        let mut applied = 0;
        for (peer_name, message) in inbound {
            if self.is_own(message.originators.as_ref()) {
                debug!(peer = %peer_name, "dropping own change echoed by peer");
                continue;
            }
            let Some(graph) = &message.put else { continue };
            if graph.is_empty() {
                continue;
            }
            match self.put_from_peer(graph, &peer_name, message.originators.as_ref()) {
                Ok(_) => applied += 1,
                Err(err) => warn!(peer = %peer_name, %err, "error syncing from peer"),
            }
        }
        applied
    }

    fn is_own(&self, originators: Option<&Originators>) -> bool {
        originators.is_some_and(|o| o.contains(&self.server_name))
    }

    /// Persist a peer-originated graph and forward the surviving diff to
    /// every peer except the one it came from.
    fn put_from_peer(
        &mut self,
        graph: &GraphData,
        source: &str,
        originators: Option<&Originators>,
    ) -> Result<Option<GraphData>, AdapterError> {
        self.validate(graph)?;
        let diff = self.persistence.put(graph, originators)?;
        if let Some(diff_data) = &diff {
            if self.config.put_to_peers {
                self.writer
                    .update_peers(diff_data, &mut self.peers, Some(source), originators);
            }
        }
        Ok(diff)
    }

    /// Pull matching data from every connected, authenticated peer and fold
    /// it into persistence through the shared pipeline.
    fn update_from_peers(&mut self, query: &LexQuery) {
        if self.peers.is_empty() {
            return;
        }
        let mut replies: Vec<(String, Message)> = Vec::new();
        for peer in self.peers.iter_mut() {
            if !peer.is_connected() || !peer.is_authenticated() {
                continue;
            }
            let name = peer.name().to_string();
            match peer.get_from_peer(query) {
                Ok(message) => replies.push((name, message)),
                Err(err) => warn!(peer = %name, %err, "error reading from peer"),
            }
        }

        for (peer_name, message) in replies {
            if self.is_own(message.originators.as_ref()) {
                continue;
            }
            let Some(graph) = &message.put else { continue };
            if graph.is_empty() {
                continue;
            }
            if let Err(err) = self.put_from_peer(graph, &peer_name, message.originators.as_ref()) {
                warn!(peer = %peer_name, %err, "error updating from peer");
            }
        }
    }

    fn validate(&self, graph: &GraphData) -> Result<(), AdapterError> {
        if self.config.disable_validation {
            return Ok(());
        }
        Ok(validate_graph(graph)?)
    }
}

impl GraphAdapter for FederationAdapter {
    fn get(&mut self, query: &LexQuery) -> Result<GraphData, AdapterError> {
        self.update_from_peers(query);
        self.internal.get(query)
    }

    fn put(
        &mut self,
        graph: &GraphData,
        originators: Option<&Originators>,
    ) -> Result<Option<GraphData>, AdapterError> {
        self.validate(graph)?;
        let diff = self.persistence.put(graph, originators)?;
        if let Some(diff_data) = &diff {
            if self.config.put_to_peers {
                self.writer
                    .update_peers(diff_data, &mut self.peers, None, originators);
            }
        }
        Ok(diff)
    }
}
