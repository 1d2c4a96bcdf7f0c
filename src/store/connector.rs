//! Connector seam between the graph store and a data source/destination.
//!
//! The wire/socket plumbing lives outside the core; anything that can
//! answer `get`/`put` messages can feed a store. Replies are returned
//! inline (the synchronous suspension point) and folded back into
//! `receive_graph_data` by the store.

use tracing::warn;

use crate::storage::GraphAdapter;
use crate::wire::Message;

/// A source/destination for graph data.
pub trait Connector {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool {
        true
    }

    /// Authentication hook; transports with no auth accept everything.
    fn authenticate(&mut self, _public: &str, _secret: &str) -> Result<(), String> {
        Ok(())
    }

    /// Serve a `get` request, replying with a `put` message or an error
    /// message. `None` means "no answer from this connector".
    fn get(&mut self, message: &Message) -> Option<Message>;

    /// Accept a `put`, replying with an ack.
    fn put(&mut self, message: &Message) -> Option<Message>;

    /// Release resources held for a request id. Must be idempotent.
    fn off(&mut self, _msg_id: &str) {}
}

/// Connector backed by a graph adapter - the bridge that puts a storage
/// (or federation) adapter behind a store.
pub struct AdapterConnector<A: GraphAdapter> {
    name: String,
    adapter: A,
}

impl<A: GraphAdapter> AdapterConnector<A> {
    pub fn new(adapter: A) -> Self {
        Self::named(adapter, "adapter")
    }

    pub fn named(adapter: A, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            adapter,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }
}

impl<A: GraphAdapter> Connector for AdapterConnector<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&mut self, message: &Message) -> Option<Message> {
        let query = message.get.as_ref()?;
        match self.adapter.get(query) {
            Ok(graph) => Some(Message::put_reply(message.id.clone(), graph)),
            Err(err) => {
                warn!(connector = %self.name, %err, "error fetching node");
                Some(Message::err_reply(message.id.clone(), "Error fetching node"))
            }
        }
    }

    fn put(&mut self, message: &Message) -> Option<Message> {
        let graph = message.put.as_ref()?;
        match self.adapter.put(graph, message.originators.as_ref()) {
            Ok(_) => Some(Message::ok_reply(message.id.clone())),
            Err(err) => {
                warn!(connector = %self.name, %err, "error saving put");
                Some(Message::err_reply(message.id.clone(), "Error saving put"))
            }
        }
    }
}
