//! Peer fan-out with originator stamping.
//!
//! One peer's failure never blocks delivery to the others or the local
//! persistence write - failures are isolated and logged per peer.

use tracing::warn;

use crate::core::{GraphData, ServerName};
use crate::wire::Originators;

use super::peer::Peers;

pub(crate) struct PeersWriter {
    server_name: ServerName,
}

impl PeersWriter {
    pub fn new(server_name: ServerName) -> Self {
        Self { server_name }
    }

    /// Send a diff to every peer, stamping our own identity into the
    /// originators first. `exclude` skips the peer a forwarded change came
    /// from.
    pub fn update_peers(
        &self,
        data: &GraphData,
        peers: &mut Peers,
        exclude: Option<&str>,
        originators: Option<&Originators>,
    ) {
        if peers.is_empty() {
            return;
        }
        let mut stamped = originators.cloned().unwrap_or_default();
        stamped.insert(&self.server_name);

        for peer in peers.iter_mut() {
            if exclude == Some(peer.name()) {
                continue;
            }
            if !peer.is_connected() {
                continue;
            }
            if let Err(err) = peer.put_in_peer(data, &stamped) {
                warn!(peer = peer.name(), %err, "failed to update peer");
            }
        }
    }
}
