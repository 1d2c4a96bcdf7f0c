//! Federation: originator loop prevention, peer fan-out and pull-through,
//! validation at the persistence boundary.

mod fixtures;

use fixtures::{graph_one, soul, LocalPeer, SharedStorage};
use rhizome::config::FederationConfig;
use rhizome::{
    FederationAdapter, GraphAdapter, GraphStorageAdapter, LexQuery, Message, Node, Originators,
    Peers, ServerName, Value,
};

fn server_name(s: &str) -> ServerName {
    ServerName::new(s).unwrap()
}

/// Federation adapter whose internal and persistence sides share one store.
fn federation(name: &str, peers: Peers, config: FederationConfig) -> FederationAdapter {
    let shared = SharedStorage::new();
    FederationAdapter::new(
        server_name(name),
        Box::new(GraphStorageAdapter::new(shared.clone())),
        peers,
        Box::new(GraphStorageAdapter::new(shared)),
        config,
    )
}

#[test]
fn local_puts_fan_out_stamped_with_our_identity() {
    let p1 = LocalPeer::new("p1");
    let p2 = LocalPeer::new("p2");
    let p1_log = p1.put_log();
    let p2_log = p2.put_log();

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    peers.add(Box::new(p2));
    let mut fed = federation("s", peers, FederationConfig::default());

    let graph = graph_one("x", &[("v", Value::text("v"), 100)]);
    fed.put(&graph, None).unwrap().unwrap();

    for log in [&p1_log, &p2_log] {
        let puts = log.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].1.contains(&server_name("s")));
    }

    // a redundant put produces no diff, so nothing reaches the peers
    fed.put(&graph, None).unwrap();
    assert_eq!(p1_log.lock().unwrap().len(), 1);
}

#[test]
fn peer_changes_forward_to_other_peers_but_never_back() {
    let p1 = LocalPeer::new("p1");
    let p2 = LocalPeer::new("p2");
    let p1_log = p1.put_log();
    let p2_log = p2.put_log();
    let p1_feed = p1.change_feed();

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    peers.add(Box::new(p2));
    let mut fed = federation("s", peers, FederationConfig::default());

    let originators = Originators::single(&server_name("p1"));
    p1_feed
        .send(Message {
            put: Some(graph_one("x", &[("v", Value::text("v"), 100)])),
            originators: Some(originators),
            ..Message::default()
        })
        .unwrap();

    assert_eq!(fed.sync_inbound(), 1);

    // persisted locally
    let read = fed.get(&LexQuery::for_soul(soul("x"))).unwrap();
    assert!(read.contains_key(&soul("x")));

    // never echoed to its source, forwarded to the other peer with both
    // identities stamped
    assert!(p1_log.lock().unwrap().is_empty());
    let p2_puts = p2_log.lock().unwrap();
    assert_eq!(p2_puts.len(), 1);
    assert!(p2_puts[0].1.contains(&server_name("p1")));
    assert!(p2_puts[0].1.contains(&server_name("s")));
}

#[test]
fn changes_stamped_with_our_own_identity_are_dropped() {
    let p1 = LocalPeer::new("p1");
    let p1_log = p1.put_log();
    let p1_feed = p1.change_feed();

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    let mut fed = federation("s", peers, FederationConfig::default());

    let mut originators = Originators::single(&server_name("p1"));
    originators.insert(&server_name("s"));
    p1_feed
        .send(Message {
            put: Some(graph_one("x", &[("v", Value::text("v"), 100)])),
            originators: Some(originators),
            ..Message::default()
        })
        .unwrap();

    assert_eq!(fed.sync_inbound(), 0);
    assert!(fed
        .get(&LexQuery::for_soul(soul("x")))
        .unwrap()
        .is_empty());
    assert!(p1_log.lock().unwrap().is_empty());
}

#[test]
fn get_pulls_from_peers_before_reading_locally() {
    let mut p1 = LocalPeer::new("p1");
    p1.seed(&graph_one("remote", &[("v", Value::text("remote"), 100)]));
    let p2 = LocalPeer::new("p2");
    let p2_log = p2.put_log();

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    peers.add(Box::new(p2));
    let mut fed = federation("s", peers, FederationConfig::default());

    let read = fed.get(&LexQuery::for_soul(soul("remote"))).unwrap();
    let node = read[&soul("remote")].as_ref().unwrap();
    assert_eq!(node.get("v"), Some(&Value::text("remote")));

    // the pulled diff also flowed onward to the quiet peer
    assert_eq!(p2_log.lock().unwrap().len(), 1);
}

#[test]
fn disconnected_peers_are_skipped_on_pull() {
    let mut p1 = LocalPeer::new("p1");
    p1.seed(&graph_one("remote", &[("v", Value::text("remote"), 100)]));
    p1.connected = false;

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    let mut fed = federation("s", peers, FederationConfig::default());

    assert!(fed
        .get(&LexQuery::for_soul(soul("remote")))
        .unwrap()
        .is_empty());
}

#[test]
fn one_failing_peer_does_not_block_the_others() {
    let mut p1 = LocalPeer::new("p1");
    p1.fail_puts = true;
    let p2 = LocalPeer::new("p2");
    let p2_log = p2.put_log();

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    peers.add(Box::new(p2));
    let mut fed = federation("s", peers, FederationConfig::default());

    // the local write succeeds and the healthy peer still hears about it
    fed.put(&graph_one("x", &[("v", Value::text("v"), 100)]), None)
        .unwrap()
        .unwrap();
    assert_eq!(p2_log.lock().unwrap().len(), 1);
}

#[test]
fn malformed_graphs_are_rejected_before_persistence() {
    let mut fed = federation("s", Peers::new(), FederationConfig::default());

    // attribute with no state entry fails validation
    let mut bad = Node::new(soul("x"));
    bad.insert_unstamped("v", Value::text("unstamped"));
    let mut graph = rhizome::GraphData::new();
    graph.insert(soul("x"), Some(bad));

    assert!(matches!(
        fed.put(&graph, None),
        Err(rhizome::AdapterError::Validation(_))
    ));
    assert!(fed.get(&LexQuery::for_soul(soul("x"))).unwrap().is_empty());
}

#[test]
fn reverse_sync_can_be_disabled() {
    let p1 = LocalPeer::new("p1");
    let p1_feed = p1.change_feed();

    let mut peers = Peers::new();
    peers.add(Box::new(p1));
    let config = FederationConfig {
        reverse_peer_sync: false,
        ..FederationConfig::default()
    };
    let mut fed = federation("s", peers, config);

    p1_feed
        .send(Message {
            put: Some(graph_one("x", &[("v", Value::text("v"), 100)])),
            originators: Some(Originators::single(&server_name("p1"))),
            ..Message::default()
        })
        .unwrap();
    assert_eq!(fed.sync_inbound(), 0);
}
