//! End-to-end tests over an in-process cluster of queue nodes.

use frontier_core::{
    CoreResult, NodeAddr, PeerClient, QueueConfig, QueueNode, QueueProxy,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

/// Dispatches peer calls directly to in-process nodes.
struct Loopback {
    nodes: HashMap<NodeAddr, Arc<QueueNode<String>>>,
}

impl PeerClient<String> for Loopback {
    fn put(
        &self,
        node: &NodeAddr,
        items: &[String],
        force: bool,
        priority: usize,
    ) -> CoreResult<usize> {
        self.nodes[node].put(items, force, priority)
    }

    fn put_backup(
        &self,
        node: &NodeAddr,
        owner: &NodeAddr,
        items: &[String],
        force: bool,
    ) -> CoreResult<usize> {
        self.nodes[node].put_backup(owner, items, force)
    }

    fn get(&self, node: &NodeAddr, size: usize, priority: usize) -> CoreResult<Vec<String>> {
        self.nodes[node].get(size, priority)
    }
}

fn cluster(
    root: &std::path::Path,
    addrs: &[&str],
) -> (Vec<NodeAddr>, HashMap<NodeAddr, Arc<QueueNode<String>>>) {
    let addrs: Vec<NodeAddr> = addrs.iter().map(|a| NodeAddr::new(*a)).collect();
    let mut nodes = HashMap::new();
    for addr in &addrs {
        let config = QueueConfig::new(root.join(addr.dir_name())).dedup_capacity(10_000);
        let node = Arc::new(QueueNode::open(addr.clone(), config).unwrap());
        nodes.insert(addr.clone(), node);
    }
    (addrs, nodes)
}

#[test]
fn cluster_round_trip_delivers_every_item_once() {
    let root = tempdir().unwrap();
    let (addrs, nodes) = cluster(root.path(), &["n1:6090", "n2:6090", "n3:6090"]);

    let local = Arc::clone(&nodes[&addrs[0]]);
    let peers: Vec<NodeAddr> = addrs[1..].to_vec();
    let proxy = QueueProxy::open(
        local,
        peers,
        Loopback {
            nodes: nodes.clone(),
        },
    )
    .unwrap();

    let items: Vec<String> = (0..60).map(|i| format!("https://example.com/{i}")).collect();
    proxy.put(items.clone(), false, 0).unwrap();
    proxy.flush_all().unwrap();

    // Drain all primaries across the cluster; every item surfaces exactly once.
    let mut drained = Vec::new();
    for node in nodes.values() {
        drained.extend(node.get(1000, 0).unwrap());
    }
    drained.sort();
    let mut expected = items.clone();
    expected.sort();
    assert_eq!(drained, expected);

    // Each item also has exactly one backup copy somewhere in the cluster.
    let mut replicas = Vec::new();
    for node in nodes.values() {
        for owner in &addrs {
            replicas.extend(node.get_backup(owner, 1000).unwrap());
        }
    }
    replicas.sort();
    assert_eq!(replicas, expected);
}

#[test]
fn duplicate_batches_are_absorbed_by_the_gates() {
    let root = tempdir().unwrap();
    let (addrs, nodes) = cluster(root.path(), &["n1:6090", "n2:6090"]);

    let proxy = QueueProxy::open(
        Arc::clone(&nodes[&addrs[0]]),
        vec![addrs[1].clone()],
        Loopback {
            nodes: nodes.clone(),
        },
    )
    .unwrap();

    let items: Vec<String> = (0..30).map(|i| format!("https://dup.example/{i}")).collect();
    proxy.put(items.clone(), false, 0).unwrap();
    proxy.flush_all().unwrap();

    // Second pass with the same labels: every primary put is gate-dropped.
    proxy.put(items, false, 0).unwrap();
    proxy.flush_all().unwrap();

    let total: usize = nodes
        .values()
        .map(|node| node.get(1000, 0).unwrap().len())
        .sum();
    assert_eq!(total, 30);
}

#[test]
fn proxy_get_reaches_across_the_cluster() {
    let root = tempdir().unwrap();
    let (addrs, nodes) = cluster(root.path(), &["n1:6090", "n2:6090"]);

    // Park an item directly on the remote node.
    nodes[&addrs[1]]
        .put(&["remote-only".to_string()], false, 1)
        .unwrap();

    let proxy = QueueProxy::open(
        Arc::clone(&nodes[&addrs[0]]),
        vec![addrs[1].clone()],
        Loopback {
            nodes: nodes.clone(),
        },
    )
    .unwrap();

    assert_eq!(proxy.get(10, 1).unwrap(), vec!["remote-only".to_string()]);
    // Everything is drained now.
    assert!(proxy.get(10, 1).unwrap().is_empty());
}

#[test]
fn cluster_survives_restart() {
    let root = tempdir().unwrap();

    let items: Vec<String> = (0..10).map(|i| format!("https://keep.example/{i}")).collect();
    {
        let (addrs, nodes) = cluster(root.path(), &["n1:6090", "n2:6090"]);
        let proxy = QueueProxy::open(
            Arc::clone(&nodes[&addrs[0]]),
            vec![addrs[1].clone()],
            Loopback {
                nodes: nodes.clone(),
            },
        )
        .unwrap();
        proxy.put(items.clone(), false, 0).unwrap();
        proxy.flush_all().unwrap();

        for node in nodes.values() {
            node.shutdown().unwrap();
        }
    }

    let (_, nodes) = cluster(root.path(), &["n1:6090", "n2:6090"]);
    let mut drained = Vec::new();
    for node in nodes.values() {
        drained.extend(node.get(1000, 0).unwrap());
    }
    drained.sort();
    let mut expected = items;
    expected.sort();
    assert_eq!(drained, expected);
}
