//! Consistent hash ring over node addresses.
//!
//! Each node occupies one point on a 64-bit ring, at the leading 8 bytes of
//! the SHA-256 of its address. A key is placed at the same kind of point and
//! iterates nodes clockwise from there. Placement is a pure function of the
//! node set: every process that knows the same membership computes the same
//! owners, with no coordination.
//!
//! SHA-256 rather than the standard library hasher because `DefaultHasher`
//! makes no cross-version stability promise, and ring positions must agree
//! across processes and releases.

use crate::types::NodeAddr;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Returns a key's position on the ring.
#[must_use]
pub fn ring_point(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// A consistent hash ring mapping keys to an ordered sequence of nodes.
///
/// Membership changes rebuild in O(log n); cluster sizes are tens of nodes,
/// so no incremental maintenance is attempted.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    points: BTreeMap<u64, NodeAddr>,
}

impl HashRing {
    /// Builds a ring from a node set.
    pub fn new(nodes: impl IntoIterator<Item = NodeAddr>) -> Self {
        let mut ring = Self::default();
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    /// Adds a node to the ring.
    pub fn add_node(&mut self, node: NodeAddr) {
        self.points.insert(ring_point(node.as_str()), node);
    }

    /// Removes a node from the ring. Unknown nodes are ignored.
    pub fn remove_node(&mut self, node: &NodeAddr) {
        let point = ring_point(node.as_str());
        if self.points.get(&point) == Some(node) {
            self.points.remove(&point);
        }
    }

    /// Returns the number of nodes on the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns whether the ring has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates all distinct nodes for `key`, primary first.
    ///
    /// Starts at the first ring point at or after the key's position, wraps
    /// around once, and yields every node exactly once. Deterministic and
    /// restartable: repeated calls with the same key and membership yield
    /// the same sequence.
    pub fn nodes_for(&self, key: &str) -> impl Iterator<Item = &NodeAddr> {
        let point = ring_point(key);
        self.points
            .range(point..)
            .chain(self.points.range(..point))
            .map(|(_, node)| node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn three_nodes() -> HashRing {
        HashRing::new(["n1:6090", "n2:6090", "n3:6090"].map(NodeAddr::from))
    }

    #[test]
    fn iteration_is_deterministic() {
        let ring = three_nodes();
        let first: Vec<_> = ring.nodes_for("https://example.com").cloned().collect();
        let second: Vec<_> = ring.nodes_for("https://example.com").cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn iteration_yields_each_node_once() {
        let ring = three_nodes();
        let nodes: Vec<_> = ring.nodes_for("some-key").cloned().collect();
        let distinct: BTreeSet<_> = nodes.iter().cloned().collect();

        assert_eq!(nodes.len(), 3);
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn empty_ring_yields_nothing() {
        let ring = HashRing::default();
        assert!(ring.is_empty());
        assert_eq!(ring.nodes_for("key").count(), 0);
    }

    #[test]
    fn removal_only_moves_keys_owned_by_the_removed_node() {
        let mut ring = three_nodes();
        let keys: Vec<String> = (0..200).map(|i| format!("https://example.com/{i}")).collect();

        let before: Vec<NodeAddr> = keys
            .iter()
            .map(|k| ring.nodes_for(k).next().cloned().unwrap())
            .collect();

        let removed = NodeAddr::from("n2:6090");
        ring.remove_node(&removed);
        assert_eq!(ring.len(), 2);

        for (key, old_primary) in keys.iter().zip(&before) {
            let new_primary = ring.nodes_for(key).next().cloned().unwrap();
            if *old_primary != removed {
                assert_eq!(new_primary, *old_primary, "key {key} moved needlessly");
            } else {
                assert_ne!(new_primary, removed);
            }
        }
    }

    #[test]
    fn add_node_takes_over_some_keys() {
        let mut ring = three_nodes();
        let keys: Vec<String> = (0..200).map(|i| format!("page-{i}")).collect();

        ring.add_node(NodeAddr::from("n4:6090"));
        let owned_by_new = keys
            .iter()
            .filter(|k| ring.nodes_for(k).next().map(NodeAddr::as_str) == Some("n4:6090"))
            .count();

        assert!(owned_by_new > 0, "new node owns no keys");
        assert!(owned_by_new < keys.len(), "new node owns every key");
    }
}
