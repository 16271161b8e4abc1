//! Fan-out of work-item batches to primary and backup nodes.

use crate::ring::HashRing;
use crate::types::NodeAddr;
use frontier_codec::WorkItem;
use std::collections::HashMap;

/// The result of distributing a batch across the ring.
#[derive(Debug, Clone)]
pub struct Distribution<T> {
    /// Authoritative copies: destination node to its items.
    pub primaries: HashMap<NodeAddr, Vec<T>>,
    /// Replica copies: destination node to owner node to the owner's items.
    pub backups: HashMap<NodeAddr, HashMap<NodeAddr, Vec<T>>>,
}

impl<T> Default for Distribution<T> {
    fn default() -> Self {
        Self {
            primaries: HashMap::new(),
            backups: HashMap::new(),
        }
    }
}

impl<T> Distribution<T> {
    /// Returns whether nothing was placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primaries.is_empty() && self.backups.is_empty()
    }
}

/// Groups `items` by primary node and up to `copies` backup nodes each.
///
/// For every item, the first node yielded for its label becomes the primary
/// and the next `min(copies, nodes - 1)` become backups. An empty ring
/// produces empty maps; the caller decides whether that is fatal.
pub fn distribute<T: WorkItem>(
    ring: &HashRing,
    items: Vec<T>,
    copies: usize,
) -> Distribution<T> {
    let mut dist = Distribution::default();

    for item in items {
        let label = item.label();
        let mut nodes = ring.nodes_for(&label);
        let Some(primary) = nodes.next().cloned() else {
            continue;
        };
        let backups: Vec<NodeAddr> = nodes.take(copies).cloned().collect();
        drop(label);

        for backup in backups {
            dist.backups
                .entry(backup)
                .or_default()
                .entry(primary.clone())
                .or_default()
                .push(item.clone());
        }
        dist.primaries.entry(primary).or_default().push(item);
    }

    dist
}
