//! Client-facing queue proxy: batching, routing, and buffer persistence.
//!
//! Producers hand whole batches to [`QueueProxy::put`]; the proxy runs the
//! distributor, buffers the per-destination groups in memory, and issues one
//! batched call (local, or RPC through a [`PeerClient`]) whenever a buffer
//! reaches the configured threshold. Replication is store-and-forward:
//! backup copies ride the same buffers and may lag their primaries.
//!
//! Buffer state survives restarts through a CBOR status file next to the
//! node's stores, rewritten atomically after every mutation.

use crate::config::QueueConfig;
use crate::distribute::distribute;
use crate::error::{CoreError, CoreResult};
use crate::node::QueueNode;
use crate::persist::write_atomic;
use crate::ring::HashRing;
use crate::types::NodeAddr;
use frontier_codec::WorkItem;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// File name of the proxy status snapshot inside a node's data dir.
pub const PROXY_STATUS_FILE: &str = "proxy.status";

/// Issues queue operations against a remote node.
///
/// The proxy only depends on this trait; the TCP implementation lives in the
/// server crate, and tests substitute an in-process loopback.
pub trait PeerClient<T: WorkItem>: Send + Sync {
    /// Appends items to a remote node's priority store.
    fn put(&self, node: &NodeAddr, items: &[T], force: bool, priority: usize)
        -> CoreResult<usize>;

    /// Appends replica items to a remote node's backup store for `owner`.
    fn put_backup(
        &self,
        node: &NodeAddr,
        owner: &NodeAddr,
        items: &[T],
        force: bool,
    ) -> CoreResult<usize>;

    /// Pops up to `size` items from a remote node's priority store.
    fn get(&self, node: &NodeAddr, size: usize, priority: usize) -> CoreResult<Vec<T>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    node: NodeAddr,
    priority: usize,
    force: bool,
}

struct Buffers<T> {
    outputs: HashMap<BucketKey, Vec<T>>,
    backups: HashMap<NodeAddr, HashMap<NodeAddr, Vec<T>>>,
    initialized: BTreeSet<NodeAddr>,
}

impl<T> Default for Buffers<T> {
    fn default() -> Self {
        Self {
            outputs: HashMap::new(),
            backups: HashMap::new(),
            initialized: BTreeSet::new(),
        }
    }
}

/// Serialized form of the proxy's buffer state.
#[derive(Serialize, Deserialize)]
struct ProxyStatus<T> {
    outputs: Vec<(NodeAddr, usize, bool, Vec<T>)>,
    initialized: Vec<NodeAddr>,
    backups: Vec<(NodeAddr, NodeAddr, Vec<T>)>,
}

/// The batching front door to a cluster of queue nodes.
pub struct QueueProxy<T: WorkItem, C: PeerClient<T>> {
    ring: HashRing,
    local: Arc<QueueNode<T>>,
    peers: Vec<NodeAddr>,
    client: C,
    threshold: usize,
    copies: usize,
    status_path: PathBuf,
    buffers: Mutex<Buffers<T>>,
}

impl<T: WorkItem, C: PeerClient<T>> QueueProxy<T, C> {
    /// Opens a proxy over the local node and its peers.
    ///
    /// `peers` fixes the iteration order for remote `get` fallback. Any
    /// previously persisted buffer state is reloaded from the status file.
    pub fn open(local: Arc<QueueNode<T>>, peers: Vec<NodeAddr>, client: C) -> CoreResult<Self> {
        let peers: Vec<NodeAddr> = peers
            .into_iter()
            .filter(|peer| peer != local.addr())
            .collect();

        let mut ring = HashRing::new(peers.iter().cloned());
        ring.add_node(local.addr().clone());

        let config = local.config();
        let threshold = config.batch_threshold;
        let copies = config.copies;
        let status_path = config.data_dir.join(PROXY_STATUS_FILE);
        let buffers = load_status(&status_path)?;

        Ok(Self {
            ring,
            local,
            peers,
            client,
            threshold,
            copies,
            status_path,
            buffers: Mutex::new(buffers),
        })
    }

    /// Returns the local node handle.
    #[must_use]
    pub fn local(&self) -> &Arc<QueueNode<T>> {
        &self.local
    }

    /// Distributes and buffers a batch of items.
    ///
    /// Buckets that reach the batch threshold are flushed immediately as a
    /// single batched put per destination; everything else stays buffered
    /// until [`flush_all`](Self::flush_all) or a later threshold crossing.
    pub fn put(&self, items: Vec<T>, force: bool, priority: usize) -> CoreResult<()> {
        let n_priorities = self.local.config().n_priorities;
        if priority >= n_priorities {
            return Err(CoreError::InvalidPriority {
                priority,
                n_priorities,
            });
        }
        if items.is_empty() {
            return Ok(());
        }
        if self.ring.is_empty() {
            return Err(CoreError::NoNodesAvailable);
        }

        let dist = distribute(&self.ring, items, self.copies);

        let mut buffers = self.buffers.lock();
        for (node, batch) in dist.primaries {
            buffers.initialized.insert(node.clone());
            let key = BucketKey {
                node,
                priority,
                force,
            };
            let buffer = buffers.outputs.entry(key.clone()).or_default();
            buffer.extend(batch);

            if buffer.len() >= self.threshold {
                let batch = buffers.outputs.remove(&key).unwrap_or_default();
                self.deliver(&key.node, batch, force, priority)?;
            }
        }

        for (node, per_owner) in dist.backups {
            buffers.initialized.insert(node.clone());
            let group = buffers.backups.entry(node.clone()).or_default();
            for (owner, batch) in per_owner {
                group.entry(owner).or_default().extend(batch);
            }

            let total: usize = group.values().map(Vec::len).sum();
            if total >= self.threshold {
                let group = buffers.backups.remove(&node).unwrap_or_default();
                self.deliver_backups(&node, group)?;
            }
        }

        self.save_status(&buffers)
    }

    /// Flushes every buffered batch, regardless of size.
    pub fn flush_all(&self) -> CoreResult<()> {
        let mut buffers = self.buffers.lock();

        let outputs = std::mem::take(&mut buffers.outputs);
        for (key, batch) in outputs {
            if batch.is_empty() {
                continue;
            }
            self.deliver(&key.node, batch, key.force, key.priority)?;
        }

        let backups = std::mem::take(&mut buffers.backups);
        for (node, group) in backups {
            self.deliver_backups(&node, group)?;
        }

        self.save_status(&buffers)
    }

    /// Pops up to `size` items, local node first, then peers in fixed order.
    ///
    /// A peer that errors is skipped with a warning; the sweep returns the
    /// first non-empty batch, or empty when every source is exhausted.
    pub fn get(&self, size: usize, priority: usize) -> CoreResult<Vec<T>> {
        let items = self.local.get(size, priority)?;
        if !items.is_empty() {
            return Ok(items);
        }

        for peer in &self.peers {
            match self.client.get(peer, size, priority) {
                Ok(items) if !items.is_empty() => return Ok(items),
                Ok(_) => {}
                Err(err) => {
                    warn!(peer = %peer, error = %err, "peer get failed, trying next");
                }
            }
        }
        Ok(Vec::new())
    }

    /// Returns the number of buffered, not-yet-flushed items.
    #[must_use]
    pub fn pending(&self) -> usize {
        let buffers = self.buffers.lock();
        let outputs: usize = buffers.outputs.values().map(Vec::len).sum();
        let backups: usize = buffers
            .backups
            .values()
            .flat_map(|group| group.values())
            .map(Vec::len)
            .sum();
        outputs + backups
    }

    /// Persists the buffer state without flushing it.
    ///
    /// Buffered items survive a restart through the status file; call
    /// [`flush_all`](Self::flush_all) first to push them out instead.
    pub fn shutdown(&self) -> CoreResult<()> {
        let buffers = self.buffers.lock();
        self.save_status(&buffers)
    }

    fn deliver(&self, node: &NodeAddr, items: Vec<T>, force: bool, priority: usize) -> CoreResult<()> {
        debug!(node = %node, count = items.len(), priority, "flushing put batch");
        if node == self.local.addr() {
            self.local.put(&items, force, priority)?;
        } else {
            self.client.put(node, &items, force, priority)?;
        }
        Ok(())
    }

    fn deliver_backups(
        &self,
        node: &NodeAddr,
        group: HashMap<NodeAddr, Vec<T>>,
    ) -> CoreResult<()> {
        for (owner, items) in group {
            if items.is_empty() {
                continue;
            }
            debug!(node = %node, owner = %owner, count = items.len(), "flushing backup batch");
            // Replicas are never re-gated at the destination.
            if node == self.local.addr() {
                self.local.put_backup(&owner, &items, true)?;
            } else {
                self.client.put_backup(node, &owner, &items, true)?;
            }
        }
        Ok(())
    }

    fn save_status(&self, buffers: &Buffers<T>) -> CoreResult<()> {
        let status = ProxyStatus {
            outputs: buffers
                .outputs
                .iter()
                .map(|(key, items)| {
                    (key.node.clone(), key.priority, key.force, items.clone())
                })
                .collect(),
            initialized: buffers.initialized.iter().cloned().collect(),
            backups: buffers
                .backups
                .iter()
                .flat_map(|(node, group)| {
                    group
                        .iter()
                        .map(|(owner, items)| (node.clone(), owner.clone(), items.clone()))
                })
                .collect(),
        };

        let mut encoded = Vec::new();
        ciborium::into_writer(&status, &mut encoded)
            .map_err(|err| CoreError::invalid_snapshot(err.to_string()))?;
        write_atomic(&self.status_path, &encoded)
    }
}

fn load_status<T: WorkItem>(path: &std::path::Path) -> CoreResult<Buffers<T>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Buffers::default());
        }
        Err(err) => return Err(err.into()),
    };

    let status: ProxyStatus<T> = ciborium::from_reader(data.as_slice())
        .map_err(|err| CoreError::invalid_snapshot(err.to_string()))?;

    let mut buffers = Buffers::default();
    for (node, priority, force, items) in status.outputs {
        buffers
            .outputs
            .entry(BucketKey {
                node,
                priority,
                force,
            })
            .or_default()
            .extend(items);
    }
    for (node, owner, items) in status.backups {
        buffers
            .backups
            .entry(node)
            .or_default()
            .entry(owner)
            .or_default()
            .extend(items);
    }
    buffers.initialized = status.initialized.into_iter().collect();
    Ok(buffers)
}

impl<T: WorkItem, C: PeerClient<T>> std::fmt::Debug for QueueProxy<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueProxy")
            .field("local", self.local.addr())
            .field("peers", &self.peers)
            .field("threshold", &self.threshold)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
