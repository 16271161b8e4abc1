//! A queue node: the per-address owner of segment stores.
//!
//! Each node owns one store per priority class, one incremental lane for
//! items that finished a full processing pass, and one backup store per peer
//! whose replicas it holds. Stores are created lazily on first use; the
//! directory layout under the node's data dir is:
//!
//! ```text
//! <data_dir>/
//! ├─ dedup.snapshot      # bloom filter snapshot (when dedup is enabled)
//! ├─ proxy.status        # proxy buffer state (written by the proxy)
//! ├─ p0/ p1/ ...         # one segment store per priority class
//! ├─ incremental/
//! └─ backup_<owner>/     # one per peer owner
//! ```

use crate::config::QueueConfig;
use crate::dedup::DedupGate;
use crate::error::{CoreError, CoreResult};
use crate::types::NodeAddr;
use frontier_codec::WorkItem;
use frontier_store::{SegmentStore, StoreConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// File name of the dedup gate snapshot inside a node's data dir.
pub const DEDUP_SNAPSHOT_FILE: &str = "dedup.snapshot";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StoreKey {
    Priority(usize),
    Incremental,
    Backup(NodeAddr),
}

struct NodeStores<T: WorkItem> {
    map: HashMap<StoreKey, Arc<SegmentStore<T>>>,
    open: bool,
}

/// A queue node owning the stores for one node address.
///
/// All operations are synchronous and safe under concurrent call; each
/// underlying store serializes its own mutations.
pub struct QueueNode<T: WorkItem> {
    addr: NodeAddr,
    config: QueueConfig,
    gate: Option<Arc<DedupGate>>,
    stores: Mutex<NodeStores<T>>,
}

impl<T: WorkItem> QueueNode<T> {
    /// Opens a queue node, creating its data directory if missing.
    ///
    /// When `config.dedup_capacity` is non-zero, the node opens a dedup gate
    /// from its last snapshot (or fresh) and attaches it to the priority
    /// stores' put path.
    pub fn open(addr: NodeAddr, config: QueueConfig) -> CoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let gate = if config.dedup_capacity > 0 {
            let path = config.data_dir.join(DEDUP_SNAPSHOT_FILE);
            Some(Arc::new(DedupGate::open(
                path,
                config.dedup_capacity,
                config.dedup_error_rate,
            )?))
        } else {
            None
        };

        info!(addr = %addr, dir = %config.data_dir.display(), "queue node opened");
        Ok(Self {
            addr,
            config,
            gate,
            stores: Mutex::new(NodeStores {
                map: HashMap::new(),
                open: true,
            }),
        })
    }

    /// Returns this node's address.
    #[must_use]
    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Returns this node's configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the dedup gate, if deduplication is enabled.
    #[must_use]
    pub fn gate(&self) -> Option<&Arc<DedupGate>> {
        self.gate.as_ref()
    }

    /// Appends items to the given priority store.
    ///
    /// Returns the number of items written; gate-dropped duplicates are not
    /// counted.
    pub fn put(&self, items: &[T], force: bool, priority: usize) -> CoreResult<usize> {
        self.validate_priority(priority)?;
        let store = self.store(StoreKey::Priority(priority))?;
        Ok(store.put_batch(items, force)?)
    }

    /// Appends replica items to the backup store for `owner`.
    ///
    /// Backup lanes carry no dedup gate: the owner's primary store already
    /// decided admission.
    pub fn put_backup(&self, owner: &NodeAddr, items: &[T], force: bool) -> CoreResult<usize> {
        let store = self.store(StoreKey::Backup(owner.clone()))?;
        Ok(store.put_batch(items, force)?)
    }

    /// Appends items to the incremental lane.
    pub fn put_incremental(&self, items: &[T]) -> CoreResult<usize> {
        let store = self.store(StoreKey::Incremental)?;
        Ok(store.put_batch(items, true)?)
    }

    /// Pops up to `size` items from the given priority store, FIFO.
    pub fn get(&self, size: usize, priority: usize) -> CoreResult<Vec<T>> {
        self.validate_priority(priority)?;
        let store = self.store(StoreKey::Priority(priority))?;
        Ok(store.get_batch(size)?)
    }

    /// Pops up to `size` replica items held for `owner`.
    ///
    /// Used only during recovery, never by normal consumers.
    pub fn get_backup(&self, owner: &NodeAddr, size: usize) -> CoreResult<Vec<T>> {
        let store = self.store(StoreKey::Backup(owner.clone()))?;
        Ok(store.get_batch(size)?)
    }

    /// Pops up to `size` items from the incremental lane.
    pub fn get_incremental(&self, size: usize) -> CoreResult<Vec<T>> {
        let store = self.store(StoreKey::Incremental)?;
        Ok(store.get_batch(size)?)
    }

    /// Syncs every open store to durable storage.
    pub fn flush(&self) -> CoreResult<()> {
        let stores = self.stores.lock();
        for store in stores.map.values() {
            store.flush()?;
        }
        Ok(())
    }

    /// Shuts down every owned store and saves the dedup snapshot.
    ///
    /// Idempotent; afterwards all operations fail with the store's `Closed`
    /// error.
    pub fn shutdown(&self) -> CoreResult<()> {
        let mut stores = self.stores.lock();
        if !stores.open {
            return Ok(());
        }
        for store in stores.map.values() {
            store.shutdown()?;
        }
        stores.map.clear();
        stores.open = false;
        drop(stores);

        if let Some(gate) = &self.gate {
            gate.save()?;
        }
        info!(addr = %self.addr, "queue node shut down");
        Ok(())
    }

    fn validate_priority(&self, priority: usize) -> CoreResult<()> {
        if priority >= self.config.n_priorities {
            return Err(CoreError::InvalidPriority {
                priority,
                n_priorities: self.config.n_priorities,
            });
        }
        Ok(())
    }

    fn store_dir(&self, key: &StoreKey) -> PathBuf {
        let name = match key {
            StoreKey::Priority(p) => format!("p{p}"),
            StoreKey::Incremental => "incremental".to_string(),
            StoreKey::Backup(owner) => format!("backup_{}", owner.dir_name()),
        };
        self.config.data_dir.join(name)
    }

    fn store(&self, key: StoreKey) -> CoreResult<Arc<SegmentStore<T>>> {
        let mut stores = self.stores.lock();
        if !stores.open {
            return Err(frontier_store::StoreError::Closed.into());
        }
        if let Some(store) = stores.map.get(&key) {
            return Ok(Arc::clone(store));
        }

        let dir = self.store_dir(&key);
        let config = StoreConfig::new()
            .segment_capacity(self.config.segment_capacity)
            .flush_each_put(self.config.flush_each_put);

        // The gate filters primary lanes only; backup replicas were admitted
        // by their owner, and incremental items already ran once.
        let store = match (&key, &self.gate) {
            (StoreKey::Priority(_), Some(gate)) => Arc::new(SegmentStore::open_with_gate(
                &dir,
                config,
                Arc::clone(gate) as Arc<dyn frontier_store::AdmissionGate>,
            )?),
            _ => Arc::new(SegmentStore::open(&dir, config)?),
        };

        debug!(addr = %self.addr, dir = %dir.display(), "store created");
        stores.map.insert(key, Arc::clone(&store));
        Ok(store)
    }
}

impl<T: WorkItem> std::fmt::Debug for QueueNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueNode")
            .field("addr", &self.addr)
            .field("n_priorities", &self.config.n_priorities)
            .field("stores", &self.stores.lock().map.len())
            .finish_non_exhaustive()
    }
}
