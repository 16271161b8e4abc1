//! # Frontier Core
//!
//! The distributed frontier queue: the subsystem that holds crawl work items
//! waiting to be fetched, shared by many producer and consumer processes
//! without a central database.
//!
//! This crate provides:
//! - [`HashRing`] — deterministic key-to-node placement with minimal
//!   disruption on membership changes
//! - [`distribute`] — fan-out of item batches to a primary node and N
//!   backup nodes
//! - [`DedupGate`] — a persisted bloom filter admitting each label at most
//!   once
//! - [`QueueNode`] — the per-address owner of priority, incremental, and
//!   backup segment stores
//! - [`QueueProxy`] — the client-facing batching layer over local calls and
//!   the [`PeerClient`] RPC seam
//!
//! Durable storage itself lives in `frontier_store`; payload encoding in
//! `frontier_codec`.

#![warn(missing_docs)]

mod config;
mod dedup;
mod distribute;
mod error;
mod node;
mod persist;
mod proxy;
mod ring;
mod types;

pub use config::QueueConfig;
pub use dedup::{DedupGate, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use distribute::{distribute, Distribution};
pub use error::{CoreError, CoreResult};
pub use node::{QueueNode, DEDUP_SNAPSHOT_FILE};
pub use proxy::{PeerClient, QueueProxy, PROXY_STATUS_FILE};
pub use ring::{ring_point, HashRing};
pub use types::NodeAddr;
