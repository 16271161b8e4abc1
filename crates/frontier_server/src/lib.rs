//! # Frontier Server
//!
//! TCP transport for frontier queue nodes.
//!
//! [`QueueServer`] exposes a local `QueueNode` to the cluster; [`TcpPeer`]
//! is the matching blocking client, plugged into the queue proxy through the
//! core's `PeerClient` trait. Both speak the framed CBOR protocol defined in
//! `frontier_proto`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod server;

pub use client::TcpPeer;
pub use error::{ServerError, ServerResult};
pub use server::QueueServer;
