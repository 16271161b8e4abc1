//! # Frontier Proto
//!
//! Payload semantics for the node-to-node RPC surface of the frontier
//! queue: typed [`Request`]/[`Response`] messages encoded as CBOR, plus
//! `[u32 LE length][body]` wire framing.
//!
//! This crate deliberately carries no transport: servers and clients are
//! built on top of it (see `frontier_server`), and tests can speak the
//! protocol over any `Read`/`Write` pair.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod framing;
mod messages;

pub use error::{ProtoError, ProtoResult};
pub use framing::{decode, encode, read_message, write_message, MAX_FRAME};
pub use messages::{Request, Response, OPERATIONS};
