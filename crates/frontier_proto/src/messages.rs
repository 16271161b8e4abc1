//! Request and response payloads for the node RPC surface.
//!
//! Items travel as already-tagged payload byte strings (see
//! `frontier_codec`), so the wire layer never needs to know the item type.
//! The [`Request`] enum is the protocol's dispatch table: every operation a
//! node serves is a variant here, and a server handles them with one
//! exhaustive `match` — adding an operation without wiring a handler fails
//! to compile.

use serde::{Deserialize, Serialize};

/// Every operation name the protocol defines, in dispatch order.
pub const OPERATIONS: &[&str] = &[
    "put",
    "put_backup",
    "get",
    "get_backup",
    "get_incremental",
    "flush",
];

/// A request to a queue node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Append items to a priority store.
    Put {
        /// Tagged item payloads.
        items: Vec<Vec<u8>>,
        /// Bypass the dedup gate.
        force: bool,
        /// Target priority class.
        priority: u32,
    },

    /// Append replica items to the backup store for `owner`.
    PutBackup {
        /// Address of the owning node.
        owner: String,
        /// Tagged item payloads.
        items: Vec<Vec<u8>>,
        /// Bypass the dedup gate.
        force: bool,
    },

    /// Pop up to `size` items from a priority store.
    Get {
        /// Maximum number of items to return.
        size: u32,
        /// Source priority class.
        priority: u32,
    },

    /// Pop up to `size` replica items held for `owner`.
    GetBackup {
        /// Address of the owning node.
        owner: String,
        /// Maximum number of items to return.
        size: u32,
    },

    /// Pop up to `size` items from the incremental lane.
    GetIncremental {
        /// Maximum number of items to return.
        size: u32,
    },

    /// Sync every store on the node to durable storage.
    Flush,
}

impl Request {
    /// Returns the operation name for logging and dispatch tables.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::PutBackup { .. } => "put_backup",
            Self::Get { .. } => "get",
            Self::GetBackup { .. } => "get_backup",
            Self::GetIncremental { .. } => "get_incremental",
            Self::Flush => "flush",
        }
    }
}

/// A queue node's answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// A put-style operation completed.
    Done {
        /// Number of items actually written (dedup drops excluded).
        accepted: u64,
    },

    /// A get-style operation completed; may be empty.
    Items {
        /// Tagged item payloads, FIFO order.
        items: Vec<Vec<u8>>,
    },

    /// The operation failed on the node.
    Error {
        /// Description of the failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_is_a_listed_operation() {
        let requests = [
            Request::Put {
                items: vec![],
                force: false,
                priority: 0,
            },
            Request::PutBackup {
                owner: "n1:6090".into(),
                items: vec![],
                force: false,
            },
            Request::Get {
                size: 1,
                priority: 0,
            },
            Request::GetBackup {
                owner: "n1:6090".into(),
                size: 1,
            },
            Request::GetIncremental { size: 1 },
            Request::Flush,
        ];

        for request in &requests {
            assert!(OPERATIONS.contains(&request.op()), "{}", request.op());
        }
        assert_eq!(requests.len(), OPERATIONS.len());
    }

    #[test]
    fn request_round_trips_through_cbor() {
        let request = Request::Put {
            items: vec![vec![1, b'u', b'r', b'l']],
            force: true,
            priority: 1,
        };

        let mut encoded = Vec::new();
        ciborium::into_writer(&request, &mut encoded).unwrap();
        let decoded: Request = ciborium::from_reader(encoded.as_slice()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_round_trips_through_cbor() {
        let response = Response::Items {
            items: vec![vec![2, 0xA1], vec![1, b'x']],
        };

        let mut encoded = Vec::new();
        ciborium::into_writer(&response, &mut encoded).unwrap();
        let decoded: Response = ciborium::from_reader(encoded.as_slice()).unwrap();
        assert_eq!(decoded, response);
    }
}
