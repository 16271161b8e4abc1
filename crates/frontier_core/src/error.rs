//! Error types for the queue core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in queue core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Segment store error.
    #[error("store error: {0}")]
    Store(#[from] frontier_store::StoreError),

    /// Payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] frontier_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The priority class does not exist on this node.
    #[error("invalid priority {priority}: node has {n_priorities} priority classes")]
    InvalidPriority {
        /// The requested priority.
        priority: usize,
        /// The number of configured priority classes.
        n_priorities: usize,
    },

    /// The hash ring is empty; no node can take the items.
    #[error("no node available")]
    NoNodesAvailable,

    /// A persisted snapshot (dedup gate, proxy status) is unreadable.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },

    /// A call to a remote queue node failed.
    #[error("remote node error: {message}")]
    Remote {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }

    /// Creates a remote node error.
    pub fn remote(message: impl std::fmt::Display) -> Self {
        Self::Remote {
            message: message.to_string(),
        }
    }
}
