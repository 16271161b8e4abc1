//! Error types for segment store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during segment store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store directory's lock file already exists.
    ///
    /// Either another live process owns the directory, or a previous owner
    /// crashed before calling `shutdown`. Not retried automatically; the
    /// operator must remove the stale lock after verifying no owner is alive.
    #[error("store already locked: {path}")]
    AlreadyLocked {
        /// The store directory.
        path: PathBuf,
    },

    /// The store directory contains an entry that is neither a segment file
    /// nor the lock file.
    ///
    /// This signals an unclean prior shutdown or foreign writes into the
    /// directory. No auto-repair is attempted.
    #[error("store not safely shut down: unexpected entry {entry:?} in {path}")]
    NotSafelyShutdown {
        /// The store directory.
        path: PathBuf,
        /// The offending directory entry.
        entry: String,
    },

    /// A single serialized item does not fit in one segment.
    ///
    /// Permanent for this item; raise the segment capacity or reject the
    /// item upstream.
    #[error("item of {size} bytes exceeds segment capacity of {capacity} bytes")]
    NoSpaceForPut {
        /// The framed size of the item.
        size: usize,
        /// The configured segment capacity.
        capacity: usize,
    },

    /// Segment content is unreadable. Fatal for this store.
    #[error("store corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The store has been shut down.
    #[error("store is closed")]
    Closed,

    /// Payload encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] frontier_codec::CodecError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
