//! Error types for the node server.

use std::io;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving queue requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An I/O error occurred on the listener or a connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A protocol framing or encoding error.
    #[error("protocol error: {0}")]
    Proto(#[from] frontier_proto::ProtoError),

    /// A queue core error.
    #[error("core error: {0}")]
    Core(#[from] frontier_core::CoreError),
}
