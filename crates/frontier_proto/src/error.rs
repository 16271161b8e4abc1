//! Error types for protocol encoding and framing.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors that can occur while framing or translating messages.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// CBOR serialization failed.
    #[error("message encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("message decode error: {0}")]
    Decode(String),

    /// A frame's declared length exceeds the protocol limit.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// The declared frame size.
        size: usize,
        /// The protocol's frame limit.
        max: usize,
    },

    /// An I/O error occurred on the connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtoError {
    /// Creates an encode error from any displayable cause.
    pub fn encode(cause: impl std::fmt::Display) -> Self {
        Self::Encode(cause.to_string())
    }

    /// Creates a decode error from any displayable cause.
    pub fn decode(cause: impl std::fmt::Display) -> Self {
        Self::Decode(cause.to_string())
    }
}
