//! Error types for payload encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding item payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// CBOR serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// The payload is empty and carries no encoding tag.
    #[error("empty payload")]
    EmptyPayload,

    /// The leading tag byte does not name a known encoding.
    #[error("unknown encoding tag: {tag:#04x}")]
    UnknownTag {
        /// The unrecognized tag byte.
        tag: u8,
    },

    /// A text-tagged payload was decoded into a type without a text form.
    #[error("item type has no text representation")]
    TextUnsupported,

    /// A text-tagged payload is not valid UTF-8.
    #[error("text payload is not valid UTF-8")]
    InvalidText,
}

impl CodecError {
    /// Creates an encode error from any displayable cause.
    pub fn encode(cause: impl std::fmt::Display) -> Self {
        Self::Encode(cause.to_string())
    }

    /// Creates a decode error from any displayable cause.
    pub fn decode(cause: impl std::fmt::Display) -> Self {
        Self::Decode(cause.to_string())
    }
}
