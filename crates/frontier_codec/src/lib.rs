//! # Frontier Codec
//!
//! Payload encoding for frontier work items.
//!
//! Every item stored in a segment store or shipped over the node RPC surface
//! is a single byte string: a 1-byte encoding tag followed by the serialized
//! item. Two encodings exist:
//!
//! - [`TAG_TEXT`] — the item is raw UTF-8 text. This is the fast path for the
//!   overwhelmingly common case where a work item is just a URL.
//! - [`TAG_CBOR`] — the item is CBOR-encoded via serde. Any item type that
//!   has no plain text form falls back to this.
//!
//! The tag makes decoding symmetric: a reader never has to guess which
//! scheme produced the bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;

/// Tag byte for raw UTF-8 text payloads.
pub const TAG_TEXT: u8 = 1;

/// Tag byte for CBOR payloads.
pub const TAG_CBOR: u8 = 2;

/// A unit of work that can live in the frontier queue.
///
/// The [`label`](WorkItem::label) is the item's identity for consistent-hash
/// placement and dedup admission; two items with the same label are the same
/// piece of work.
///
/// Types whose natural representation is a single string (URLs, keys) should
/// override [`as_text`](WorkItem::as_text) and
/// [`from_text`](WorkItem::from_text) to take the raw-text encoding path and
/// skip the CBOR envelope.
pub trait WorkItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the string key used for hashing and deduplication.
    fn label(&self) -> Cow<'_, str>;

    /// Returns the item's plain text form, if it has one.
    fn as_text(&self) -> Option<&str> {
        None
    }

    /// Rebuilds an item from its plain text form.
    ///
    /// Must be the inverse of [`as_text`](WorkItem::as_text). Returns `None`
    /// for types without a text form.
    fn from_text(text: String) -> Option<Self> {
        let _ = text;
        None
    }
}

impl WorkItem for String {
    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }

    fn as_text(&self) -> Option<&str> {
        Some(self)
    }

    fn from_text(text: String) -> Option<Self> {
        Some(text)
    }
}

/// Encodes an item into a tagged payload.
///
/// Text-capable items encode as `[TAG_TEXT, utf8 bytes...]`; everything else
/// as `[TAG_CBOR, cbor bytes...]`.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if CBOR serialization fails.
pub fn encode_item<T: WorkItem>(item: &T) -> CodecResult<Vec<u8>> {
    if let Some(text) = item.as_text() {
        let mut buf = Vec::with_capacity(1 + text.len());
        buf.push(TAG_TEXT);
        buf.extend_from_slice(text.as_bytes());
        return Ok(buf);
    }

    let mut buf = vec![TAG_CBOR];
    ciborium::into_writer(item, &mut buf).map_err(CodecError::encode)?;
    Ok(buf)
}

/// Decodes an item from a tagged payload.
///
/// # Errors
///
/// Returns an error if the payload is empty, carries an unknown tag, is not
/// valid UTF-8 for a text payload, cannot be rebuilt from text by this item
/// type, or fails CBOR deserialization.
pub fn decode_item<T: WorkItem>(payload: &[u8]) -> CodecResult<T> {
    let (&tag, body) = payload.split_first().ok_or(CodecError::EmptyPayload)?;

    match tag {
        TAG_TEXT => {
            let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidText)?;
            T::from_text(text.to_owned()).ok_or(CodecError::TextUnsupported)
        }
        TAG_CBOR => ciborium::from_reader(body).map_err(CodecError::decode),
        other => Err(CodecError::UnknownTag { tag: other }),
    }
}
