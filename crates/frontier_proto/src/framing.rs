//! Length-prefixed wire framing.
//!
//! Every message on a node connection is `[u32 LE length][CBOR body]`. The
//! blocking helpers here serve the client side; async servers read the
//! prefix themselves and hand the body to [`decode`].

use crate::error::{ProtoError, ProtoResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Maximum accepted frame body, covering a full batch of segment-sized
/// items with headroom.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

/// Encodes a message to its CBOR body (no length prefix).
pub fn encode<M: Serialize>(message: &M) -> ProtoResult<Vec<u8>> {
    let mut body = Vec::new();
    ciborium::into_writer(message, &mut body).map_err(ProtoError::encode)?;
    if body.len() > MAX_FRAME {
        return Err(ProtoError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME,
        });
    }
    Ok(body)
}

/// Decodes a message from its CBOR body.
pub fn decode<M: DeserializeOwned>(body: &[u8]) -> ProtoResult<M> {
    ciborium::from_reader(body).map_err(ProtoError::decode)
}

/// Writes one length-prefixed message to a blocking stream.
pub fn write_message<W: Write, M: Serialize>(writer: &mut W, message: &M) -> ProtoResult<()> {
    let body = encode(message)?;
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Reads one length-prefixed message from a blocking stream.
pub fn read_message<R: Read, M: DeserializeOwned>(reader: &mut R) -> ProtoResult<M> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME {
        return Err(ProtoError::FrameTooLarge {
            size: len,
            max: MAX_FRAME,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    decode(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Request, Response};
    use std::io::Cursor;

    #[test]
    fn message_round_trips_through_a_stream() {
        let request = Request::Get {
            size: 16,
            priority: 0,
        };

        let mut wire = Vec::new();
        write_message(&mut wire, &request).unwrap();

        let mut reader = Cursor::new(wire);
        let decoded: Request = read_message(&mut reader).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn consecutive_messages_are_separated() {
        let first = Response::Done { accepted: 3 };
        let second = Response::Items { items: vec![] };

        let mut wire = Vec::new();
        write_message(&mut wire, &first).unwrap();
        write_message(&mut wire, &second).unwrap();

        let mut reader = Cursor::new(wire);
        assert_eq!(read_message::<_, Response>(&mut reader).unwrap(), first);
        assert_eq!(read_message::<_, Response>(&mut reader).unwrap(), second);
    }

    #[test]
    fn oversized_frame_is_rejected_without_allocation() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&(u32::MAX).to_le_bytes());
        wire.extend_from_slice(&[0u8; 16]);

        let mut reader = Cursor::new(wire);
        let result = read_message::<_, Request>(&mut reader);
        assert!(matches!(result, Err(ProtoError::FrameTooLarge { .. })));
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let request = Request::Flush;
        let mut wire = Vec::new();
        write_message(&mut wire, &request).unwrap();
        wire.truncate(wire.len() - 1);

        let mut reader = Cursor::new(wire);
        let result = read_message::<_, Request>(&mut reader);
        assert!(matches!(result, Err(ProtoError::Io(_))));
    }
}
