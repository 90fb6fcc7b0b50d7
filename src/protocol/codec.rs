//! Length-prefixed JSON framing.
//!
//! Every message on the wire is a 4-byte big-endian length followed by that
//! many bytes of UTF-8 JSON, in both directions. TCP gives a byte stream,
//! not message boundaries; a single `recv` may return a fragment or coalesce
//! two writes, so explicit framing is mandatory rather than optional.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::LengthDelimitedCodec;

use crate::{Error, Result};

use super::types::{Command, Response};

/// Upper bound on a single frame. A command is a few hundred bytes in
/// practice; anything near this limit is garbage or abuse.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// The framed transport codec: u32 big-endian length prefix, payload capped
/// at [`MAX_FRAME_LEN`].
pub type FrameCodec = LengthDelimitedCodec;

/// Build the codec with the frame-size cap applied.
#[must_use]
pub fn frame_codec() -> FrameCodec {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Parse one received frame into a [`Command`].
///
/// # Errors
///
/// Returns [`Error::MalformedCommand`] when the payload is not valid JSON or
/// is missing required fields. The op itself is validated later by
/// [`Command::operation`].
pub fn decode_command(frame: &BytesMut) -> Result<Command> {
    serde_json::from_slice(frame).map_err(|e| Error::MalformedCommand(e.to_string()))
}

/// Serialize a [`Response`] into a frame payload.
pub fn encode_response(response: &Response) -> Result<Bytes> {
    let payload = serde_json::to_vec(response)?;
    Ok(Bytes::from(payload))
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use pretty_assertions::assert_eq;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use crate::protocol::types::Verdict;

    use super::*;

    fn command_json() -> Vec<u8> {
        br#"{"op":"is_authorized","email":"a@b.org","password":"pw","resource":"/srv"}"#.to_vec()
    }

    /// Write one framed payload and return the raw wire bytes.
    async fn frame_on_the_wire(payload: Vec<u8>) -> Vec<u8> {
        let cursor = std::io::Cursor::new(Vec::new());
        let mut writer = FramedWrite::new(cursor, frame_codec());
        writer.send(Bytes::from(payload)).await.unwrap();
        writer.into_inner().into_inner()
    }

    #[tokio::test]
    async fn frame_roundtrips_through_the_codec() {
        // GIVEN: a command payload written through the framed sink
        let buf = frame_on_the_wire(command_json()).await;

        // WHEN: reading it back through the framed stream
        let mut reader = FramedRead::new(buf.as_slice(), frame_codec());
        let frame = reader.next().await.unwrap().unwrap();

        // THEN: the payload decodes into the original command
        let cmd = decode_command(&frame).unwrap();
        assert_eq!(cmd.resource, "/srv");
    }

    #[tokio::test]
    async fn split_delivery_still_yields_one_frame() {
        // GIVEN: a frame delivered one byte at a time (worst-case TCP fragmentation)
        let buf = frame_on_the_wire(command_json()).await;

        let (client, server) = tokio::io::duplex(1);
        let write_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut client = client;
            for byte in buf {
                client.write_all(&[byte]).await.unwrap();
            }
        });

        // WHEN: reading through the codec
        let mut reader = FramedRead::new(server, frame_codec());
        let frame = reader.next().await.unwrap().unwrap();
        write_task.await.unwrap();

        // THEN: exactly the full payload comes out
        assert!(decode_command(&frame).is_ok());
    }

    #[tokio::test]
    async fn oversize_frame_is_rejected() {
        // GIVEN: a length prefix claiming more than MAX_FRAME_LEN
        let mut wire = Vec::new();
        wire.extend_from_slice(&u32::try_from(MAX_FRAME_LEN + 1).unwrap().to_be_bytes());
        wire.extend_from_slice(&[b'x'; 16]);

        // WHEN: reading
        let mut reader = FramedRead::new(wire.as_slice(), frame_codec());
        let result = reader.next().await.unwrap();

        // THEN: the codec errors instead of buffering unbounded data
        assert!(result.is_err());
    }

    #[test]
    fn invalid_json_maps_to_malformed_command() {
        let frame = BytesMut::from(&b"not json at all"[..]);
        let err = decode_command(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedCommand(_)));
    }

    #[test]
    fn missing_field_maps_to_malformed_command() {
        // `password` absent
        let frame =
            BytesMut::from(&br#"{"op":"is_authorized","email":"a@b.org","resource":"/x"}"#[..]);
        let err = decode_command(&frame).unwrap_err();
        assert!(matches!(err, Error::MalformedCommand(ref msg) if msg.contains("password")));
    }

    #[test]
    fn encode_response_produces_plain_json() {
        let bytes = encode_response(&Verdict::allow().into()).unwrap();
        assert_eq!(&bytes[..], br#"{"authorized":true}"#);
    }
}
