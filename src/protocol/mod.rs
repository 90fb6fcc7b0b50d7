//! Wire protocol — command/verdict types and the framed JSON codec.
//!
//! A client opens a TLS connection, writes one length-prefixed JSON
//! [`Command`], reads back one length-prefixed JSON [`Verdict`] (or a
//! [`WireError`] for malformed requests), and disconnects.

pub mod codec;
pub mod types;

pub use codec::{FrameCodec, MAX_FRAME_LEN, decode_command, encode_response};
pub use types::{Command, OperationKind, Response, Verdict, WireError};
