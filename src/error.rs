//! Error types for authd

use std::io;

use thiserror::Error;

/// Result type alias for authd
pub type Result<T> = std::result::Result<T, Error>;

/// authd errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS handshake failure — the connection is dropped without a response
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Request frame could not be parsed into a command
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// The `op` field names an operation this server does not recognize
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Policy or credential store failure — always treated as a denial
    #[error("Store error: {0}")]
    Store(String),

    /// Concurrent-session limit reached; connection refused
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A read, write, or handshake exceeded its deadline
    #[error("Timed out during {0}")]
    Timeout(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server shutdown
    #[error("Server shutdown")]
    Shutdown,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error should produce a wire-level error object before
    /// the session closes.
    ///
    /// Transport-level failures (handshake, IO, timeout) get no response at
    /// all — the peer only observes the disconnect.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedCommand(_) | Self::UnknownOperation(_) | Self::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_are_reported_on_the_wire() {
        assert!(Error::MalformedCommand("bad".into()).is_protocol_error());
        assert!(Error::UnknownOperation("create_user".into()).is_protocol_error());
    }

    #[test]
    fn transport_errors_are_not_reported_on_the_wire() {
        assert!(!Error::Handshake("no cipher overlap".into()).is_protocol_error());
        assert!(!Error::Timeout("read").is_protocol_error());
        assert!(!Error::ResourceExhausted("session limit".into()).is_protocol_error());
    }
}
