//! Protocol message types.
//!
//! The request shape matches what the known clients send:
//!
//! ```json
//! {"op": "is_authorized", "email": "...", "password": "...", "resource": "..."}
//! ```
//!
//! and the response is either a verdict (`{"authorized": bool, "reason": ...}`)
//! or an error object (`{"error": "..."}`) for requests that never reached
//! evaluation.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One command received from a client.
///
/// `op` stays a plain string at the wire level so an unrecognized operation
/// can be rejected as [`Error::UnknownOperation`] rather than collapsing into
/// a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Operation name, e.g. `"is_authorized"`.
    pub op: String,
    /// Email identifying the principal.
    pub email: String,
    /// Opaque password secret. Never logged.
    pub password: String,
    /// Resource path the principal wants to access.
    pub resource: String,
}

impl Command {
    /// Resolve the wire-level `op` string into a recognized operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownOperation`] when `op` is not in the supported
    /// set. This runs before any credential work so unsupported requests
    /// fail fast and uniformly.
    pub fn operation(&self) -> Result<OperationKind> {
        match self.op.as_str() {
            "is_authorized" => Ok(OperationKind::IsAuthorized),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }
}

/// The closed set of operations the server executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Is the credentialed principal authorized to access the resource?
    IsAuthorized,
}

/// The server's answer to an authorization query.
///
/// Created fresh per command, never cached or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether access is granted.
    pub authorized: bool,
    /// Optional human-readable reason, set on denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    /// An allow verdict.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            authorized: true,
            reason: None,
        }
    }

    /// A deny verdict with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            authorized: false,
            reason: Some(reason.into()),
        }
    }
}

/// Wire-level error object sent for requests that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// What was wrong with the request.
    pub error: String,
}

/// Everything a session can write back to its client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    /// A well-formed verdict.
    Verdict(Verdict),
    /// A protocol-level error object.
    Error(WireError),
}

impl From<Verdict> for Response {
    fn from(v: Verdict) -> Self {
        Self::Verdict(v)
    }
}

impl Response {
    /// Build the error-object response for a protocol-level failure.
    #[must_use]
    pub fn protocol_error(err: &Error) -> Self {
        Self::Error(WireError {
            error: err.to_string(),
        })
    }
}
