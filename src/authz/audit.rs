//! Audit logging for authorization decisions.
//!
//! Every event is emitted via `tracing::info!` with the serialized record in
//! an `audit` field, making the trail queryable by any log aggregator.
//! Emission is fire-and-forget and never blocks a session.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `authz.granted` | A command was verified and the policy allowed it |
//! | `authz.denied` | Credentials rejected or policy refused/missing |
//! | `command.invalid` | The request frame was malformed or named an unknown op |
//! | `session.rejected` | A connection was refused (session limit reached) |
//!
//! Passwords never appear in any event.

use serde::Serialize;

/// Structured audit record for one session-level event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"authz.granted"`).
    pub event: &'static str,
    /// Email the command claimed, when one was parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Resource the command asked about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Pattern of the policy rule that decided the outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Peer description: socket address, plus certificate CN when mTLS is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    /// Cause for denial/rejection events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    /// An `authz.granted` event.
    #[must_use]
    pub fn granted(email: &str, resource: &str, pattern: Option<&str>) -> Self {
        Self {
            event: "authz.granted",
            email: Some(email.to_string()),
            resource: Some(resource.to_string()),
            pattern: pattern.map(ToString::to_string),
            peer: None,
            reason: None,
        }
    }

    /// An `authz.denied` event.
    #[must_use]
    pub fn denied(email: &str, resource: &str, reason: impl Into<String>) -> Self {
        Self {
            event: "authz.denied",
            email: Some(email.to_string()),
            resource: Some(resource.to_string()),
            pattern: None,
            peer: None,
            reason: Some(reason.into()),
        }
    }

    /// A `command.invalid` event.
    #[must_use]
    pub fn invalid(peer: &str, reason: impl Into<String>) -> Self {
        Self {
            event: "command.invalid",
            email: None,
            resource: None,
            pattern: None,
            peer: Some(peer.to_string()),
            reason: Some(reason.into()),
        }
    }

    /// A `session.rejected` event.
    #[must_use]
    pub fn rejected(peer: &str, reason: impl Into<String>) -> Self {
        Self {
            event: "session.rejected",
            email: None,
            resource: None,
            pattern: None,
            peer: Some(peer.to_string()),
            reason: Some(reason.into()),
        }
    }

    /// Attach peer information to a decision event.
    #[must_use]
    pub fn with_peer(mut self, peer: &str) -> Self {
        self.peer = Some(peer.to_string());
        self
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "authz audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
