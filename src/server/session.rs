//! Per-connection session handling.
//!
//! A session owns one accepted stream from handshake to close and walks a
//! fixed state machine:
//!
//! ```text
//! Handshaking → AwaitingCommand → Verifying → Evaluating → Responding → Closed
//!                      │               │
//!                      │               └─(credential rejected)─→ Responding
//!                      └─(decode failure)─→ Errored → Responding → Closed
//! ```
//!
//! `Errored` absorbs I/O failures and timeouts from any non-terminal state.
//! Nothing is retried; a failed session is torn down and the client opens a
//! new connection if it wants another attempt. Errors never cross the
//! session boundary — the supervisor and sibling sessions are unaffected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::authz::audit::{self, AuditEvent};
use crate::authz::{CredentialVerifier, Denial, DenialCause, PolicyEvaluator};
use crate::config::LimitsConfig;
use crate::protocol::types::OperationKind;
use crate::protocol::{Command, Response, Verdict, codec};
use crate::{Error, Result};

use super::tls::ClientIdentity;

/// Shared dependencies handed to every session.
pub struct SessionContext {
    /// Credential verifier over the shared store.
    pub verifier: CredentialVerifier,
    /// Policy evaluator over the shared store.
    pub evaluator: PolicyEvaluator,
    /// Timeout budget.
    pub limits: LimitsConfig,
}

/// Session lifecycle states. Terminal state is `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TLS handshake in progress.
    Handshaking,
    /// Waiting for the command frame.
    AwaitingCommand,
    /// Checking the credential pair.
    Verifying,
    /// Consulting the policy snapshot.
    Evaluating,
    /// Writing the response frame.
    Responding,
    /// Absorbing state for I/O failures and timeouts.
    Errored,
    /// Stream released.
    Closed,
}

/// One client connection, from accepted socket to close.
pub struct Session {
    peer: SocketAddr,
    state: SessionState,
}

impl Session {
    /// A session for a freshly accepted connection.
    #[must_use]
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: SessionState::Handshaking,
        }
    }

    /// Drive the session to `Closed`.
    ///
    /// Every failure is contained here: handshake errors, timeouts, and
    /// protocol violations end the session without propagating. Returns the
    /// terminal state for the supervisor's debug logging.
    pub async fn run(
        mut self,
        stream: TcpStream,
        acceptor: TlsAcceptor,
        ctx: Arc<SessionContext>,
    ) -> SessionState {
        let peer = self.peer;
        match self.drive(stream, acceptor, &ctx).await {
            Ok(()) => {}
            Err(e) => {
                self.state = SessionState::Errored;
                debug!(peer = %peer, error = %e, "Session ended with error");
            }
        }
        self.state = SessionState::Closed;
        self.state
    }

    async fn drive(
        &mut self,
        stream: TcpStream,
        acceptor: TlsAcceptor,
        ctx: &SessionContext,
    ) -> Result<()> {
        // Handshaking: no application bytes before this completes
        let tls_stream = timeout(ctx.limits.handshake_timeout, acceptor.accept(stream))
            .await
            .map_err(|_| Error::Timeout("handshake"))?
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let peer_label = self.peer_label(&tls_stream);
        self.state = SessionState::AwaitingCommand;
        debug!(peer = %peer_label, "Session established");

        let mut framed = Framed::new(tls_stream, codec::frame_codec());

        let frame = match timeout(ctx.limits.read_timeout, framed.next()).await {
            Err(_) => return Err(Error::Timeout("command read")),
            // Peer closed without sending a command
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => {
                // Oversize frame or transport failure; report what we can
                let err = Error::MalformedCommand(e.to_string());
                audit::emit(&AuditEvent::invalid(&peer_label, err.to_string()));
                self.state = SessionState::Errored;
                return self
                    .respond(&mut framed, &Response::protocol_error(&err), ctx)
                    .await;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let response = match codec::decode_command(&frame) {
            Err(e) => {
                audit::emit(&AuditEvent::invalid(&peer_label, e.to_string()));
                self.state = SessionState::Errored;
                Response::protocol_error(&e)
            }
            Ok(command) => self.execute(ctx, &command, &peer_label).await,
        };

        self.respond(&mut framed, &response, ctx).await
    }

    /// Decode → verify → evaluate for one command. Credential rejections
    /// short-circuit; the evaluator is never consulted for them.
    async fn execute(
        &mut self,
        ctx: &SessionContext,
        command: &Command,
        peer_label: &str,
    ) -> Response {
        let operation = match command.operation() {
            Ok(op) => op,
            Err(e) => {
                audit::emit(&AuditEvent::invalid(peer_label, e.to_string()));
                self.state = SessionState::Errored;
                return Response::protocol_error(&e);
            }
        };

        match operation {
            OperationKind::IsAuthorized => {
                self.state = SessionState::Verifying;
                let identity = match ctx.verifier.verify(&command.email, &command.password).await {
                    Ok(identity) => identity,
                    Err(denial) => {
                        audit::emit(
                            &AuditEvent::denied(
                                &command.email,
                                &command.resource,
                                denial_cause_label(&denial),
                            )
                            .with_peer(peer_label),
                        );
                        return Verdict::deny(Denial::WIRE_REASON).into();
                    }
                };

                self.state = SessionState::Evaluating;
                let evaluation = ctx.evaluator.evaluate(&identity, &command.resource);

                if evaluation.verdict.authorized {
                    audit::emit(
                        &AuditEvent::granted(
                            &identity.email,
                            &command.resource,
                            evaluation.matched_pattern.as_deref(),
                        )
                        .with_peer(peer_label),
                    );
                } else {
                    let reason = evaluation.verdict.reason.as_deref().unwrap_or("denied");
                    audit::emit(
                        &AuditEvent::denied(&identity.email, &command.resource, reason)
                            .with_peer(peer_label),
                    );
                }

                evaluation.verdict.into()
            }
        }
    }

    async fn respond(
        &mut self,
        framed: &mut Framed<tokio_rustls::server::TlsStream<TcpStream>, codec::FrameCodec>,
        response: &Response,
        ctx: &SessionContext,
    ) -> Result<()> {
        self.state = SessionState::Responding;
        let payload = codec::encode_response(response)?;

        timeout(ctx.limits.write_timeout, framed.send(payload))
            .await
            .map_err(|_| Error::Timeout("response write"))??;

        // Single-shot protocol: flush and close after one response
        timeout(Duration::from_secs(5), framed.close())
            .await
            .map_err(|_| Error::Timeout("close"))??;
        Ok(())
    }

    /// Label the peer for logs: socket address, plus the certificate CN
    /// when the client authenticated with one.
    fn peer_label(&self, tls_stream: &tokio_rustls::server::TlsStream<TcpStream>) -> String {
        let (_, connection) = tls_stream.get_ref();
        let cn = connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .and_then(|cert| ClientIdentity::from_der(cert).ok())
            .and_then(|identity| identity.common_name);

        match cn {
            Some(cn) => format!("{} cn={cn}", self.peer),
            None => self.peer.to_string(),
        }
    }
}

fn denial_cause_label(denial: &Denial) -> String {
    match &denial.cause {
        DenialCause::UnknownUser => "unknown user".to_string(),
        DenialCause::PasswordMismatch => "password mismatch".to_string(),
        DenialCause::AccountExpired => "account expired".to_string(),
        DenialCause::StoreError(e) => {
            warn!(error = %e, "Credential store error during verification");
            format!("store error: {e}")
        }
    }
}
