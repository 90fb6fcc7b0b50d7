//! authd — authorization decision daemon.
//!
//! Answers single-shot allow/deny queries over TLS: a client connects,
//! sends one length-prefixed JSON command naming an operation, a credential
//! pair, and a resource, and receives a verdict before the connection
//! closes.
//!
//! # Architecture
//!
//! - **protocol** — command/verdict types and length-prefixed JSON framing
//! - **store** — file-backed users, roles, and grants with an
//!   atomically-swappable policy snapshot
//! - **authz** — constant-time credential verification and
//!   most-specific-wins policy evaluation, with a structured audit trail
//! - **server** — TLS listener, per-connection sessions, concurrency
//!   limits, graceful shutdown
//!
//! Every failure path fails closed: store errors, corrupt records, and
//! timeouts all deny.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authz;
pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default wire port, matching the deployed clients.
pub const DEFAULT_PORT: u16 = 9669;

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
