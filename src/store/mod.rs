//! User, role, and grant storage.
//!
//! The on-disk layout is a store directory holding three YAML documents:
//! `users.yaml`, `roles.yaml`, and `grants.yaml`. [`FileStore`] loads them
//! into an immutable in-memory [`Directory`] and answers lookups from that;
//! administrative writes append to the files and swap in a fresh directory.
//! Sessions never observe a half-updated store.
//!
//! The server consumes the store through two narrow traits so tests can
//! substitute counting mocks:
//! - [`CredentialStore`] — email → credential record
//! - [`PolicyStore`] — current immutable policy snapshot

pub mod credential;
pub mod file;
pub mod policy;
pub mod records;
pub mod watcher;

use std::sync::Arc;

use crate::Result;

pub use credential::{CredentialMaterial, derive_secret, mint_material};
pub use file::{Directory, FileStore};
pub use policy::{PolicySnapshot, Rule};
pub use records::{Effect, GrantRecord, RoleRecord, Subject, UserRecord};

/// Read access to credential records.
///
/// Implementations must be `Send + Sync`; the store is shared across all
/// session tasks.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Look up the credential record for an email.
    ///
    /// Returns `Ok(None)` when the email is unknown. Errors mean the store
    /// itself failed — callers must treat that as a denial, never a grant.
    async fn lookup(&self, email: &str) -> Result<Option<UserRecord>>;
}

/// Read access to the policy rule set.
pub trait PolicyStore: Send + Sync + 'static {
    /// The current policy snapshot.
    ///
    /// The returned `Arc` stays internally consistent for as long as the
    /// caller holds it, regardless of concurrent reloads.
    fn snapshot(&self) -> Arc<PolicySnapshot>;
}
