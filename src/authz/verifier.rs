//! Credential verification.
//!
//! Recomputes the stored HMAC from the presented password and compares with
//! `subtle::ConstantTimeEq`. All failure modes — unknown email, wrong
//! password, expired account, unreachable or corrupt store — collapse to the
//! same wire-level reason so responses don't reveal which emails exist; the
//! audit trail keeps the precise cause.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::store::{CredentialStore, derive_secret};

/// A credential-verified principal.
///
/// Only the verifier constructs these; holding one means the password check
/// passed against the current store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Store-assigned user id (grants reference this).
    pub user_id: String,
    /// The verified email.
    pub email: String,
    /// Role the user holds.
    pub role_id: String,
}

/// Why verification failed. Audit-only; the wire reason is always
/// [`Denial::WIRE_REASON`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialCause {
    /// No record for the email.
    UnknownUser,
    /// The derived MAC did not match the stored hash.
    PasswordMismatch,
    /// The account's expiry has passed.
    AccountExpired,
    /// The store failed or the record is corrupt. Fails closed.
    StoreError(String),
}

/// A verification denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Precise cause, for audit.
    pub cause: DenialCause,
}

impl Denial {
    /// The only reason string a client ever sees for a credential failure.
    pub const WIRE_REASON: &'static str = "invalid credentials";

    fn new(cause: DenialCause) -> Self {
        Self { cause }
    }
}

/// Verifies (email, password) pairs against a credential store.
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
}

impl CredentialVerifier {
    /// Build a verifier over a store.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Verify a credential pair.
    ///
    /// # Errors
    ///
    /// Returns a [`Denial`] for every non-success outcome; there is no
    /// error path that grants access.
    pub async fn verify(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<VerifiedIdentity, Denial> {
        let record = match self.store.lookup(email).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                // Burn the same MAC work as the known-user path so lookup
                // misses aren't distinguishable by response time
                let _ = derive_secret(DUMMY_KEY, DUMMY_SALT, password);
                debug!(email = %email, "Unknown user");
                return Err(Denial::new(DenialCause::UnknownUser));
            }
            Err(e) => {
                debug!(email = %email, error = %e, "Credential store error");
                return Err(Denial::new(DenialCause::StoreError(e.to_string())));
            }
        };

        if record.is_expired(Utc::now()) {
            debug!(email = %email, "Account expired");
            return Err(Denial::new(DenialCause::AccountExpired));
        }

        let derived = derive_secret(&record.key, &record.salt, password)
            .map_err(|e| Denial::new(DenialCause::StoreError(e.to_string())))?;
        let stored = BASE64
            .decode(&record.secret_hash)
            .map_err(|e| Denial::new(DenialCause::StoreError(format!("corrupt secret hash: {e}"))))?;

        if derived.ct_eq(&stored).into() {
            Ok(VerifiedIdentity {
                user_id: record.user_id,
                email: record.email,
                role_id: record.role_id,
            })
        } else {
            debug!(email = %email, "Password mismatch");
            Err(Denial::new(DenialCause::PasswordMismatch))
        }
    }
}

const DUMMY_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
const DUMMY_SALT: &str = "AAAAAAAAAAAAAAAAAAAAAA==";

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    use crate::Result;
    use crate::store::{UserRecord, mint_material};

    use super::*;

    /// Store stub that counts lookups and serves a fixed set of records.
    struct StubStore {
        records: Vec<UserRecord>,
        lookups: AtomicUsize,
        fail: bool,
    }

    impl StubStore {
        fn with(records: Vec<UserRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                lookups: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                records: Vec::new(),
                lookups: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait::async_trait]
    impl CredentialStore for StubStore {
        async fn lookup(&self, email: &str) -> Result<Option<UserRecord>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::Error::Store("store unavailable".into()));
            }
            Ok(self.records.iter().find(|r| r.email == email).cloned())
        }
    }

    fn make_user(email: &str, password: &str) -> UserRecord {
        let material = mint_material(password);
        UserRecord {
            user_id: "u-1".into(),
            email: email.into(),
            key: material.key,
            salt: material.salt,
            secret_hash: material.secret_hash,
            description: String::new(),
            since: Utc::now(),
            role_id: "r-1".into(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn correct_password_yields_identity() {
        // GIVEN: a store with one user
        let store = StubStore::with(vec![make_user("alice@example.org", "pw")]);
        let verifier = CredentialVerifier::new(store.clone());

        // WHEN: verifying the right password
        let identity = verifier.verify("alice@example.org", "pw").await.unwrap();

        // THEN: identity fields come from the record, one lookup was made
        assert_eq!(identity.email, "alice@example.org");
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_password_is_a_mismatch() {
        let store = StubStore::with(vec![make_user("alice@example.org", "pw")]);
        let verifier = CredentialVerifier::new(store);

        let denial = verifier
            .verify("alice@example.org", "not-pw")
            .await
            .unwrap_err();
        assert_eq!(denial.cause, DenialCause::PasswordMismatch);
    }

    #[tokio::test]
    async fn wrong_password_of_any_length_is_denied_identically() {
        // The comparison must not short-circuit on length or prefix
        let store = StubStore::with(vec![make_user("alice@example.org", "pw")]);
        let verifier = CredentialVerifier::new(store);

        let long = "x".repeat(512);
        for attempt in ["p", "pw-with-correct-prefix", "", long.as_str()] {
            let denial = verifier
                .verify("alice@example.org", attempt)
                .await
                .unwrap_err();
            assert_eq!(denial.cause, DenialCause::PasswordMismatch);
        }
    }

    #[tokio::test]
    async fn unknown_email_is_denied() {
        let store = StubStore::with(vec![]);
        let verifier = CredentialVerifier::new(store);

        let denial = verifier.verify("ghost@example.org", "pw").await.unwrap_err();
        assert_eq!(denial.cause, DenialCause::UnknownUser);
    }

    #[tokio::test]
    async fn expired_account_is_denied() {
        let mut user = make_user("old@example.org", "pw");
        user.expires_at = Some(Utc::now() - Duration::hours(1));
        let store = StubStore::with(vec![user]);
        let verifier = CredentialVerifier::new(store);

        let denial = verifier.verify("old@example.org", "pw").await.unwrap_err();
        assert_eq!(denial.cause, DenialCause::AccountExpired);
    }

    #[tokio::test]
    async fn store_failure_fails_closed() {
        // GIVEN: a store that errors on every lookup
        let store = StubStore::failing();
        let verifier = CredentialVerifier::new(store);

        // WHEN/THEN: the outcome is a denial, never a grant or a panic
        let denial = verifier.verify("any@example.org", "pw").await.unwrap_err();
        assert!(matches!(denial.cause, DenialCause::StoreError(_)));
    }

    #[tokio::test]
    async fn corrupt_stored_hash_fails_closed() {
        let mut user = make_user("alice@example.org", "pw");
        user.secret_hash = "%%% not base64 %%%".into();
        let store = StubStore::with(vec![user]);
        let verifier = CredentialVerifier::new(store);

        let denial = verifier.verify("alice@example.org", "pw").await.unwrap_err();
        assert!(matches!(denial.cause, DenialCause::StoreError(_)));
    }
}
