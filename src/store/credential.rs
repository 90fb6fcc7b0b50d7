//! Credential material — minting and derivation.
//!
//! A user's password is never stored. At creation time we mint a random
//! per-user HMAC key and salt, and store
//! `base64(HMAC-SHA256(key, password ++ salt))`. Verification re-derives the
//! MAC from the presented password and compares in constant time (the
//! comparison itself lives in the verifier, next to its audit trail).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, KeyInit, Mac};
use rand::RngExt;
use sha2::Sha256;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Freshly minted credential material for a new user (or password change).
#[derive(Debug, Clone)]
pub struct CredentialMaterial {
    /// Per-user HMAC key, base64.
    pub key: String,
    /// Per-user salt, base64.
    pub salt: String,
    /// base64 of the derived MAC.
    pub secret_hash: String,
}

/// Mint key, salt, and hash for a password.
#[must_use]
pub fn mint_material(password: &str) -> CredentialMaterial {
    let key_bytes: [u8; 32] = rand::rng().random();
    let salt_bytes: [u8; 16] = rand::rng().random();

    let key = BASE64.encode(key_bytes);
    let salt = BASE64.encode(salt_bytes);

    let mut mac = HmacSha256::new_from_slice(&key_bytes).expect("HMAC can take key of any size");
    mac.update(password.as_bytes());
    mac.update(salt.as_bytes());

    CredentialMaterial {
        key,
        salt,
        secret_hash: BASE64.encode(mac.finalize().into_bytes()),
    }
}

/// Derive the MAC for a presented password against stored key and salt.
///
/// The message is the password concatenated with the *textual* (base64)
/// salt, matching what [`mint_material`] hashed.
///
/// # Errors
///
/// Returns [`Error::Store`] when the stored key is not valid base64 — a
/// corrupt record, which callers must treat as a denial.
pub fn derive_secret(key_b64: &str, salt_b64: &str, password: &str) -> Result<Vec<u8>> {
    let key = BASE64
        .decode(key_b64)
        .map_err(|e| Error::Store(format!("corrupt credential key: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| Error::Store(format!("unusable credential key: {e}")))?;
    mac.update(password.as_bytes());
    mac.update(salt_b64.as_bytes());

    Ok(mac.finalize().into_bytes().to_vec())
}
