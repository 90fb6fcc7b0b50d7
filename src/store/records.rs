//! On-disk record types.
//!
//! These are the serde shapes of the three store documents. Everything is
//! YAML with explicit fields; credential material is base64 at rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user in `users.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identifier (UUID v4), referenced by grants.
    pub user_id: String,
    /// Login email; unique within the store.
    pub email: String,
    /// Per-user HMAC key, base64.
    pub key: String,
    /// Per-user salt, base64. Appended to the password before hashing.
    pub salt: String,
    /// base64(HMAC-SHA256(key, password ++ salt)).
    pub secret_hash: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Creation time.
    pub since: DateTime<Utc>,
    /// Role the user belongs to.
    pub role_id: String,
    /// When set and in the past, the user no longer authenticates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Whether the user account has expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// One role in `roles.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Stable identifier (UUID v4), referenced by users and grants.
    pub role_id: String,
    /// Unique role name.
    pub name: String,
}

/// Who a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// A single user, by `user_id`.
    User(String),
    /// Every user holding the role, by `role_id`.
    Role(String),
}

/// Whether a matching rule grants or refuses access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Grant access.
    #[default]
    Allow,
    /// Refuse access. Wins ties against Allow at equal specificity.
    Deny,
}

/// One grant in `grants.yaml`.
///
/// `resource` is an exact string or a trailing-`*` prefix pattern, e.g.
/// `/home/abhurke/*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRecord {
    /// Resource pattern this grant covers.
    pub resource: String,
    /// User or role the grant is addressed to.
    pub subject: Subject,
    /// Allow or deny; defaults to allow.
    #[serde(default)]
    pub effect: Effect,
    /// When the grant was created.
    pub assigned_at: DateTime<Utc>,
    /// When set and in the past, the grant is ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Document shape of `users.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersFile {
    /// All users.
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

/// Document shape of `roles.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesFile {
    /// All roles.
    #[serde(default)]
    pub roles: Vec<RoleRecord>,
}

/// Document shape of `grants.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantsFile {
    /// All grants, in declaration order.
    #[serde(default)]
    pub grants: Vec<GrantRecord>,
}
