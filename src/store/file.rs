//! File-backed store.
//!
//! `users.yaml`, `roles.yaml`, and `grants.yaml` live in one store
//! directory. The whole directory is loaded into an immutable [`Directory`]
//! that sessions read through a cheap `Arc` clone; reloads and
//! administrative writes build a fresh directory and swap it in one move.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result};

use super::credential::{derive_secret, mint_material};
use super::policy::PolicySnapshot;
use super::records::{
    Effect, GrantRecord, GrantsFile, RoleRecord, RolesFile, Subject, UserRecord, UsersFile,
};
use super::{CredentialStore, PolicyStore};

const USERS_FILE: &str = "users.yaml";
const ROLES_FILE: &str = "roles.yaml";
const GRANTS_FILE: &str = "grants.yaml";

/// The loaded, immutable view of the store directory.
#[derive(Debug, Default)]
pub struct Directory {
    users: HashMap<String, UserRecord>,
    roles: HashMap<String, RoleRecord>,
    policy: Arc<PolicySnapshot>,
}

impl Directory {
    /// Number of users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of policy rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.policy.len()
    }
}

/// Store rooted at a directory of YAML documents.
pub struct FileStore {
    dir: PathBuf,
    current: RwLock<Arc<Directory>>,
}

impl FileStore {
    /// Open (creating if absent) the store directory and load it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Config(format!("Cannot create store dir '{}': {e}", dir.display())))?;

        let directory = Self::load_directory(&dir)?;
        info!(
            dir = %dir.display(),
            users = directory.user_count(),
            rules = directory.rule_count(),
            "Store loaded"
        );

        Ok(Self {
            dir,
            current: RwLock::new(Arc::new(directory)),
        })
    }

    /// The store directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-read the directory from disk and swap the in-memory view.
    ///
    /// On any load error the previous view stays in place untouched.
    pub fn reload(&self) -> Result<()> {
        let directory = Self::load_directory(&self.dir)?;
        debug!(
            users = directory.user_count(),
            rules = directory.rule_count(),
            "Store reloaded"
        );
        *self.current.write() = Arc::new(directory);
        Ok(())
    }

    fn load_directory(dir: &Path) -> Result<Directory> {
        let users_file: UsersFile = load_document(&dir.join(USERS_FILE))?;
        let roles_file: RolesFile = load_document(&dir.join(ROLES_FILE))?;
        let grants_file: GrantsFile = load_document(&dir.join(GRANTS_FILE))?;

        let mut users = HashMap::new();
        for user in users_file.users {
            if users.insert(user.email.clone(), user).is_some() {
                return Err(Error::Store("duplicate email in users.yaml".into()));
            }
        }

        let roles = roles_file
            .roles
            .into_iter()
            .map(|r| (r.role_id.clone(), r))
            .collect();

        Ok(Directory {
            users,
            roles,
            policy: Arc::new(PolicySnapshot::from_grants(&grants_file.grants)),
        })
    }

    fn view(&self) -> Arc<Directory> {
        Arc::clone(&self.current.read())
    }

    // ── administrative operations ────────────────────────────────────────
    //
    // Each one rewrites the affected document atomically (tmp + rename) and
    // then swaps in a freshly loaded directory.

    /// Create a user with freshly minted credential material.
    pub fn add_user(
        &self,
        email: &str,
        password: &str,
        description: &str,
        role_name: &str,
    ) -> Result<UserRecord> {
        let role_id = self.role_id_for(role_name)?;
        let mut doc: UsersFile = load_document(&self.dir.join(USERS_FILE))?;
        if doc.users.iter().any(|u| u.email == email) {
            return Err(Error::Store(format!("{email} already exists")));
        }

        let material = mint_material(password);
        let user = UserRecord {
            user_id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            key: material.key,
            salt: material.salt,
            secret_hash: material.secret_hash,
            description: description.to_string(),
            since: Utc::now(),
            role_id,
            expires_at: None,
        };
        doc.users.push(user.clone());

        save_document(&self.dir.join(USERS_FILE), &doc)?;
        self.reload()?;
        info!(email = %email, "User created");
        Ok(user)
    }

    /// Change a user's password after verifying the current one.
    pub fn set_password(&self, email: &str, password: &str, new_password: &str) -> Result<()> {
        let mut doc: UsersFile = load_document(&self.dir.join(USERS_FILE))?;
        let user = doc
            .users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| Error::Store(format!("{email} does not exist")))?;

        let derived = derive_secret(&user.key, &user.salt, password)?;
        let stored = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &user.secret_hash,
        )
        .map_err(|e| Error::Store(format!("corrupt secret hash: {e}")))?;
        if derived != stored {
            return Err(Error::Store("password does not match".into()));
        }

        let material = mint_material(new_password);
        user.key = material.key;
        user.salt = material.salt;
        user.secret_hash = material.secret_hash;

        save_document(&self.dir.join(USERS_FILE), &doc)?;
        self.reload()?;
        info!(email = %email, "Password changed");
        Ok(())
    }

    /// Expire a user immediately.
    pub fn expire_user(&self, email: &str) -> Result<()> {
        let mut doc: UsersFile = load_document(&self.dir.join(USERS_FILE))?;
        let user = doc
            .users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| Error::Store(format!("{email} does not exist")))?;
        user.expires_at = Some(Utc::now());

        save_document(&self.dir.join(USERS_FILE), &doc)?;
        self.reload()?;
        info!(email = %email, "User expired");
        Ok(())
    }

    /// Create a role.
    pub fn add_role(&self, name: &str) -> Result<RoleRecord> {
        let mut doc: RolesFile = load_document(&self.dir.join(ROLES_FILE))?;
        if doc.roles.iter().any(|r| r.name == name) {
            return Err(Error::Store(format!("{name} already exists")));
        }

        let role = RoleRecord {
            role_id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        doc.roles.push(role.clone());

        save_document(&self.dir.join(ROLES_FILE), &doc)?;
        self.reload()?;
        info!(role = %name, role_id = %role.role_id, "Role created");
        Ok(role)
    }

    /// All roles, in declaration order.
    #[must_use]
    pub fn roles(&self) -> Vec<RoleRecord> {
        let view = self.view();
        let mut roles: Vec<RoleRecord> = view.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    /// Resolve a role name to its id.
    pub fn role_id_for(&self, name: &str) -> Result<String> {
        self.view()
            .roles
            .values()
            .find(|r| r.name == name)
            .map(|r| r.role_id.clone())
            .ok_or_else(|| Error::Store(format!("role not found: {name}")))
    }

    /// Append a grant for a user email or a role name.
    pub fn add_grant(
        &self,
        resource: &str,
        email: Option<&str>,
        role_name: Option<&str>,
        effect: Effect,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<GrantRecord> {
        let subject = match (email, role_name) {
            // When both are given the user wins, same as the admin CLI docs say
            (Some(email), _) => {
                let view = self.view();
                let user = view
                    .users
                    .get(email)
                    .ok_or_else(|| Error::Store(format!("{email} does not exist")))?;
                Subject::User(user.user_id.clone())
            }
            (None, Some(role_name)) => Subject::Role(self.role_id_for(role_name)?),
            (None, None) => {
                return Err(Error::Store("either an email or a role is required".into()));
            }
        };

        let grant = GrantRecord {
            resource: resource.to_string(),
            subject,
            effect,
            assigned_at: Utc::now(),
            expires_at,
        };

        let mut doc: GrantsFile = load_document(&self.dir.join(GRANTS_FILE))?;
        doc.grants.push(grant.clone());

        save_document(&self.dir.join(GRANTS_FILE), &doc)?;
        self.reload()?;
        info!(resource = %resource, effect = ?effect, "Grant created");
        Ok(grant)
    }
}

#[async_trait::async_trait]
impl CredentialStore for FileStore {
    async fn lookup(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.view().users.get(email).cloned())
    }
}

impl PolicyStore for FileStore {
    fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.view().policy)
    }
}

// ── document IO ──────────────────────────────────────────────────────────

/// Load a YAML document; a missing file is an empty document.
fn load_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(text) => serde_yaml::from_str(&text)
            .map_err(|e| Error::Store(format!("cannot parse '{}': {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(Error::Store(format!(
            "cannot read '{}': {e}",
            path.display()
        ))),
    }
}

/// Write a YAML document atomically: serialize to `<file>.tmp`, then rename
/// over the target so readers never see a torn write.
fn save_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let text = serde_yaml::to_string(doc)
        .map_err(|e| Error::Store(format!("cannot serialize '{}': {e}", path.display())))?;

    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, text)
        .map_err(|e| Error::Store(format!("cannot write '{}': {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| Error::Store(format!("cannot replace '{}': {e}", path.display())))?;
    Ok(())
}
