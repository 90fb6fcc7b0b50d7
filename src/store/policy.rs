//! Policy snapshot — the immutable, atomically-swappable rule set.
//!
//! A snapshot indexes grants by subject so a decision is two map lookups.
//! Snapshots are built whole from the grants document and never mutated;
//! replacement happens by swapping the `Arc` that owns them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::records::{Effect, GrantRecord, Subject};

/// One evaluable rule: pattern, effect, optional expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Exact resource string or trailing-`*` prefix pattern.
    pub pattern: String,
    /// Allow or deny.
    pub effect: Effect,
    /// Expired rules are skipped during evaluation.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Whether this rule covers `resource`.
    ///
    /// A trailing `*` makes the rule a prefix pattern; otherwise the match
    /// is exact.
    #[must_use]
    pub fn matches(&self, resource: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => resource.starts_with(prefix),
            None => self.pattern == resource,
        }
    }

    /// Specificity for most-specific-wins ordering: the length of the fixed
    /// part of the pattern. `/home/abhurke/*` (14) beats `/home/*` (6);
    /// an exact match beats a same-length prefix pattern.
    #[must_use]
    pub fn specificity(&self) -> (usize, bool) {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => (prefix.len(), false),
            None => (self.pattern.len(), true),
        }
    }

    /// Whether the rule has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// An immutable view of the full rule set, indexed by subject.
#[derive(Debug, Clone, Default)]
pub struct PolicySnapshot {
    by_user: HashMap<String, Vec<Rule>>,
    by_role: HashMap<String, Vec<Rule>>,
}

impl PolicySnapshot {
    /// Build a snapshot from the grants document.
    #[must_use]
    pub fn from_grants(grants: &[GrantRecord]) -> Self {
        let mut by_user: HashMap<String, Vec<Rule>> = HashMap::new();
        let mut by_role: HashMap<String, Vec<Rule>> = HashMap::new();

        for grant in grants {
            let rule = Rule {
                pattern: grant.resource.clone(),
                effect: grant.effect,
                expires_at: grant.expires_at,
            };
            match &grant.subject {
                Subject::User(user_id) => by_user.entry(user_id.clone()).or_default().push(rule),
                Subject::Role(role_id) => by_role.entry(role_id.clone()).or_default().push(rule),
            }
        }

        Self { by_user, by_role }
    }

    /// All rules addressing a user, direct grants first, then role grants,
    /// each group in declaration order.
    pub fn rules_for(&self, user_id: &str, role_id: &str) -> impl Iterator<Item = &Rule> {
        self.by_user
            .get(user_id)
            .into_iter()
            .flatten()
            .chain(self.by_role.get(role_id).into_iter().flatten())
    }

    /// Total rule count, for startup logging.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_user.values().map(Vec::len).sum::<usize>()
            + self.by_role.values().map(Vec::len).sum::<usize>()
    }

    /// Whether the snapshot holds no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty() && self.by_role.is_empty()
    }
}
