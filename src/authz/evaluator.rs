//! Policy evaluation.
//!
//! Given a verified identity and a resource, picks the winning rule from the
//! current policy snapshot. Most-specific match wins, like longest-prefix
//! routing: `/home/abhurke/*` beats `/home/*`, and an exact rule beats a
//! prefix rule of the same length. At equal specificity Deny beats Allow.

use std::sync::Arc;

use chrono::Utc;

use crate::protocol::Verdict;
use crate::store::{Effect, PolicyStore, Rule};

use super::verifier::VerifiedIdentity;

/// Resources longer than this are rejected unexamined.
const MAX_RESOURCE_LEN: usize = 4096;

/// Outcome of a policy evaluation, with the winning pattern kept for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The verdict to send back.
    pub verdict: Verdict,
    /// Pattern of the rule that decided the outcome, when one matched.
    pub matched_pattern: Option<String>,
}

impl Evaluation {
    fn denied(reason: &str) -> Self {
        Self {
            verdict: Verdict::deny(reason),
            matched_pattern: None,
        }
    }
}

/// Evaluates resource access for verified identities.
pub struct PolicyEvaluator {
    store: Arc<dyn PolicyStore>,
}

impl PolicyEvaluator {
    /// Build an evaluator over a policy store.
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Decide whether `identity` may access `resource`.
    ///
    /// One snapshot is taken per call; a concurrent policy replacement never
    /// mixes old and new rules within a single decision. Identical
    /// (identity, resource, snapshot) inputs always produce the same
    /// verdict.
    #[must_use]
    pub fn evaluate(&self, identity: &VerifiedIdentity, resource: &str) -> Evaluation {
        if !resource_is_valid(resource) {
            return Evaluation::denied("invalid resource");
        }

        let snapshot = self.store.snapshot();
        let now = Utc::now();

        let mut winner: Option<&Rule> = None;
        for rule in snapshot.rules_for(&identity.user_id, &identity.role_id) {
            if rule.is_expired(now) || !rule.matches(resource) {
                continue;
            }
            winner = Some(match winner {
                None => rule,
                Some(best) => pick_winner(best, rule),
            });
        }

        match winner {
            Some(rule) if rule.effect == Effect::Allow => Evaluation {
                verdict: Verdict::allow(),
                matched_pattern: Some(rule.pattern.clone()),
            },
            Some(rule) => Evaluation {
                verdict: Verdict::deny("denied by policy"),
                matched_pattern: Some(rule.pattern.clone()),
            },
            None => Evaluation::denied("no matching policy"),
        }
    }
}

/// A resource must be a non-empty, NUL-free string of sane length. The
/// string is otherwise opaque; paths and URLs both occur in practice.
fn resource_is_valid(resource: &str) -> bool {
    !resource.is_empty() && resource.len() <= MAX_RESOURCE_LEN && !resource.contains('\0')
}

/// Most-specific wins; Deny wins ties.
fn pick_winner<'a>(best: &'a Rule, candidate: &'a Rule) -> &'a Rule {
    match candidate.specificity().cmp(&best.specificity()) {
        std::cmp::Ordering::Greater => candidate,
        std::cmp::Ordering::Equal if candidate.effect == Effect::Deny => candidate,
        _ => best,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration};
    use pretty_assertions::assert_eq;

    use crate::store::{GrantRecord, PolicySnapshot, Subject};

    use super::*;

    /// Policy store stub serving a fixed snapshot.
    struct StubPolicy {
        snapshot: Arc<PolicySnapshot>,
    }

    impl StubPolicy {
        fn with_grants(grants: Vec<GrantRecord>) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Arc::new(PolicySnapshot::from_grants(&grants)),
            })
        }
    }

    impl PolicyStore for StubPolicy {
        fn snapshot(&self) -> Arc<PolicySnapshot> {
            Arc::clone(&self.snapshot)
        }
    }

    fn identity() -> VerifiedIdentity {
        VerifiedIdentity {
            user_id: "u-1".into(),
            email: "ameyabhurke@outlook.com".into(),
            role_id: "r-1".into(),
        }
    }

    fn user_grant(resource: &str, effect: Effect, expires_at: Option<DateTime<Utc>>) -> GrantRecord {
        GrantRecord {
            resource: resource.into(),
            subject: Subject::User("u-1".into()),
            effect,
            assigned_at: Utc::now(),
            expires_at,
        }
    }

    fn evaluator(grants: Vec<GrantRecord>) -> PolicyEvaluator {
        PolicyEvaluator::new(StubPolicy::with_grants(grants))
    }

    #[test]
    fn matching_prefix_grant_allows() {
        // GIVEN: a grant on /home/abhurke/*
        let eval = evaluator(vec![user_grant("/home/abhurke/*", Effect::Allow, None)]);

        // WHEN: asking about a resource under that prefix
        let result = eval.evaluate(&identity(), "/home/abhurke/userd");

        // THEN: allowed, with the winning pattern recorded
        assert_eq!(result.verdict, Verdict::allow());
        assert_eq!(result.matched_pattern.as_deref(), Some("/home/abhurke/*"));
    }

    #[test]
    fn unmatched_resource_is_no_matching_policy() {
        let eval = evaluator(vec![user_grant("/home/abhurke/*", Effect::Allow, None)]);
        let result = eval.evaluate(&identity(), "/etc/shadow");
        assert_eq!(result.verdict, Verdict::deny("no matching policy"));
        assert!(result.matched_pattern.is_none());
    }

    #[test]
    fn empty_resource_is_invalid_without_consulting_rules() {
        // A bare-star grant would match anything, but invalid resources
        // never reach the rules
        let eval = evaluator(vec![user_grant("*", Effect::Allow, None)]);
        let result = eval.evaluate(&identity(), "");
        assert_eq!(result.verdict, Verdict::deny("invalid resource"));
    }

    #[test]
    fn nul_byte_in_resource_is_invalid() {
        let eval = evaluator(vec![user_grant("*", Effect::Allow, None)]);
        let result = eval.evaluate(&identity(), "/etc/\0passwd");
        assert_eq!(result.verdict, Verdict::deny("invalid resource"));
    }

    #[test]
    fn oversized_resource_is_invalid() {
        let eval = evaluator(vec![user_grant("*", Effect::Allow, None)]);
        let huge = format!("/{}", "x".repeat(MAX_RESOURCE_LEN));
        let result = eval.evaluate(&identity(), &huge);
        assert_eq!(result.verdict, Verdict::deny("invalid resource"));
    }

    #[test]
    fn most_specific_rule_wins() {
        // GIVEN: a broad allow and a narrower deny
        let eval = evaluator(vec![
            user_grant("/home/*", Effect::Allow, None),
            user_grant("/home/abhurke/private/*", Effect::Deny, None),
        ]);

        // THEN: the narrow deny wins inside its prefix, the broad allow
        // elsewhere
        let denied = eval.evaluate(&identity(), "/home/abhurke/private/keys");
        assert_eq!(denied.verdict, Verdict::deny("denied by policy"));

        let allowed = eval.evaluate(&identity(), "/home/abhurke/notes");
        assert_eq!(allowed.verdict, Verdict::allow());
    }

    #[test]
    fn deny_wins_ties_at_equal_specificity() {
        let eval = evaluator(vec![
            user_grant("/srv/data/*", Effect::Allow, None),
            user_grant("/srv/data/*", Effect::Deny, None),
        ]);
        let result = eval.evaluate(&identity(), "/srv/data/file");
        assert_eq!(result.verdict, Verdict::deny("denied by policy"));
    }

    #[test]
    fn exact_rule_beats_prefix_rule_on_same_path() {
        let eval = evaluator(vec![
            user_grant("/srv/data*", Effect::Deny, None),
            user_grant("/srv/data", Effect::Allow, None),
        ]);
        let result = eval.evaluate(&identity(), "/srv/data");
        assert_eq!(result.verdict, Verdict::allow());
    }

    #[test]
    fn expired_grant_is_skipped() {
        let eval = evaluator(vec![user_grant(
            "/home/abhurke/*",
            Effect::Allow,
            Some(Utc::now() - Duration::days(1)),
        )]);
        let result = eval.evaluate(&identity(), "/home/abhurke/userd");
        assert_eq!(result.verdict, Verdict::deny("no matching policy"));
    }

    #[test]
    fn role_grant_applies_to_role_members() {
        let grants = vec![GrantRecord {
            resource: "/shared/*".into(),
            subject: Subject::Role("r-1".into()),
            effect: Effect::Allow,
            assigned_at: Utc::now(),
            expires_at: None,
        }];
        let eval = evaluator(grants);
        let result = eval.evaluate(&identity(), "/shared/report.pdf");
        assert_eq!(result.verdict, Verdict::allow());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let eval = evaluator(vec![
            user_grant("/a/*", Effect::Allow, None),
            user_grant("/a/b/*", Effect::Deny, None),
        ]);
        let first = eval.evaluate(&identity(), "/a/b/c");
        for _ in 0..10 {
            assert_eq!(eval.evaluate(&identity(), "/a/b/c"), first);
        }
    }
}
