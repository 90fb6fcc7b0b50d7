//! Authorization core — credential verification and policy evaluation.
//!
//! The two halves are strictly ordered: a command's credential is verified
//! first, and only a [`VerifiedIdentity`] (never raw client input) reaches
//! the policy evaluator. Every failure on either side resolves to a denial;
//! nothing in this module fails open.

pub mod audit;
pub mod evaluator;
pub mod verifier;

pub use evaluator::{Evaluation, PolicyEvaluator};
pub use verifier::{CredentialVerifier, Denial, DenialCause, VerifiedIdentity};
