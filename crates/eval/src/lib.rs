//! Deterministic evaluation for the governance plane.
//!
//! Pre-execution: the policy evaluator judges proposals against the hard
//! rule families and produces a structured decision. Post-execution: the
//! evidence builder canonicalizes sandbox results into hashed packets and
//! the reviewer runs deterministic scans over them. The liveness model
//! derives escalation state from the ledger and sweeps expired
//! escalations into auto-denials.

pub mod evidence;
pub mod liveness;
pub mod policy;
mod rules;
pub mod review;

pub use evidence::{build_packet, record_packet, EvidencePacket};
pub use liveness::{
    auto_deny_expired, check_escalation_status, classify, escalation_deadlines,
    escalation_summary, EscalationState, EscalationSummary,
};
pub use policy::{evaluate, Decision, PolicyOutcome, Violation};
pub use review::{
    evaluate_evidence_for_auto_approve, record_review, review_evidence, risk_map_version_hash,
    FindingCategory, ReviewFinding, ReviewResult, Severity,
};
