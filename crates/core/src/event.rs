//! The audit event record and the closed action-type set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::event_hash;

/// Raw inbound proposal, logged before any evaluation.
pub const INBOUND_INTENT: &str = "INBOUND_INTENT";
/// Policy evaluation results are `POLICY_EVAL:<UPPER_ACTION>`.
pub const POLICY_EVAL_PREFIX: &str = "POLICY_EVAL:";
/// Human operator approved an escalated proposal.
pub const HUMAN_APPROVAL_GRANTED: &str = "HUMAN_APPROVAL_GRANTED";
/// Human operator denied an escalated proposal.
pub const HUMAN_DENIAL: &str = "HUMAN_DENIAL";
/// A prior approval was spent on a matching re-proposal.
pub const APPROVAL_CONSUMED: &str = "APPROVAL_CONSUMED";
/// The sweeper denied an escalation past its hard deadline.
pub const AUTO_DENIED_TIMEOUT: &str = "AUTO_DENIED_TIMEOUT";
/// Canonical record of one sandbox execution.
pub const EVIDENCE_PACKET: &str = "EVIDENCE_PACKET";
/// Deterministic post-execution review of an evidence packet.
pub const EVIDENCE_REVIEW_DETERMINISTIC: &str = "EVIDENCE_REVIEW_DETERMINISTIC";
/// Clean tier-1 evidence cleared without human involvement.
pub const EVIDENCE_AUTO_APPROVE: &str = "EVIDENCE_AUTO_APPROVE";

/// Event types that resolve an escalation.
pub const RESOLUTION_ACTIONS: [&str; 4] = [
    HUMAN_APPROVAL_GRANTED,
    HUMAN_DENIAL,
    APPROVAL_CONSUMED,
    AUTO_DENIED_TIMEOUT,
];

/// `POLICY_EVAL:<UPPER_ACTION>` for a proposal's action type.
pub fn policy_eval_action(action_type: &str) -> String {
    format!("{}{}", POLICY_EVAL_PREFIX, action_type.to_uppercase())
}

/// Whether an action type is a policy evaluation record.
pub fn is_policy_eval(action_type: &str) -> bool {
    action_type.starts_with(POLICY_EVAL_PREFIX)
}

/// One immutable row of the audit ledger.
///
/// Timestamps are stored as fixed-width RFC 3339 strings (see
/// [`crate::timestamp`]); `(created_at, id)` lexicographic order is the
/// chain order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub created_at: String,
    pub actor_id: String,
    pub action_type: String,
    pub intent_payload: Value,
    pub policy_version: String,
    pub event_hash: String,
    pub previous_event_hash: String,
}

impl Event {
    /// String-valued payload field, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.intent_payload.get(key).and_then(Value::as_str)
    }

    /// Recompute this event's hash from its fields.
    pub fn compute_hash(&self) -> String {
        event_hash(
            &self.previous_event_hash,
            &self.actor_id,
            &self.action_type,
            &self.intent_payload,
            &self.policy_version,
            &self.created_at,
        )
    }

    /// Whether the stored hash matches a recomputation against the given
    /// predecessor hash.
    pub fn verify_against(&self, previous_hash: &str) -> bool {
        self.previous_event_hash == previous_hash && self.event_hash == self.compute_hash()
    }

    /// Whether a resolution event references the given intent, either as
    /// the original intent or as the current one (approval consumption).
    pub fn references_intent(&self, intent_event_id: &str) -> bool {
        self.payload_str("intent_event_id") == Some(intent_event_id)
            || self.payload_str("current_intent_event_id") == Some(intent_event_id)
    }
}
