use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use gavel_core::event::Event;

use crate::error::LedgerError;
use crate::verify::ChainReport;

/// Default bound on tail-conflict retries.
pub const APPEND_MAX_RETRIES: u32 = 3;

/// An ESCALATED policy evaluation paired with the intent it judged.
///
/// Pairing prefers the explicit `intent_event_id` recorded in the
/// evaluation payload; for legacy events it falls back to the most recent
/// `INBOUND_INTENT` by the same actor at or before the evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPair {
    pub policy_event_id: String,
    pub intent_event_id: String,
    pub actor_id: String,
    pub intent_created_at: String,
}

/// The storage contract for the audit ledger.
///
/// ## Append semantics
///
/// `append` is serialisable: the store assigns `id`, `created_at`,
/// `previous_event_hash`, and `event_hash` under its own serialisation
/// point, so racing appends either linearise or one of them fails with
/// [`LedgerError::TailConflict`]. `created_at` strings are strictly
/// increasing in chain order.
///
/// ## Read semantics
///
/// Events are immutable once appended; every query observes a prefix of
/// the chain in append order. Queries never mutate.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` to live in axum
/// application state and cross task boundaries.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Append one event and return its id.
    async fn append(
        &self,
        actor_id: &str,
        action_type: &str,
        payload: Value,
    ) -> Result<String, LedgerError>;

    /// Fetch a single event by id.
    async fn get(&self, event_id: &str) -> Result<Option<Event>, LedgerError>;

    /// The full chain in append order.
    async fn events(&self) -> Result<Vec<Event>, LedgerError>;

    /// The `POLICY_EVAL:*` event for an intent.
    ///
    /// Prefers an explicit `intent_event_id` payload field; falls back to
    /// the earliest evaluation by the same actor with
    /// `created_at >= intent.created_at`.
    async fn find_policy_eval_for_intent(
        &self,
        intent_event_id: &str,
    ) -> Result<Option<Event>, LedgerError>;

    /// The role bound by the first `INBOUND_INTENT` for a
    /// `(chain_id, actor_id)` pair.
    async fn chain_role(
        &self,
        chain_id: &str,
        actor_id: &str,
    ) -> Result<Option<String>, LedgerError>;

    /// The newest consumable `HUMAN_APPROVAL_GRANTED` for a proposal
    /// triple: its referenced intent matches `(actor_id, action_type,
    /// content)`, its age is within `ttl_seconds`, and no
    /// `APPROVAL_CONSUMED` event names it.
    async fn find_valid_approval(
        &self,
        actor_id: &str,
        action_type: &str,
        content: &str,
        ttl_seconds: i64,
    ) -> Result<Option<Event>, LedgerError>;

    /// Conditionally append `APPROVAL_CONSUMED` for an approval.
    ///
    /// The append commits only if no prior consumption names the approval
    /// at commit time, atomically with the tail advance. Returns
    /// [`LedgerError::AlreadyConsumed`] when the approval was spent.
    async fn consume_approval(
        &self,
        approval_event_id: &str,
        actor_id: &str,
        payload: Value,
    ) -> Result<String, LedgerError>;

    /// The first resolution event (approval, denial, consumption, or
    /// auto-deny) referencing an intent.
    async fn resolution_for_intent(
        &self,
        intent_event_id: &str,
    ) -> Result<Option<Event>, LedgerError>;

    /// Which of the given intents have at least one resolution event.
    async fn resolved_intent_ids(
        &self,
        intent_ids: &[String],
    ) -> Result<HashSet<String>, LedgerError>;

    /// All ESCALATED policy evaluations paired with their intents,
    /// newest first.
    async fn escalated_with_intents(&self) -> Result<Vec<EscalationPair>, LedgerError>;

    /// Rehash every event in order and report breakage.
    async fn verify_chain(&self) -> Result<ChainReport, LedgerError>;
}

/// Append with bounded retries on tail contention.
///
/// Backoff is `50 * (attempt + 1)` ms. Exhaustion surfaces the final
/// [`LedgerError::TailConflict`] to the caller.
pub async fn append_with_retry(
    store: &dyn LedgerStore,
    actor_id: &str,
    action_type: &str,
    payload: Value,
) -> Result<String, LedgerError> {
    let mut attempt: u32 = 0;
    loop {
        match store.append(actor_id, action_type, payload.clone()).await {
            Err(LedgerError::TailConflict { observed_tail }) => {
                attempt += 1;
                if attempt >= APPEND_MAX_RETRIES {
                    return Err(LedgerError::TailConflict { observed_tail });
                }
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
            other => return other,
        }
    }
}
