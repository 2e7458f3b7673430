//! Escalation liveness.
//!
//! Escalation state is derived from the ledger and the clock on every
//! read; nothing here caches state. The sweeper converts escalations past
//! their hard deadline into durable `AUTO_DENIED_TIMEOUT` events.

use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use gavel_core::config::GovernanceConfig;
use gavel_core::event::AUTO_DENIED_TIMEOUT;
use gavel_core::timestamp;
use gavel_ledger::{append_with_retry, LedgerError, LedgerStore};

/// Actor recorded on sweeper events.
const SWEEPER_ACTOR: &str = "system:gateway";

/// Derived state of one escalated proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationState {
    PendingReview,
    HumanRequired,
    AutoDeniedTimeout,
    Resolved,
}

impl EscalationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationState::PendingReview => "PENDING_REVIEW",
            EscalationState::HumanRequired => "HUMAN_REQUIRED",
            EscalationState::AutoDeniedTimeout => "AUTO_DENIED_TIMEOUT",
            EscalationState::Resolved => "RESOLVED",
        }
    }
}

/// Counts by derived state across all escalations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationSummary {
    pub pending: usize,
    pub human_required: usize,
    pub auto_denied: usize,
    pub resolved: usize,
}

/// Classify one escalation from its intent timestamp and resolution flag.
///
/// Both transitions are closed lower bounds: an escalation exactly at the
/// initial timeout needs a human, one exactly at the hard deadline is
/// auto-denied.
pub fn classify(
    intent_created_at: &str,
    resolved: bool,
    now: OffsetDateTime,
    config: &GovernanceConfig,
) -> EscalationState {
    if resolved {
        return EscalationState::Resolved;
    }
    let Some(age) = timestamp::age_seconds(intent_created_at, now) else {
        return EscalationState::PendingReview;
    };
    if age >= config.escalation_max_timeout_seconds {
        EscalationState::AutoDeniedTimeout
    } else if age >= config.escalation_initial_timeout_seconds {
        EscalationState::HumanRequired
    } else {
        EscalationState::PendingReview
    }
}

/// The review window and hard deadline for an intent, as timestamps.
pub fn escalation_deadlines(
    intent_created_at: &str,
    config: &GovernanceConfig,
) -> Option<(String, String)> {
    let expires_at =
        timestamp::offset_by_seconds(intent_created_at, config.escalation_initial_timeout_seconds)?;
    let hard_deadline =
        timestamp::offset_by_seconds(intent_created_at, config.escalation_max_timeout_seconds)?;
    Some((expires_at, hard_deadline))
}

/// Derived state of a single escalated intent, straight from the ledger.
pub async fn check_escalation_status(
    ledger: &dyn LedgerStore,
    intent_event_id: &str,
    config: &GovernanceConfig,
) -> Result<EscalationState, LedgerError> {
    if ledger
        .resolution_for_intent(intent_event_id)
        .await?
        .is_some()
    {
        return Ok(EscalationState::Resolved);
    }
    let Some(intent) = ledger.get(intent_event_id).await? else {
        return Ok(EscalationState::PendingReview);
    };
    Ok(classify(
        &intent.created_at,
        false,
        OffsetDateTime::now_utc(),
        config,
    ))
}

/// Sweep all escalations and auto-deny those past the hard deadline.
///
/// Returns the intent ids that were denied in this sweep. Each denial
/// joins the resolved set immediately, so duplicate pairings within one
/// sweep cannot double-deny.
pub async fn auto_deny_expired(
    ledger: &dyn LedgerStore,
    config: &GovernanceConfig,
) -> Result<Vec<String>, LedgerError> {
    let pairs = ledger.escalated_with_intents().await?;
    if pairs.is_empty() {
        return Ok(Vec::new());
    }
    let intent_ids: Vec<String> = pairs.iter().map(|p| p.intent_event_id.clone()).collect();
    let mut resolved = ledger.resolved_intent_ids(&intent_ids).await?;

    let now = OffsetDateTime::now_utc();
    let mut denied = Vec::new();
    for pair in pairs {
        if resolved.contains(&pair.intent_event_id) {
            continue;
        }
        let state = classify(&pair.intent_created_at, false, now, config);
        if state != EscalationState::AutoDeniedTimeout {
            continue;
        }
        append_with_retry(
            ledger,
            SWEEPER_ACTOR,
            AUTO_DENIED_TIMEOUT,
            json!({
                "intent_event_id": pair.intent_event_id,
                "policy_event_id": pair.policy_event_id,
                "actor_id": pair.actor_id,
                "reason": "Escalation expired -- auto-denied after timeout",
                "auto_denied_at": timestamp::now(),
            }),
        )
        .await?;
        resolved.insert(pair.intent_event_id.clone());
        denied.push(pair.intent_event_id);
    }
    Ok(denied)
}

/// Counts of all escalations by derived state.
pub async fn escalation_summary(
    ledger: &dyn LedgerStore,
    config: &GovernanceConfig,
) -> Result<EscalationSummary, LedgerError> {
    let pairs = ledger.escalated_with_intents().await?;
    if pairs.is_empty() {
        return Ok(EscalationSummary::default());
    }
    let intent_ids: Vec<String> = pairs.iter().map(|p| p.intent_event_id.clone()).collect();
    let resolved = ledger.resolved_intent_ids(&intent_ids).await?;

    let now = OffsetDateTime::now_utc();
    let mut summary = EscalationSummary::default();
    for pair in pairs {
        let state = classify(
            &pair.intent_created_at,
            resolved.contains(&pair.intent_event_id),
            now,
            config,
        );
        match state {
            EscalationState::PendingReview => summary.pending += 1,
            EscalationState::HumanRequired => summary.human_required += 1,
            EscalationState::AutoDeniedTimeout => summary.auto_denied += 1,
            EscalationState::Resolved => summary.resolved += 1,
        }
    }
    Ok(summary)
}
