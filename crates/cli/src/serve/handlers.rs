//! Gateway route handlers: propose, approve, deny, execute, escalations.
//!
//! The gateway never mutates state except by appending to the ledger.
//! Unknown actors are rejected before any append so the chain cannot be
//! polluted by guessing ids.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use gavel_core::envelope::parse_proposal;
use gavel_core::event::{
    is_policy_eval, policy_eval_action, Event, APPROVAL_CONSUMED, AUTO_DENIED_TIMEOUT,
    EVIDENCE_AUTO_APPROVE, HUMAN_APPROVAL_GRANTED, HUMAN_DENIAL, INBOUND_INTENT,
};
use gavel_core::identity::{Identity, IdentityError};
use gavel_core::tier::{check_execution_allowed, tier_policy};
use gavel_core::timestamp;
use gavel_eval::liveness::{classify, escalation_deadlines, escalation_summary, EscalationState};
use gavel_eval::policy::Decision;
use gavel_eval::{
    build_packet, evaluate, evaluate_evidence_for_auto_approve, record_packet, record_review,
    review_evidence,
};
use gavel_ledger::{append_with_retry, LedgerError};

use super::state::AppState;
use super::json_error;

/// Actor recorded on gateway-originated events.
const GATEWAY_ACTOR: &str = "system:gateway";

fn ledger_failure(err: LedgerError) -> Response {
    let status = match err {
        LedgerError::TailConflict { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        LedgerError::Io { .. } | LedgerError::Backend(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, &format!("ledger failure: {}", err)).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = json!({
        "status": "operational",
        "service": "governance-gateway",
    });
    (StatusCode::OK, Json(response))
}

/// POST /propose
///
/// Flow: validate actor (no ledger write on rejection), enforce the
/// chain role lock, append `INBOUND_INTENT`, evaluate, append
/// `POLICY_EVAL:*`, attempt approval consumption on escalation, respond
/// 200/202/403 by decision.
pub(crate) async fn handle_propose(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let proposal = match parse_proposal(&body) {
        Ok(p) => p,
        Err(e) => {
            return json_error(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()).into_response()
        }
    };

    let identity = match state.identities.validate(&proposal.actor_id) {
        Ok(identity) => identity,
        Err(e @ (IdentityError::Unknown { .. } | IdentityError::Inactive { .. })) => {
            return json_error(StatusCode::FORBIDDEN, &e.to_string()).into_response();
        }
        Err(e) => {
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response();
        }
    };

    let role = proposal
        .role
        .clone()
        .unwrap_or_else(|| identity.role.clone());
    let chain_id = proposal
        .chain_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // One chain, one actor, one role: the first intent binds it.
    match state.ledger.chain_role(&chain_id, &proposal.actor_id).await {
        Ok(Some(bound)) if bound != role => {
            return json_error(
                StatusCode::CONFLICT,
                &format!(
                    "role-lock violation: chain '{}' already binds actor '{}' to role '{}'",
                    chain_id, proposal.actor_id, bound
                ),
            )
            .into_response();
        }
        Ok(_) => {}
        Err(e) => return ledger_failure(e),
    }

    let intent_event_id = match append_with_retry(
        state.ledger.as_ref(),
        &proposal.actor_id,
        INBOUND_INTENT,
        proposal.intent_payload(&chain_id, &role),
    )
    .await
    {
        Ok(id) => id,
        Err(e) => return ledger_failure(e),
    };

    let outcome = evaluate(&proposal);
    let policy_event_id = match append_with_retry(
        state.ledger.as_ref(),
        &proposal.actor_id,
        &policy_eval_action(&proposal.action_type),
        outcome.ledger_payload(&proposal, &intent_event_id),
    )
    .await
    {
        Ok(id) => id,
        Err(e) => return ledger_failure(e),
    };

    // An escalation may consume a prior approval for the same triple.
    let mut decision = outcome.decision;
    let mut approval_consumed_event_id: Option<String> = None;
    if decision == Decision::Escalated {
        match state
            .ledger
            .find_valid_approval(
                &proposal.actor_id,
                &proposal.action_type,
                &proposal.content,
                state.config.approval_ttl_seconds,
            )
            .await
        {
            Ok(Some(approval)) => {
                let consumption = json!({
                    "approval_event_id": approval.id,
                    "original_intent_id": approval.payload_str("intent_event_id").unwrap_or(""),
                    "current_intent_event_id": intent_event_id,
                    "current_policy_event_id": policy_event_id,
                    "consumed_at": timestamp::now(),
                });
                match state
                    .ledger
                    .consume_approval(&approval.id, &proposal.actor_id, consumption)
                    .await
                {
                    Ok(id) => {
                        approval_consumed_event_id = Some(id);
                        decision = Decision::Approved;
                    }
                    // Lost the race to another proposal; stay escalated.
                    Err(LedgerError::AlreadyConsumed { .. }) => {}
                    Err(e) => return ledger_failure(e),
                }
            }
            Ok(None) => {}
            Err(e) => return ledger_failure(e),
        }
    }

    let mut response = json!({
        "chain_id": chain_id,
        "decision": decision.as_str(),
        "risk_score": outcome.risk_score,
        "intent_event_id": intent_event_id,
        "policy_event_id": policy_event_id,
        "violations": outcome.violations,
        "rationale": outcome.rationale,
        "matched_rules": outcome.matched_rules,
        "signals": outcome.signals,
        "actor_tier": identity.tier,
        "tier_description": tier_policy(identity.tier).map(|p| p.description).unwrap_or(""),
    });
    let fields = response
        .as_object_mut()
        .expect("response body is an object");
    if let Some(id) = approval_consumed_event_id {
        fields.insert("approval_consumed_event_id".into(), Value::String(id));
    }

    match decision {
        Decision::Denied => {
            fields.insert(
                "error".into(),
                Value::String("CONSTITUTIONAL VIOLATION -- proposal denied.".into()),
            );
            (StatusCode::FORBIDDEN, Json(response)).into_response()
        }
        Decision::Escalated => {
            if let Ok(Some(intent)) = state.ledger.get(&intent_event_id).await {
                if let Some((expires_at, hard_deadline)) =
                    escalation_deadlines(&intent.created_at, &state.config)
                {
                    fields.insert("expires_at".into(), Value::String(expires_at));
                    fields.insert("hard_deadline".into(), Value::String(hard_deadline));
                }
            }
            fields.insert(
                "message".into(),
                Value::String("Proposal requires human approval before execution.".into()),
            );
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Decision::Approved => {
            fields.insert(
                "message".into(),
                Value::String("Proposal approved. Cleared for execution.".into()),
            );
            (StatusCode::OK, Json(response)).into_response()
        }
    }
}

/// Authenticate the operator and validate an escalation's event pair.
///
/// Shared by /approve and /deny: both act only on an `INBOUND_INTENT` +
/// ESCALATED `POLICY_EVAL:*` pair from the same actor.
async fn authorize_escalation_target(
    state: &AppState,
    headers: &HeaderMap,
    body: &Value,
) -> Result<(Identity, Event, Event), Response> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err(
            json_error(StatusCode::UNAUTHORIZED, "missing Bearer token").into_response()
        );
    };
    let Some(operator) = state.identities.authenticate_bearer(token) else {
        return Err(json_error(StatusCode::UNAUTHORIZED, "invalid API key").into_response());
    };

    let intent_event_id = body.get("intent_event_id").and_then(Value::as_str);
    let policy_event_id = body.get("policy_event_id").and_then(Value::as_str);
    let (Some(intent_event_id), Some(policy_event_id)) = (intent_event_id, policy_event_id)
    else {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "intent_event_id and policy_event_id are required",
        )
        .into_response());
    };

    let intent = match state.ledger.get(intent_event_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            return Err(json_error(
                StatusCode::NOT_FOUND,
                &format!("intent event {} not found", intent_event_id),
            )
            .into_response())
        }
        Err(e) => return Err(ledger_failure(e)),
    };
    if intent.action_type != INBOUND_INTENT {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!(
                "event {} is not an INBOUND_INTENT (got '{}')",
                intent_event_id, intent.action_type
            ),
        )
        .into_response());
    }

    let policy = match state.ledger.get(policy_event_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            return Err(json_error(
                StatusCode::NOT_FOUND,
                &format!("policy event {} not found", policy_event_id),
            )
            .into_response())
        }
        Err(e) => return Err(ledger_failure(e)),
    };
    if !is_policy_eval(&policy.action_type) {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!(
                "event {} is not a POLICY_EVAL (got '{}')",
                policy_event_id, policy.action_type
            ),
        )
        .into_response());
    }
    if policy.payload_str("decision") != Some("ESCALATED") {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!(
                "policy decision is '{}', not ESCALATED",
                policy.payload_str("decision").unwrap_or("unknown")
            ),
        )
        .into_response());
    }
    if intent.actor_id != policy.actor_id {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "actor mismatch between intent and policy events",
        )
        .into_response());
    }

    Ok((operator, intent, policy))
}

/// POST /approve
pub(crate) async fn handle_approve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let (operator, intent, policy) =
        match authorize_escalation_target(&state, &headers, &body).await {
            Ok(validated) => validated,
            Err(response) => return response,
        };

    let approval_event_id = match append_with_retry(
        state.ledger.as_ref(),
        &operator.actor_id,
        HUMAN_APPROVAL_GRANTED,
        json!({
            "intent_event_id": intent.id,
            "policy_event_id": policy.id,
            "approved_scope": "allow_execute_once",
            "approved_at": timestamp::now(),
        }),
    )
    .await
    {
        Ok(id) => id,
        Err(e) => return ledger_failure(e),
    };

    let response = json!({
        "approval_event_id": approval_event_id,
        "intent_event_id": intent.id,
        "policy_event_id": policy.id,
        "status": HUMAN_APPROVAL_GRANTED,
        "scope": "allow_execute_once",
        "message": "Proposal approved by human operator.",
    });
    (StatusCode::OK, Json(response)).into_response()
}

/// POST /deny
pub(crate) async fn handle_deny(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let (operator, intent, policy) =
        match authorize_escalation_target(&state, &headers, &body).await {
            Ok(validated) => validated,
            Err(response) => return response,
        };
    let reason = body
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let denial_event_id = match append_with_retry(
        state.ledger.as_ref(),
        &operator.actor_id,
        HUMAN_DENIAL,
        json!({
            "intent_event_id": intent.id,
            "policy_event_id": policy.id,
            "reason": reason,
            "denied_at": timestamp::now(),
        }),
    )
    .await
    {
        Ok(id) => id,
        Err(e) => return ledger_failure(e),
    };

    let response = json!({
        "denial_event_id": denial_event_id,
        "intent_event_id": intent.id,
        "policy_event_id": policy.id,
        "status": HUMAN_DENIAL,
        "reason": reason,
        "message": "Proposal denied by human operator.",
    });
    (StatusCode::OK, Json(response)).into_response()
}

/// POST /execute
///
/// Decision gate, escalation state machine, tier gate, sandbox run,
/// evidence pipeline. Tier-blocked requests never reach the sandbox
/// probe.
pub(crate) async fn handle_execute(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(proposal_id) = body.get("proposal_id").and_then(Value::as_str) else {
        return json_error(StatusCode::UNPROCESSABLE_ENTITY, "proposal_id is required")
            .into_response();
    };

    let intent = match state.ledger.get(proposal_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            return json_error(
                StatusCode::NOT_FOUND,
                &format!("proposal {} not found", proposal_id),
            )
            .into_response()
        }
        Err(e) => return ledger_failure(e),
    };
    if intent.action_type != INBOUND_INTENT {
        return json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("event {} is not an INBOUND_INTENT", proposal_id),
        )
        .into_response();
    }

    let policy = match state.ledger.find_policy_eval_for_intent(proposal_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            return json_error(
                StatusCode::NOT_FOUND,
                &format!("no policy evaluation found for proposal {}", proposal_id),
            )
            .into_response()
        }
        Err(e) => return ledger_failure(e),
    };

    let decision = policy.payload_str("decision").unwrap_or("unknown");
    if decision == "DENIED" {
        return json_error(StatusCode::FORBIDDEN, "proposal was denied by policy")
            .into_response();
    }

    let mut has_human_approval = false;
    if decision == "ESCALATED" {
        match state.ledger.resolution_for_intent(proposal_id).await {
            Ok(Some(resolution)) => match resolution.action_type.as_str() {
                HUMAN_DENIAL => {
                    return json_error(
                        StatusCode::FORBIDDEN,
                        "proposal was denied by a human operator",
                    )
                    .into_response();
                }
                AUTO_DENIED_TIMEOUT => {
                    return json_error(
                        StatusCode::GONE,
                        "escalation expired and was auto-denied",
                    )
                    .into_response();
                }
                HUMAN_APPROVAL_GRANTED | APPROVAL_CONSUMED => {
                    has_human_approval = true;
                }
                _ => {}
            },
            Ok(None) => {
                // Unresolved: past the hard deadline the derived state is
                // already auto-denied, even before the sweeper lands.
                let derived = classify(
                    &intent.created_at,
                    false,
                    time::OffsetDateTime::now_utc(),
                    &state.config,
                );
                if derived == EscalationState::AutoDeniedTimeout {
                    return json_error(StatusCode::GONE, "escalation expired").into_response();
                }
                let response = json!({
                    "message": "proposal is awaiting human approval",
                    "proposal_id": proposal_id,
                });
                return (StatusCode::ACCEPTED, Json(response)).into_response();
            }
            Err(e) => return ledger_failure(e),
        }
    }

    let identity = match state.identities.validate(&intent.actor_id) {
        Ok(identity) => identity,
        Err(e) => return json_error(StatusCode::FORBIDDEN, &e.to_string()).into_response(),
    };
    let (allowed, gate_reason) = check_execution_allowed(identity.tier, has_human_approval);
    if !allowed {
        let response = json!({
            "error": gate_reason,
            "tier": identity.tier,
            "tier_policy": tier_policy(identity.tier).map(|p| p.description).unwrap_or(""),
        });
        return (StatusCode::FORBIDDEN, Json(response)).into_response();
    }

    if !gavel_sandbox::is_available().await {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "sandbox runtime is unavailable",
        )
        .into_response();
    }

    let command = intent.payload_str("content").unwrap_or("").to_string();
    let result = match gavel_sandbox::run(&command, None, &state.blastbox).await {
        Ok(result) => result,
        Err(e) => {
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("sandbox execution failed: {}", e),
            )
            .into_response()
        }
    };

    let packet = build_packet(
        &intent.id,
        intent.payload_str("chain_id").unwrap_or(""),
        &intent.actor_id,
        intent.payload_str("action_type").unwrap_or(""),
        &command,
        &result,
        &state.blastbox,
    );
    let evidence_event_id = match record_packet(state.ledger.as_ref(), &packet).await {
        Ok(id) => id,
        Err(e) => return ledger_failure(e),
    };

    let allow_paths: Option<Vec<String>> = intent
        .intent_payload
        .get("scope")
        .and_then(|scope| scope.get("allow_paths"))
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        });
    let review = review_evidence(&packet, allow_paths.as_deref());
    let review_event_id = match record_review(state.ledger.as_ref(), &packet, &review).await {
        Ok(id) => id,
        Err(e) => return ledger_failure(e),
    };

    let (auto_approved, auto_reason) = evaluate_evidence_for_auto_approve(&review, identity.tier);
    let mut auto_approve_event_id: Option<String> = None;
    if auto_approved {
        match append_with_retry(
            state.ledger.as_ref(),
            GATEWAY_ACTOR,
            EVIDENCE_AUTO_APPROVE,
            json!({
                "proposal_id": intent.id,
                "auto_approved": true,
                "reason": auto_reason,
            }),
        )
        .await
        {
            Ok(id) => auto_approve_event_id = Some(id),
            Err(e) => return ledger_failure(e),
        }
    }

    let mut response = json!({
        "evidence_event_id": evidence_event_id,
        "review_event_id": review_event_id,
        "evidence_packet": packet,
        "review": review,
        "tier": identity.tier,
        "tier_policy": tier_policy(identity.tier).map(|p| p.description).unwrap_or(""),
    });
    if let Some(id) = auto_approve_event_id {
        response
            .as_object_mut()
            .expect("response body is an object")
            .insert("auto_approve_event_id".into(), Value::String(id));
    }
    (StatusCode::OK, Json(response)).into_response()
}

/// GET /escalations
pub(crate) async fn handle_escalations(State(state): State<Arc<AppState>>) -> Response {
    let summary = match escalation_summary(state.ledger.as_ref(), &state.config).await {
        Ok(summary) => summary,
        Err(e) => return ledger_failure(e),
    };
    let response = json!({
        "summary": summary,
        "initial_timeout_seconds": state.config.escalation_initial_timeout_seconds,
        "max_timeout_seconds": state.config.escalation_max_timeout_seconds,
    });
    (StatusCode::OK, Json(response)).into_response()
}
