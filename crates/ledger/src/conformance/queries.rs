//! Query conformance: evaluation pairing, role locking, resolutions.

use std::future::Future;

use serde_json::json;

use super::TestResult;
use crate::traits::LedgerStore;

pub(super) async fn run<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    let store = factory().await;
    results.push(TestResult::from_result(
        "queries",
        "policy_eval_explicit_pairing",
        policy_eval_explicit_pairing(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "queries",
        "policy_eval_legacy_fallback",
        policy_eval_legacy_fallback(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "queries",
        "chain_role_first_intent_wins",
        chain_role_first_intent_wins(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "queries",
        "resolved_intent_ids_sees_all_resolution_kinds",
        resolved_intent_ids_sees_all_resolution_kinds(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "queries",
        "escalated_with_intents_pairs_both_ways",
        escalated_with_intents_pairs_both_ways(&store).await,
    ));

    results
}

async fn seed_intent<S: LedgerStore>(
    store: &S,
    actor: &str,
    content: &str,
    chain_id: &str,
    role: &str,
) -> Result<String, String> {
    store
        .append(
            actor,
            "INBOUND_INTENT",
            json!({
                "action_type": "bash",
                "content": content,
                "chain_id": chain_id,
                "role": role,
            }),
        )
        .await
        .map_err(|e| e.to_string())
}

async fn policy_eval_explicit_pairing<S: LedgerStore>(store: &S) -> Result<(), String> {
    let intent_a = seed_intent(store, "agent:coder", "curl a", "c1", "developer").await?;
    let intent_b = seed_intent(store, "agent:coder", "curl b", "c1", "developer").await?;
    // Evaluations land out of intent order; explicit ids must still pair.
    let eval_b = store
        .append(
            "agent:coder",
            "POLICY_EVAL:BASH",
            json!({"decision": "ESCALATED", "intent_event_id": intent_b}),
        )
        .await
        .map_err(|e| e.to_string())?;
    let eval_a = store
        .append(
            "agent:coder",
            "POLICY_EVAL:BASH",
            json!({"decision": "ESCALATED", "intent_event_id": intent_a}),
        )
        .await
        .map_err(|e| e.to_string())?;

    let found_a = store
        .find_policy_eval_for_intent(&intent_a)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("no evaluation found for intent a")?;
    let found_b = store
        .find_policy_eval_for_intent(&intent_b)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("no evaluation found for intent b")?;
    if found_a.id != eval_a || found_b.id != eval_b {
        return Err("explicit intent_event_id pairing mismatched".to_string());
    }
    Ok(())
}

async fn policy_eval_legacy_fallback<S: LedgerStore>(store: &S) -> Result<(), String> {
    let intent = seed_intent(store, "agent:coder", "echo hi", "c1", "developer").await?;
    let eval = store
        .append(
            "agent:coder",
            "POLICY_EVAL:BASH",
            json!({"decision": "APPROVED"}),
        )
        .await
        .map_err(|e| e.to_string())?;
    let found = store
        .find_policy_eval_for_intent(&intent)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("legacy correlation found nothing")?;
    if found.id != eval {
        return Err("legacy correlation paired the wrong evaluation".to_string());
    }
    Ok(())
}

async fn chain_role_first_intent_wins<S: LedgerStore>(store: &S) -> Result<(), String> {
    seed_intent(store, "agent:coder", "echo 1", "chain-9", "developer").await?;
    seed_intent(store, "agent:coder", "echo 2", "chain-9", "intruder").await?;
    let role = store
        .chain_role("chain-9", "agent:coder")
        .await
        .map_err(|e| e.to_string())?;
    if role.as_deref() != Some("developer") {
        return Err(format!("expected first-bound role 'developer', got {:?}", role));
    }
    let missing = store
        .chain_role("chain-9", "agent:other")
        .await
        .map_err(|e| e.to_string())?;
    if missing.is_some() {
        return Err("role reported for an actor with no intents".to_string());
    }
    Ok(())
}

async fn resolved_intent_ids_sees_all_resolution_kinds<S: LedgerStore>(
    store: &S,
) -> Result<(), String> {
    let approved = seed_intent(store, "agent:a", "curl 1", "c1", "developer").await?;
    let denied = seed_intent(store, "agent:b", "curl 2", "c2", "developer").await?;
    let consumed = seed_intent(store, "agent:c", "curl 3", "c3", "developer").await?;
    let timed_out = seed_intent(store, "agent:d", "curl 4", "c4", "developer").await?;
    let open = seed_intent(store, "agent:e", "curl 5", "c5", "developer").await?;

    store
        .append(
            "human:operator",
            "HUMAN_APPROVAL_GRANTED",
            json!({"intent_event_id": approved}),
        )
        .await
        .map_err(|e| e.to_string())?;
    store
        .append(
            "human:operator",
            "HUMAN_DENIAL",
            json!({"intent_event_id": denied}),
        )
        .await
        .map_err(|e| e.to_string())?;
    store
        .append(
            "agent:c",
            "APPROVAL_CONSUMED",
            json!({"approval_event_id": "x", "current_intent_event_id": consumed}),
        )
        .await
        .map_err(|e| e.to_string())?;
    store
        .append(
            "system:gateway",
            "AUTO_DENIED_TIMEOUT",
            json!({"intent_event_id": timed_out}),
        )
        .await
        .map_err(|e| e.to_string())?;

    let all = vec![
        approved.clone(),
        denied.clone(),
        consumed.clone(),
        timed_out.clone(),
        open.clone(),
    ];
    let resolved = store
        .resolved_intent_ids(&all)
        .await
        .map_err(|e| e.to_string())?;
    for id in [&approved, &denied, &consumed, &timed_out] {
        if !resolved.contains(id.as_str()) {
            return Err(format!("intent {} missing from resolved set", id));
        }
    }
    if resolved.contains(open.as_str()) {
        return Err("unresolved intent reported as resolved".to_string());
    }
    Ok(())
}

async fn escalated_with_intents_pairs_both_ways<S: LedgerStore>(store: &S) -> Result<(), String> {
    let explicit = seed_intent(store, "agent:a", "curl x", "c1", "developer").await?;
    store
        .append(
            "agent:a",
            "POLICY_EVAL:BASH",
            json!({"decision": "ESCALATED", "intent_event_id": explicit}),
        )
        .await
        .map_err(|e| e.to_string())?;

    let legacy = seed_intent(store, "agent:b", "curl y", "c2", "developer").await?;
    store
        .append("agent:b", "POLICY_EVAL:BASH", json!({"decision": "ESCALATED"}))
        .await
        .map_err(|e| e.to_string())?;

    // APPROVED evaluations never show up.
    let approved = seed_intent(store, "agent:c", "echo z", "c3", "developer").await?;
    store
        .append(
            "agent:c",
            "POLICY_EVAL:BASH",
            json!({"decision": "APPROVED", "intent_event_id": approved}),
        )
        .await
        .map_err(|e| e.to_string())?;

    let pairs = store
        .escalated_with_intents()
        .await
        .map_err(|e| e.to_string())?;
    if pairs.len() != 2 {
        return Err(format!("expected 2 escalation pairs, got {}", pairs.len()));
    }
    let ids: Vec<&str> = pairs.iter().map(|p| p.intent_event_id.as_str()).collect();
    if !ids.contains(&explicit.as_str()) || !ids.contains(&legacy.as_str()) {
        return Err("escalation pairing missed an intent".to_string());
    }
    Ok(())
}
