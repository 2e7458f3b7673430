//! Approval conformance: triple matching, TTL, one-shot consumption.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::TestResult;
use crate::error::LedgerError;
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
        "approval",
        "matches_exact_triple_only",
        matches_exact_triple_only(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "approval",
        "expired_approval_is_invalid",
        expired_approval_is_invalid(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "approval",
        "consumption_is_one_shot",
        consumption_is_one_shot(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "approval",
        "concurrent_consumers_race_one_wins",
        concurrent_consumers_race_one_wins(store).await,
    ));

    results
}

/// Seed an intent + ESCALATED evaluation + approval for a triple.
/// Returns (intent_event_id, approval_event_id).
async fn grant<S: LedgerStore>(
    store: &S,
    actor: &str,
    action_type: &str,
    content: &str,
) -> Result<(String, String), String> {
    let intent = store
        .append(
            actor,
            "INBOUND_INTENT",
            json!({"action_type": action_type, "content": content, "chain_id": "c1", "role": "developer"}),
        )
        .await
        .map_err(|e| e.to_string())?;
    let policy = store
        .append(
            actor,
            "POLICY_EVAL:BASH",
            json!({"decision": "ESCALATED", "intent_event_id": intent}),
        )
        .await
        .map_err(|e| e.to_string())?;
    let approval = store
        .append(
            "human:operator",
            "HUMAN_APPROVAL_GRANTED",
            json!({"intent_event_id": intent, "policy_event_id": policy}),
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok((intent, approval))
}

async fn matches_exact_triple_only<S: LedgerStore>(store: &S) -> Result<(), String> {
    let (_, approval) = grant(store, "agent:coder", "bash", "curl https://api.example.com/x").await?;

    let hit = store
        .find_valid_approval("agent:coder", "bash", "curl https://api.example.com/x", 3600)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("matching triple not found")?;
    if hit.id != approval {
        return Err("found a different approval than the one granted".to_string());
    }

    for (actor, action, content) in [
        ("agent:other", "bash", "curl https://api.example.com/x"),
        ("agent:coder", "shell", "curl https://api.example.com/x"),
        ("agent:coder", "bash", "curl https://api.example.com/y"),
    ] {
        if store
            .find_valid_approval(actor, action, content, 3600)
            .await
            .map_err(|e| e.to_string())?
            .is_some()
        {
            return Err(format!(
                "approval matched a different triple ({}, {}, {})",
                actor, action, content
            ));
        }
    }
    Ok(())
}

async fn expired_approval_is_invalid<S: LedgerStore>(store: &S) -> Result<(), String> {
    grant(store, "agent:coder", "bash", "curl https://api.example.com/x").await?;
    // Let the approval age past a zero-second TTL.
    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    if store
        .find_valid_approval("agent:coder", "bash", "curl https://api.example.com/x", 0)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("approval older than the TTL was still valid".to_string());
    }
    Ok(())
}

async fn consumption_is_one_shot<S: LedgerStore>(store: &S) -> Result<(), String> {
    let (intent, approval) =
        grant(store, "agent:coder", "bash", "curl https://api.example.com/x").await?;

    store
        .consume_approval(
            &approval,
            "agent:coder",
            json!({"original_intent_id": intent}),
        )
        .await
        .map_err(|e| e.to_string())?;

    // The spent approval no longer matches.
    if store
        .find_valid_approval("agent:coder", "bash", "curl https://api.example.com/x", 3600)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err("consumed approval still reported valid".to_string());
    }

    // A second consumption attempt is refused.
    match store
        .consume_approval(
            &approval,
            "agent:coder",
            json!({"original_intent_id": intent}),
        )
        .await
    {
        Err(LedgerError::AlreadyConsumed { .. }) => Ok(()),
        Err(other) => Err(format!("expected AlreadyConsumed, got {}", other)),
        Ok(_) => Err("approval consumed twice".to_string()),
    }
}

async fn concurrent_consumers_race_one_wins<S: LedgerStore>(store: S) -> Result<(), String> {
    let store = Arc::new(store);
    let (intent, approval) =
        grant(store.as_ref(), "agent:coder", "bash", "curl https://api.example.com/x").await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let approval = approval.clone();
        let intent = intent.clone();
        handles.push(tokio::spawn(async move {
            store
                .consume_approval(
                    &approval,
                    "agent:coder",
                    json!({"original_intent_id": intent}),
                )
                .await
        }));
    }

    let mut wins = 0;
    let mut refusals = 0;
    for handle in handles {
        match handle.await.map_err(|e| e.to_string())? {
            Ok(_) => wins += 1,
            Err(LedgerError::AlreadyConsumed { .. }) => refusals += 1,
            Err(other) => return Err(format!("unexpected error: {}", other)),
        }
    }
    if wins != 1 {
        return Err(format!("expected exactly one winner, got {}", wins));
    }
    if refusals != 7 {
        return Err(format!("expected 7 refusals, got {}", refusals));
    }
    Ok(())
}
