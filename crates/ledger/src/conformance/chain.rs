//! Chain-shape conformance: genesis, linkage, timestamps, round-trips.

use std::future::Future;

use serde_json::json;

use gavel_core::canonical::canonical_json;
use gavel_core::hash::GENESIS_HASH;

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
        "chain",
        "genesis_and_linkage",
        genesis_and_linkage(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "chain",
        "timestamps_strictly_increasing",
        timestamps_strictly_increasing(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "chain",
        "canonical_payload_round_trip",
        canonical_payload_round_trip(&store).await,
    ));

    let store = factory().await;
    results.push(TestResult::from_result(
        "chain",
        "reads_are_immutable",
        reads_are_immutable(&store).await,
    ));

    results
}

async fn genesis_and_linkage<S: LedgerStore>(store: &S) -> Result<(), String> {
    for i in 0..4 {
        store
            .append(
                "agent:coder",
                "INBOUND_INTENT",
                json!({"content": format!("echo {}", i)}),
            )
            .await
            .map_err(|e| e.to_string())?;
    }
    let events = store.events().await.map_err(|e| e.to_string())?;
    if events.len() != 4 {
        return Err(format!("expected 4 events, got {}", events.len()));
    }
    if events[0].previous_event_hash != GENESIS_HASH {
        return Err(format!(
            "first event chains from {:?}, not GENESIS",
            events[0].previous_event_hash
        ));
    }
    for pair in events.windows(2) {
        if pair[1].previous_event_hash != pair[0].event_hash {
            return Err(format!(
                "event {} does not chain from its predecessor",
                pair[1].id
            ));
        }
    }
    let report = store.verify_chain().await.map_err(|e| e.to_string())?;
    if !report.is_intact() || report.total != 4 {
        return Err(format!(
            "verify_chain reported total={} broken={}",
            report.total, report.broken
        ));
    }
    Ok(())
}

async fn timestamps_strictly_increasing<S: LedgerStore>(store: &S) -> Result<(), String> {
    for _ in 0..20 {
        store
            .append("agent:coder", "INBOUND_INTENT", json!({"content": "echo"}))
            .await
            .map_err(|e| e.to_string())?;
    }
    let events = store.events().await.map_err(|e| e.to_string())?;
    for pair in events.windows(2) {
        if pair[1].created_at <= pair[0].created_at {
            return Err(format!(
                "created_at not strictly increasing: {} then {}",
                pair[0].created_at, pair[1].created_at
            ));
        }
    }
    Ok(())
}

async fn canonical_payload_round_trip<S: LedgerStore>(store: &S) -> Result<(), String> {
    let payload = json!({
        "zeta": 1,
        "alpha": {"nested": [1.5, "x"], "flag": true},
        "content": "echo \"quoted\"\n",
    });
    let canonical_before = canonical_json(&payload);
    let id = store
        .append("agent:coder", "INBOUND_INTENT", payload)
        .await
        .map_err(|e| e.to_string())?;
    let event = store
        .get(&id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or("appended event not readable by id")?;
    let canonical_after = canonical_json(&event.intent_payload);
    if canonical_before != canonical_after {
        return Err(format!(
            "payload canonical form changed: {} vs {}",
            canonical_before, canonical_after
        ));
    }
    Ok(())
}

async fn reads_are_immutable<S: LedgerStore>(store: &S) -> Result<(), String> {
    let id = store
        .append("agent:coder", "INBOUND_INTENT", json!({"content": "echo"}))
        .await
        .map_err(|e| e.to_string())?;
    let first = store.get(&id).await.map_err(|e| e.to_string())?;
    store
        .append("agent:other", "INBOUND_INTENT", json!({"content": "ls"}))
        .await
        .map_err(|e| e.to_string())?;
    let second = store.get(&id).await.map_err(|e| e.to_string())?;
    if first != second {
        return Err("event changed between reads".to_string());
    }
    Ok(())
}
