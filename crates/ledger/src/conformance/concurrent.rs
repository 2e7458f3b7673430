//! Concurrency conformance: many writers, one intact chain.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::TestResult;
use crate::traits::LedgerStore;

pub(super) async fn run<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    vec![TestResult::from_result(
        "concurrent",
        "hundred_appends_across_ten_writers",
        hundred_appends_across_ten_writers(store).await,
    )]
}

async fn hundred_appends_across_ten_writers<S: LedgerStore>(store: S) -> Result<(), String> {
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for writer in 0..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let actor = format!("agent:writer-{}", writer);
            for i in 0..10 {
                crate::traits::append_with_retry(
                    store.as_ref(),
                    &actor,
                    "INBOUND_INTENT",
                    json!({"content": format!("echo {}-{}", writer, i)}),
                )
                .await?;
            }
            Ok::<(), crate::error::LedgerError>(())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?;
    }

    let report = store.verify_chain().await.map_err(|e| e.to_string())?;
    if report.total != 100 {
        return Err(format!("expected 100 events, got {}", report.total));
    }
    if report.broken != 0 {
        return Err(format!("chain broken in {} places", report.broken));
    }

    // Linearised appends: timestamp order equals chain order.
    let events = store.events().await.map_err(|e| e.to_string())?;
    for pair in events.windows(2) {
        if pair[1].created_at <= pair[0].created_at {
            return Err("created_at order diverged from chain order".to_string());
        }
        if pair[1].previous_event_hash != pair[0].event_hash {
            return Err("hash linkage diverged from append order".to_string());
        }
    }
    Ok(())
}
