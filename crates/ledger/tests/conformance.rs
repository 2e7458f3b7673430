//! Both built-in backends run the full conformance suite.

use std::sync::atomic::{AtomicU32, Ordering};

use gavel_ledger::conformance::run_conformance_suite;
use gavel_ledger::{FileLedger, MemoryLedger};

#[tokio::test]
async fn memory_backend_conformance() {
    let report = run_conformance_suite(|| async { MemoryLedger::new("1.0.0") }).await;
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn file_backend_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let counter = AtomicU32::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let path = dir.path().join(format!("ledger-{}.jsonl", n));
        async move { FileLedger::open(path, "1.0.0").unwrap() }
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}
