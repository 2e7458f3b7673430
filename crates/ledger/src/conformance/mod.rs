//! Conformance test suite for `LedgerStore` implementations.
//!
//! A backend-agnostic suite any `LedgerStore` can run to verify the
//! contract it must uphold:
//!
//! - **Chain**: genesis linkage, hash chaining, monotonic timestamps,
//!   canonical payload round-trips, full re-verification
//! - **Queries**: intent/evaluation pairing (explicit field and legacy
//!   correlation), role locking, resolution lookups
//! - **Approvals**: triple matching, TTL expiry, one-shot consumption,
//!   and the concurrent double-consume race
//! - **Concurrency**: many writers appending in parallel with an intact
//!   chain afterwards
//!
//! # Usage
//!
//! Backend tests call [`run_conformance_suite`] with a factory that
//! creates a fresh, empty store per test:
//!
//! ```ignore
//! use gavel_ledger::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         MemoryLedger::new("1.0.0")
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod approval;
mod chain;
mod concurrent;
mod queries;

use std::fmt;
use std::future::Future;

use crate::traits::LedgerStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "chain", "approval").
    pub category: String,
    /// Test name.
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
}

impl ConformanceReport {
    fn new(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        Self {
            results,
            passed,
            failed,
        }
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ledger conformance: {} passed, {} failed",
            self.passed, self.failed
        )?;
        for result in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL {}::{}: {}",
                result.category,
                result.name,
                result.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full suite, creating a fresh store per test via `factory`.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();
    results.extend(chain::run(&factory).await);
    results.extend(queries::run(&factory).await);
    results.extend(approval::run(&factory).await);
    results.extend(concurrent::run(&factory).await);
    ConformanceReport::new(results)
}
