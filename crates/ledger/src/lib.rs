//! The audit ledger: an append-only, hash-chained event store.
//!
//! [`LedgerStore`] is the contract every backend satisfies; the crate ships
//! an in-memory backend (single writer lock) and an append-only JSONL file
//! backend whose on-disk form can be re-verified out of process. The
//! [`conformance`] module is a backend-agnostic test suite both run.

mod chain;
mod error;
mod file;
mod memory;
mod traits;
mod verify;

pub mod conformance;

pub use error::LedgerError;
pub use file::{read_chain_file, FileLedger};
pub use memory::MemoryLedger;
pub use traits::{append_with_retry, EscalationPair, LedgerStore, APPEND_MAX_RETRIES};
pub use verify::{verify_events, ChainReport};
