//! Gavel core -- shared model for the governance control plane.
//!
//! Everything here is pure: the audit event record and its hash-chain
//! formula, the canonical JSON serializer both the writer and the verifier
//! use, the proposal envelope, the actor allowlist, the autonomy tier
//! table, and the environment-driven configuration. Storage, evaluation,
//! and transport live in the sibling crates.

pub mod canonical;
pub mod config;
pub mod envelope;
pub mod event;
pub mod hash;
pub mod identity;
pub mod tier;
pub mod timestamp;

pub use canonical::canonical_json;
pub use config::GovernanceConfig;
pub use envelope::{parse_proposal, EnvelopeError, Proposal, Scope};
pub use event::Event;
pub use hash::{event_hash, sha256_hex, GENESIS_HASH};
pub use identity::{key_fingerprint, Identity, IdentityError, IdentityRegistry};
pub use tier::{check_execution_allowed, tier_policy, TierPolicy};
