//! The hash-chain formula.
//!
//! Every ledger event's hash is a SHA-256 over pipe-joined material:
//!
//! ```text
//! previous_event_hash | actor_id | action_type
//!     | canonical(intent_payload) | policy_version | created_at
//! ```
//!
//! The first event chains from the literal `"GENESIS"`. This formula is
//! normative: the append path and every independent verifier must
//! reproduce it bit for bit.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json;

/// Sentinel `previous_event_hash` of the first event in a chain.
pub const GENESIS_HASH: &str = "GENESIS";

/// Lowercase hex SHA-256 of a byte string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)
}

/// Compute an event hash from its already-canonical parts.
pub fn event_hash_from_canonical(
    previous_event_hash: &str,
    actor_id: &str,
    action_type: &str,
    canonical_payload: &str,
    policy_version: &str,
    created_at: &str,
) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}|{}",
        previous_event_hash, actor_id, action_type, canonical_payload, policy_version, created_at
    );
    sha256_hex(material.as_bytes())
}

/// Compute an event hash, canonicalizing the payload first.
pub fn event_hash(
    previous_event_hash: &str,
    actor_id: &str,
    action_type: &str,
    intent_payload: &Value,
    policy_version: &str,
    created_at: &str,
) -> String {
    event_hash_from_canonical(
        previous_event_hash,
        actor_id,
        action_type,
        &canonical_json(intent_payload),
        policy_version,
        created_at,
    )
}
