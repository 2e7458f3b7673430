//! Operator API key generation.
//!
//! Emits a `gvl_`-prefixed key, its `sha256:` fingerprint, and a
//! paste-ready identities snippet. Only the fingerprint is stored; the
//! raw key goes to the operator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde_json::json;

use gavel_core::identity::key_fingerprint;

/// A `gvl_`-prefixed key carrying 32 bytes of randomness.
pub(crate) fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("gvl_{}", URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn run(actor_id: &str) {
    let raw = generate_key();
    let fingerprint = key_fingerprint(&raw);

    let mut snippet = serde_json::Map::new();
    snippet.insert(
        actor_id.to_string(),
        json!({
            "role": "admin",
            "status": "active",
            "tier": 3,
            "key_fingerprint": fingerprint,
        }),
    );
    let snippet = serde_json::Value::Object(snippet);

    println!();
    println!("=== Gavel API Key ===");
    println!();
    println!("  Actor ID:    {}", actor_id);
    println!("  Raw Key:     {}", raw);
    println!("  Fingerprint: {}", fingerprint);
    println!();
    println!("--- Paste into identities.json under \"actors\" ---");
    println!(
        "{}",
        serde_json::to_string_pretty(&snippet).unwrap_or_default()
    );
    println!();
}
