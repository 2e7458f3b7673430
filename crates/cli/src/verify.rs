//! `gavel verify-chain` -- independent ledger re-verification.
//!
//! Walks a persisted ledger file, recomputes every SHA-256 outside the
//! serving process, and reports tampering. Exit code 1 on any breakage.

use std::path::Path;

use gavel_core::hash::GENESIS_HASH;
use gavel_ledger::read_chain_file;

pub(crate) fn run(ledger_path: &Path, quiet: bool) -> i32 {
    let events = match read_chain_file(ledger_path) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if events.is_empty() {
        println!("Ledger is empty -- nothing to verify.");
        return 0;
    }

    if !quiet {
        println!("Verifying chain of {} event(s)...\n", events.len());
    }

    let mut broken = 0usize;
    let mut previous_hash = GENESIS_HASH.to_string();
    for (i, event) in events.iter().enumerate() {
        let ok = event.verify_against(&previous_hash);
        if !ok {
            broken += 1;
        }
        if !quiet {
            let status = if ok { "OK" } else { "TAMPERED" };
            println!("  [{}] Event {}: {}", status, i + 1, event.action_type);
            println!("         Actor:    {}", event.actor_id);
            println!("         Hash:     {}...", &event.event_hash[..32.min(event.event_hash.len())]);
            if event.previous_event_hash == GENESIS_HASH {
                println!("         PrevHash: GENESIS");
            } else {
                println!(
                    "         PrevHash: {}...",
                    &event.previous_event_hash[..32.min(event.previous_event_hash.len())]
                );
            }
            if !ok {
                println!("         EXPECTED: {}...", &event.compute_hash()[..32]);
            }
            println!();
        }
        previous_hash = event.event_hash.clone();
    }

    if broken == 0 {
        println!(
            "CHAIN INTEGRITY: VALID -- all {} events verified.",
            events.len()
        );
        0
    } else {
        println!(
            "CHAIN INTEGRITY: BROKEN -- {} of {} events failed verification.",
            broken,
            events.len()
        );
        1
    }
}
