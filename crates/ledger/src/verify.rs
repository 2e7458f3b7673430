//! Independent chain verification.

use gavel_core::event::Event;
use gavel_core::hash::GENESIS_HASH;

/// Outcome of a full chain re-verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    pub total: usize,
    pub broken: usize,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken == 0
    }
}

/// Rehash every event in append order.
///
/// An event is broken when its stored `previous_event_hash` does not match
/// its predecessor's `event_hash` (or `"GENESIS"` for the first event), or
/// when recomputing the hash formula over its fields disagrees with the
/// stored `event_hash`.
pub fn verify_events(events: &[Event]) -> ChainReport {
    let mut broken = 0;
    let mut previous_hash = GENESIS_HASH.to_string();
    for event in events {
        if !event.verify_against(&previous_hash) {
            broken += 1;
        }
        previous_hash = event.event_hash.clone();
    }
    ChainReport {
        total: events.len(),
        broken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build_chain(n: usize) -> Vec<Event> {
        let mut state = crate::chain::ChainState::new("1.0.0".to_string());
        for i in 0..n {
            state.append(
                "agent:coder",
                "INBOUND_INTENT",
                json!({"content": format!("echo {}", i)}),
            );
        }
        state.events().to_vec()
    }

    #[test]
    fn empty_chain_is_intact() {
        let report = verify_events(&[]);
        assert_eq!(report.total, 0);
        assert!(report.is_intact());
    }

    #[test]
    fn intact_chain_verifies() {
        let events = build_chain(5);
        let report = verify_events(&events);
        assert_eq!(report.total, 5);
        assert_eq!(report.broken, 0);
    }

    #[test]
    fn payload_tampering_is_detected() {
        let mut events = build_chain(5);
        events[2].intent_payload = json!({"content": "echo tampered"});
        let report = verify_events(&events);
        assert!(report.broken >= 1);
    }

    #[test]
    fn link_tampering_is_detected() {
        let mut events = build_chain(3);
        events[1].previous_event_hash = "0".repeat(64);
        assert!(!verify_events(&events).is_intact());
    }
}
