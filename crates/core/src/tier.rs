//! Tiered autonomy.
//!
//! Tier 0: propose-only. Tier 1: sandbox execution only. Tier 2: reserved
//! for canary + attestation and rejected at runtime. Tier 3: production
//! execution gated on explicit human approval.

/// What a tier permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub tier: u8,
    pub can_execute: bool,
    pub requires_sandbox: bool,
    pub requires_human_approval: bool,
    pub description: &'static str,
}

pub const TIER_POLICIES: [TierPolicy; 4] = [
    TierPolicy {
        tier: 0,
        can_execute: false,
        requires_sandbox: false,
        requires_human_approval: false,
        description: "Propose-only: no execution permitted",
    },
    TierPolicy {
        tier: 1,
        can_execute: true,
        requires_sandbox: true,
        requires_human_approval: false,
        description: "Sandbox execution: blast box only",
    },
    TierPolicy {
        tier: 2,
        can_execute: true,
        requires_sandbox: true,
        requires_human_approval: false,
        description: "Canary + attestations (not yet implemented)",
    },
    TierPolicy {
        tier: 3,
        can_execute: true,
        requires_sandbox: false,
        requires_human_approval: true,
        description: "Production execution with human approval",
    },
];

/// The policy row for a tier, if the tier is defined.
pub fn tier_policy(tier: u8) -> Option<&'static TierPolicy> {
    TIER_POLICIES.iter().find(|p| p.tier == tier)
}

/// Whether an actor at `tier` may execute right now.
///
/// Returns the gate decision and a reason naming the tier, suitable for
/// surfacing verbatim in a 403 body.
pub fn check_execution_allowed(tier: u8, has_human_approval: bool) -> (bool, String) {
    match tier {
        0 => (
            false,
            "Tier 0: propose-only, execution not permitted".to_string(),
        ),
        1 => (true, "Tier 1: sandbox execution permitted".to_string()),
        2 => (
            false,
            "Tier 2: canary execution not yet implemented".to_string(),
        ),
        3 if has_human_approval => (
            true,
            "Tier 3: production execution with human approval".to_string(),
        ),
        3 => (false, "Tier 3: requires human approval".to_string()),
        other => (false, format!("Unknown tier {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_rows_with_expected_flags() {
        assert_eq!(TIER_POLICIES.len(), 4);
        assert!(!tier_policy(0).unwrap().can_execute);
        assert!(tier_policy(1).unwrap().requires_sandbox);
        assert!(tier_policy(3).unwrap().requires_human_approval);
        assert!(tier_policy(4).is_none());
    }

    #[test]
    fn gate_matrix() {
        assert!(!check_execution_allowed(0, false).0);
        assert!(!check_execution_allowed(0, true).0);
        assert!(check_execution_allowed(1, false).0);
        assert!(!check_execution_allowed(2, false).0);
        assert!(!check_execution_allowed(3, false).0);
        assert!(check_execution_allowed(3, true).0);
        assert!(!check_execution_allowed(7, true).0);
    }

    #[test]
    fn reasons_name_the_tier() {
        let (_, reason) = check_execution_allowed(0, false);
        assert!(reason.contains("Tier 0"));
        let (_, reason) = check_execution_allowed(3, false);
        assert!(reason.contains("Tier 3"));
    }
}
