//! The deterministic policy evaluator.
//!
//! `evaluate` is a pure function from a proposal to a structured decision.
//! All three check families run unconditionally and aggregate every
//! violation; the caller appends the outcome to the ledger.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gavel_core::envelope::Proposal;

use crate::rules::{FILE_ACTION_TYPES, FORBIDDEN_COMMANDS, PROTECTED_PATHS, SHELL_ACTION_TYPES, UNPROXIED_NETWORK};

/// Decision threshold: an aggregate risk at or above this is denied
/// outright instead of escalated.
const DENIAL_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Denied,
    Escalated,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "APPROVED",
            Decision::Denied => "DENIED",
            Decision::Escalated => "ESCALATED",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule breach, tagged with its constitution reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub description: String,
}

/// Full structured output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub decision: Decision,
    pub risk_score: f64,
    pub violations: Vec<Violation>,
    pub rationale: Vec<String>,
    pub matched_rules: Vec<String>,
    pub signals: Vec<String>,
}

impl PolicyOutcome {
    pub fn passed(&self) -> bool {
        self.decision == Decision::Approved
    }

    /// The `POLICY_EVAL:*` ledger payload for this outcome, carrying the
    /// explicit intent linkage and the proposal echo for audit.
    pub fn ledger_payload(&self, proposal: &Proposal, intent_event_id: &str) -> Value {
        json!({
            "decision": self.decision,
            "risk_score": self.risk_score,
            "violations": self.violations,
            "rationale": self.rationale,
            "matched_rules": self.matched_rules,
            "signals": self.signals,
            "proposal": proposal.evaluation_echo(),
            "intent_event_id": intent_event_id,
        })
    }
}

/// Aggregate risk: governance-invariant breaches weigh 0.9, operational
/// breaches 0.6, anything unrecognized 0.5; capped at 1.0.
fn risk_score(violations: &[Violation]) -> f64 {
    if violations.is_empty() {
        return 0.0;
    }
    let total: f64 = violations
        .iter()
        .map(|v| {
            let section = v.rule.split('.').next().unwrap_or(&v.rule);
            match section {
                "§I" => 0.9,
                "§II" => 0.6,
                _ => 0.5,
            }
        })
        .sum();
    total.min(1.0)
}

/// Evaluate a proposal against all rule families.
pub fn evaluate(proposal: &Proposal) -> PolicyOutcome {
    let mut violations: Vec<Violation> = Vec::new();
    let mut rationale: Vec<String> = Vec::new();
    let mut matched_rules: Vec<String> = Vec::new();
    let mut signals: Vec<String> = Vec::new();

    let action_type = proposal.action_type.to_lowercase();
    let is_shell = SHELL_ACTION_TYPES.contains(&action_type.as_str());
    let is_file_mutation = FILE_ACTION_TYPES.contains(&action_type.as_str());

    // Authority decoupling: file mutations may not touch protected paths.
    // One violation per target, however many patterns it trips.
    if is_file_mutation {
        let target = proposal
            .target_path
            .as_deref()
            .unwrap_or(&proposal.content);
        if PROTECTED_PATHS.iter().any(|p| p.is_match(target)) {
            violations.push(Violation {
                rule: "§I.2".to_string(),
                description: format!(
                    "Authority Decoupling: modification of protected path '{}' is prohibited.",
                    target
                ),
            });
            signals.push("protected_path_write".to_string());
            matched_rules.push("§I.2".to_string());
            rationale.push(format!(
                "Action targets protected governance path: {}",
                target
            ));
        }
    }

    // Operational constraints: every forbidden pattern in a shell command
    // is its own violation.
    if is_shell {
        for (pattern, description) in FORBIDDEN_COMMANDS.iter() {
            if pattern.is_match(&proposal.content) {
                violations.push(Violation {
                    rule: "§II".to_string(),
                    description: (*description).to_string(),
                });
                signals.push("destructive_command".to_string());
                matched_rules.push("§II".to_string());
                rationale.push(format!("Forbidden command detected: {}", description));
            }
        }

        // Unproxied network access.
        if UNPROXIED_NETWORK.is_match(&proposal.content) {
            violations.push(Violation {
                rule: "§II".to_string(),
                description: "External API calls must be proxied through the \
                     Governance Gateway for intent-logging."
                    .to_string(),
            });
            signals.push("external_network_access".to_string());
            matched_rules.push("§II".to_string());
            rationale.push("External network access must use governance gateway".to_string());
        }
    }

    let risk_score = risk_score(&violations);
    let decision = if violations.is_empty() {
        signals.push("standard_operation".to_string());
        rationale.push("No policy violations detected".to_string());
        Decision::Approved
    } else if risk_score >= DENIAL_THRESHOLD {
        Decision::Denied
    } else {
        Decision::Escalated
    };

    // De-duplicate matched rules, preserving first-seen order.
    let mut seen = std::collections::HashSet::new();
    matched_rules.retain(|rule| seen.insert(rule.clone()));

    PolicyOutcome {
        decision,
        risk_score,
        violations,
        rationale,
        matched_rules,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_core::envelope::parse_proposal;
    use serde_json::json;

    fn proposal(action_type: &str, content: &str) -> Proposal {
        parse_proposal(&json!({
            "actor_id": "agent:coder",
            "action_type": action_type,
            "content": content,
        }))
        .unwrap()
    }

    #[test]
    fn harmless_bash_is_approved_with_zero_risk() {
        let outcome = evaluate(&proposal("bash", "echo hello"));
        assert_eq!(outcome.decision, Decision::Approved);
        assert_eq!(outcome.risk_score, 0.0);
        assert!(outcome.violations.is_empty());
        assert!(outcome.signals.contains(&"standard_operation".to_string()));
        assert!(outcome
            .rationale
            .contains(&"No policy violations detected".to_string()));
    }

    #[test]
    fn constitution_edit_is_denied_at_point_nine() {
        let outcome = evaluate(&proposal("file_edit", "CONSTITUTION.md"));
        assert_eq!(outcome.decision, Decision::Denied);
        assert!(outcome.risk_score >= 0.9);
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].rule, "§I.2");
        assert!(outcome
            .signals
            .contains(&"protected_path_write".to_string()));
    }

    #[test]
    fn governance_path_checks_honor_target_path_over_content() {
        let full = parse_proposal(&json!({
            "actor_id": "agent:coder",
            "action_type": "file_write",
            "content": "new contents",
            "target_path": "governance/identities.json",
        }))
        .unwrap();
        let outcome = evaluate(&full);
        assert_eq!(outcome.decision, Decision::Denied);
        assert_eq!(outcome.violations[0].rule, "§I.2");
    }

    #[test]
    fn single_curl_escalates_at_point_six() {
        let outcome = evaluate(&proposal("bash", "curl https://api.example.com/x"));
        assert_eq!(outcome.decision, Decision::Escalated);
        assert!((outcome.risk_score - 0.6).abs() < f64::EPSILON);
        assert!(outcome
            .signals
            .contains(&"external_network_access".to_string()));
        assert_eq!(outcome.matched_rules, vec!["§II".to_string()]);
    }

    #[test]
    fn stacked_shell_violations_cap_at_one_and_deny() {
        let outcome = evaluate(&proposal("bash", "sudo rm -rf /"));
        assert_eq!(outcome.decision, Decision::Denied);
        assert_eq!(outcome.risk_score, 1.0);
        assert!(outcome.violations.len() >= 2);
        // Two section-II breaches collapse to one matched rule.
        assert_eq!(outcome.matched_rules, vec!["§II".to_string()]);
    }

    #[test]
    fn shell_checks_do_not_apply_to_file_actions() {
        let outcome = evaluate(&proposal("file_write", "curl in a text file"));
        assert_eq!(outcome.decision, Decision::Approved);
    }

    #[test]
    fn file_checks_do_not_apply_to_shell_actions() {
        let outcome = evaluate(&proposal("bash", "cat CONSTITUTION.md"));
        assert_eq!(outcome.decision, Decision::Approved);
    }

    #[test]
    fn violations_and_decision_are_consistent() {
        for (action_type, content) in [
            ("bash", "echo ok"),
            ("bash", "curl https://x.example"),
            ("bash", "sudo ls"),
            ("bash", "sudo rm -rf /"),
            ("file_edit", "CONSTITUTION.md"),
            ("file_edit", "src/main.rs"),
        ] {
            let outcome = evaluate(&proposal(action_type, content));
            assert_eq!(
                outcome.violations.is_empty(),
                outcome.decision == Decision::Approved,
                "{} {}",
                action_type,
                content
            );
            if !outcome.violations.is_empty() {
                assert_eq!(
                    outcome.risk_score >= 0.8,
                    outcome.decision == Decision::Denied,
                    "{} {}",
                    action_type,
                    content
                );
            }
        }
    }

    #[test]
    fn ledger_payload_carries_intent_linkage_and_echo() {
        let p = proposal("bash", "curl https://api.example.com/x");
        let outcome = evaluate(&p);
        let payload = outcome.ledger_payload(&p, "intent-123");
        assert_eq!(payload["intent_event_id"], "intent-123");
        assert_eq!(payload["decision"], "ESCALATED");
        assert_eq!(payload["proposal"]["actor_id"], "agent:coder");
        assert_eq!(payload["proposal"]["content"], "curl https://api.example.com/x");
    }
}
