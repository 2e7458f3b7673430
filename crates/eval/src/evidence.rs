//! Evidence packets: hashed, canonical records of sandbox executions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gavel_core::canonical::canonical_json;
use gavel_core::event::EVIDENCE_PACKET;
use gavel_core::hash::sha256_hex;
use gavel_core::timestamp;
use gavel_ledger::{append_with_retry, LedgerError, LedgerStore};
use gavel_sandbox::{BlastBoxConfig, BlastBoxResult};

/// The tamper-evident record of one sandbox execution.
///
/// `evidence_hash` is a SHA-256 over the canonical serialization of every
/// other field, so two packets with identical inputs and `created_at`
/// hash identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePacket {
    pub proposal_id: String,
    pub chain_id: String,
    pub actor_id: String,
    pub action_type: String,
    pub command: String,
    pub blast_box: Value,
    pub environment: Value,
    pub created_at: String,
    pub evidence_hash: String,
}

/// Assemble and hash a packet from a sandbox result.
pub fn build_packet(
    proposal_id: &str,
    chain_id: &str,
    actor_id: &str,
    action_type: &str,
    command: &str,
    result: &BlastBoxResult,
    config: &BlastBoxConfig,
) -> EvidencePacket {
    build_packet_at(
        proposal_id,
        chain_id,
        actor_id,
        action_type,
        command,
        result,
        config,
        timestamp::now(),
    )
}

/// As [`build_packet`] with an explicit creation timestamp.
#[allow(clippy::too_many_arguments)]
pub fn build_packet_at(
    proposal_id: &str,
    chain_id: &str,
    actor_id: &str,
    action_type: &str,
    command: &str,
    result: &BlastBoxResult,
    config: &BlastBoxConfig,
    created_at: String,
) -> EvidencePacket {
    let blast_box = serde_json::to_value(result).unwrap_or_else(|_| json!({}));
    let environment = config.environment_json();

    let pre_hash = json!({
        "proposal_id": proposal_id,
        "chain_id": chain_id,
        "actor_id": actor_id,
        "action_type": action_type,
        "command": command,
        "blast_box": blast_box,
        "environment": environment,
        "created_at": created_at,
    });
    let evidence_hash = sha256_hex(canonical_json(&pre_hash).as_bytes());

    EvidencePacket {
        proposal_id: proposal_id.to_string(),
        chain_id: chain_id.to_string(),
        actor_id: actor_id.to_string(),
        action_type: action_type.to_string(),
        command: command.to_string(),
        blast_box,
        environment,
        created_at,
        evidence_hash,
    }
}

impl EvidencePacket {
    /// The sandbox diff, for review scans.
    pub fn workspace_diff(&self) -> &Value {
        self.blast_box
            .get("workspace_diff")
            .unwrap_or(&Value::Null)
    }

    pub fn stdout(&self) -> &str {
        self.blast_box
            .get("stdout")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn stderr(&self) -> &str {
        self.blast_box
            .get("stderr")
            .and_then(Value::as_str)
            .unwrap_or("")
    }
}

/// Append the packet to the ledger as an `EVIDENCE_PACKET` event.
pub async fn record_packet(
    ledger: &dyn LedgerStore,
    packet: &EvidencePacket,
) -> Result<String, LedgerError> {
    let payload = serde_json::to_value(packet)
        .map_err(|e| LedgerError::Backend(format!("evidence packet serialization: {}", e)))?;
    append_with_retry(ledger, &packet.actor_id, EVIDENCE_PACKET, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_ledger::MemoryLedger;
    use gavel_sandbox::WorkspaceDiff;

    fn sample_result() -> BlastBoxResult {
        BlastBoxResult {
            exit_code: 0,
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            duration_ms: 150,
            workspace_diff: WorkspaceDiff::default(),
            timed_out: false,
            oom_killed: false,
        }
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let result = sample_result();
        let config = BlastBoxConfig::default();
        let a = build_packet_at(
            "p1", "c1", "agent:coder", "bash", "echo hello",
            &result, &config, "2026-03-01T09:30:00.000000Z".to_string(),
        );
        let b = build_packet_at(
            "p1", "c1", "agent:coder", "bash", "echo hello",
            &result, &config, "2026-03-01T09:30:00.000000Z".to_string(),
        );
        assert_eq!(a.evidence_hash, b.evidence_hash);
        assert_eq!(a.evidence_hash.len(), 64);
    }

    #[test]
    fn any_input_change_changes_the_hash() {
        let result = sample_result();
        let config = BlastBoxConfig::default();
        let base = build_packet_at(
            "p1", "c1", "agent:coder", "bash", "echo hello",
            &result, &config, "2026-03-01T09:30:00.000000Z".to_string(),
        );
        let other_command = build_packet_at(
            "p1", "c1", "agent:coder", "bash", "echo changed",
            &result, &config, "2026-03-01T09:30:00.000000Z".to_string(),
        );
        let mut altered = sample_result();
        altered.exit_code = 1;
        let other_result = build_packet_at(
            "p1", "c1", "agent:coder", "bash", "echo hello",
            &altered, &config, "2026-03-01T09:30:00.000000Z".to_string(),
        );
        assert_ne!(base.evidence_hash, other_command.evidence_hash);
        assert_ne!(base.evidence_hash, other_result.evidence_hash);
    }

    #[test]
    fn accessors_read_through_the_blast_box_document() {
        let mut result = sample_result();
        result.stderr = "warning\n".to_string();
        let packet = build_packet(
            "p1", "c1", "agent:coder", "bash", "echo hello",
            &result, &BlastBoxConfig::default(),
        );
        assert_eq!(packet.stdout(), "hello\n");
        assert_eq!(packet.stderr(), "warning\n");
        assert!(packet.workspace_diff().get("added").is_some());
    }

    #[tokio::test]
    async fn record_packet_appends_the_full_document() {
        let ledger = MemoryLedger::new("1.0.0");
        let packet = build_packet(
            "p1", "c1", "agent:coder", "bash", "echo hello",
            &sample_result(), &BlastBoxConfig::default(),
        );
        let event_id = record_packet(&ledger, &packet).await.unwrap();
        let event = ledger.get(&event_id).await.unwrap().unwrap();
        assert_eq!(event.action_type, "EVIDENCE_PACKET");
        assert_eq!(event.payload_str("evidence_hash"), Some(packet.evidence_hash.as_str()));
        assert_eq!(event.payload_str("proposal_id"), Some("p1"));
    }
}
