//! Integration tests for the `gavel serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port with
//! its own identities document and ledger file, makes raw HTTP requests,
//! and verifies statuses, bodies, and ledger effects.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use gavel_core::identity::key_fingerprint;
use serde_json::{json, Value};

/// Operator bearer token used across tests; only its fingerprint is in
/// the identities document.
const OPERATOR_TOKEN: &str = "gvl_test_operator_token";

/// Atomic port counter seeded from the process id, so parallel test
/// binaries don't collide on a port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 21000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

fn write_identities(dir: &Path) -> PathBuf {
    let path = dir.join("identities.json");
    let doc = json!({
        "actors": {
            "agent:coder": {"role": "developer", "status": "active", "tier": 1},
            "agent:reviewer": {"role": "reviewer", "status": "active", "tier": 0},
            "agent:rogue": {"role": "developer", "status": "revoked", "tier": 1},
            "human:operator": {
                "role": "admin",
                "status": "active",
                "tier": 3,
                "key_fingerprint": key_fingerprint(OPERATOR_TOKEN),
            },
        }
    });
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    path
}

/// A running `gavel serve` child, killed on drop.
struct Server {
    child: Child,
    port: u16,
    ledger_path: PathBuf,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn start_server(dir: &Path, envs: &[(&str, &str)]) -> Server {
    let port = next_port();
    let identities = write_identities(dir);
    let ledger_path = dir.join(format!("ledger-{}.jsonl", port));

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gavel"));
    cmd.arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .arg("--identities")
        .arg(&identities)
        .arg("--ledger")
        .arg(&ledger_path);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let child = cmd.spawn().expect("failed to start gavel serve");
    let server = Server {
        child,
        port,
        ledger_path,
    };
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return server;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("gavel serve did not start listening on port {}", port);
}

fn raw_request(port: u16, request: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect failed");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();

    let status: u16 = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = raw
        .split("\r\n\r\n")
        .nth(1)
        .and_then(|b| serde_json::from_str(b).ok())
        .unwrap_or(Value::Null);
    (status, body)
}

fn http_get(port: u16, path: &str) -> (u16, Value) {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    );
    raw_request(port, &request)
}

fn http_post(port: u16, path: &str, body: &Value, bearer: Option<&str>) -> (u16, Value) {
    let payload = body.to_string();
    let auth = bearer
        .map(|token| format!("Authorization: Bearer {}\r\n", token))
        .unwrap_or_default();
    let request = format!(
        "POST {} HTTP/1.1\r\nHost: 127.0.0.1\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        path,
        auth,
        payload.len(),
        payload
    );
    raw_request(port, &request)
}

fn propose(port: u16, actor: &str, action_type: &str, content: &str) -> (u16, Value) {
    http_post(
        port,
        "/propose",
        &json!({"actor_id": actor, "action_type": action_type, "content": content}),
        None,
    )
}

#[test]
fn health_reports_operational() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let (status, body) = http_get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["service"], "governance-gateway");
}

#[test]
fn safe_bash_is_approved() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let (status, body) = propose(server.port, "agent:coder", "bash", "echo hello");
    assert_eq!(status, 200);
    assert_eq!(body["decision"], "APPROVED");
    assert_eq!(body["risk_score"], 0.0);
    assert!(body["signals"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "standard_operation"));
    assert!(body["intent_event_id"].as_str().unwrap().len() > 10);
    assert!(body["policy_event_id"].as_str().unwrap().len() > 10);
    assert!(body["chain_id"].as_str().is_some());
}

#[test]
fn constitution_edit_is_denied() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let (status, body) = propose(server.port, "agent:coder", "file_edit", "CONSTITUTION.md");
    assert_eq!(status, 403);
    assert_eq!(body["decision"], "DENIED");
    assert!(body["risk_score"].as_f64().unwrap() >= 0.9);
    assert_eq!(body["violations"][0]["rule"], "§I.2");
    assert!(body["error"].as_str().is_some());
}

#[test]
fn unknown_actor_is_rejected_without_a_ledger_write() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let (status, body) = propose(server.port, "agent:ghost", "bash", "echo hi");
    assert_eq!(status, 403);
    assert!(body["error"].as_str().unwrap().contains("agent:ghost"));

    // Revoked actors are rejected the same way.
    let (status, _) = propose(server.port, "agent:rogue", "bash", "echo hi");
    assert_eq!(status, 403);

    // Nothing reached the chain.
    let ledger = std::fs::read_to_string(&server.ledger_path).unwrap_or_default();
    assert!(!ledger.contains("agent:ghost"));
    assert!(!ledger.contains("agent:rogue"));
}

#[test]
fn malformed_proposals_are_422() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let (status, body) = http_post(
        server.port,
        "/propose",
        &json!({"actor_id": "agent:coder", "content": "echo hi"}),
        None,
    );
    assert_eq!(status, 422);
    assert!(body["error"].as_str().unwrap().contains("action_type"));
}

#[test]
fn escalation_approval_consumption_is_one_shot() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let content = "curl https://api.example.com/x";

    // First proposal escalates with deadlines attached.
    let (status, body) = propose(server.port, "agent:coder", "bash", content);
    assert_eq!(status, 202);
    assert_eq!(body["decision"], "ESCALATED");
    assert_eq!(body["risk_score"], 0.6);
    assert!(body["expires_at"].as_str().is_some());
    assert!(body["hard_deadline"].as_str().is_some());
    let intent_id = body["intent_event_id"].as_str().unwrap().to_string();
    let policy_id = body["policy_event_id"].as_str().unwrap().to_string();

    // Human approves with a valid bearer token.
    let (status, approval) = http_post(
        server.port,
        "/approve",
        &json!({"intent_event_id": intent_id, "policy_event_id": policy_id}),
        Some(OPERATOR_TOKEN),
    );
    assert_eq!(status, 200, "{}", approval);
    assert_eq!(approval["status"], "HUMAN_APPROVAL_GRANTED");
    assert!(approval["approval_event_id"].as_str().is_some());

    // An identical re-proposal consumes the approval.
    let (status, consumed) = propose(server.port, "agent:coder", "bash", content);
    assert_eq!(status, 200);
    assert_eq!(consumed["decision"], "APPROVED");
    assert!(consumed["approval_consumed_event_id"].as_str().is_some());
    // Risk and violations survive for audit.
    assert_eq!(consumed["risk_score"], 0.6);
    assert!(!consumed["violations"].as_array().unwrap().is_empty());

    // Consumption is one-shot: a third identical proposal escalates again.
    let (status, third) = propose(server.port, "agent:coder", "bash", content);
    assert_eq!(status, 202);
    assert_eq!(third["decision"], "ESCALATED");
    assert!(third["approval_consumed_event_id"].is_null());
}

#[test]
fn approve_rejects_bad_auth_and_bad_targets() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);

    let (status, body) = propose(server.port, "agent:coder", "bash", "curl https://a.example");
    assert_eq!(status, 202);
    let intent_id = body["intent_event_id"].as_str().unwrap().to_string();
    let policy_id = body["policy_event_id"].as_str().unwrap().to_string();

    // No token.
    let (status, _) = http_post(
        server.port,
        "/approve",
        &json!({"intent_event_id": intent_id, "policy_event_id": policy_id}),
        None,
    );
    assert_eq!(status, 401);

    // Wrong token.
    let (status, _) = http_post(
        server.port,
        "/approve",
        &json!({"intent_event_id": intent_id, "policy_event_id": policy_id}),
        Some("gvl_wrong_token"),
    );
    assert_eq!(status, 401);

    // Unknown events.
    let (status, _) = http_post(
        server.port,
        "/approve",
        &json!({"intent_event_id": "no-such-event", "policy_event_id": policy_id}),
        Some(OPERATOR_TOKEN),
    );
    assert_eq!(status, 404);

    // A non-ESCALATED target is unprocessable.
    let (status, approved) = propose(server.port, "agent:coder", "bash", "echo fine");
    assert_eq!(status, 200);
    let (status, _) = http_post(
        server.port,
        "/approve",
        &json!({
            "intent_event_id": approved["intent_event_id"],
            "policy_event_id": approved["policy_event_id"],
        }),
        Some(OPERATOR_TOKEN),
    );
    assert_eq!(status, 422);
}

#[test]
fn human_denial_blocks_execution() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);

    let (_, body) = propose(server.port, "agent:coder", "bash", "curl https://b.example");
    let intent_id = body["intent_event_id"].as_str().unwrap().to_string();
    let policy_id = body["policy_event_id"].as_str().unwrap().to_string();

    let (status, denial) = http_post(
        server.port,
        "/deny",
        &json!({
            "intent_event_id": intent_id,
            "policy_event_id": policy_id,
            "reason": "not needed",
        }),
        Some(OPERATOR_TOKEN),
    );
    assert_eq!(status, 200);
    assert_eq!(denial["status"], "HUMAN_DENIAL");
    assert_eq!(denial["reason"], "not needed");

    let (status, body) = http_post(
        server.port,
        "/execute",
        &json!({"proposal_id": intent_id}),
        None,
    );
    assert_eq!(status, 403);
    assert!(body["error"].as_str().unwrap().contains("denied"));
}

#[test]
fn tier_zero_actor_cannot_execute() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);

    let (status, body) = propose(server.port, "agent:reviewer", "bash", "echo tier0-attempt");
    assert_eq!(status, 200);
    assert_eq!(body["actor_tier"], 0);
    let intent_id = body["intent_event_id"].as_str().unwrap().to_string();

    let (status, body) = http_post(
        server.port,
        "/execute",
        &json!({"proposal_id": intent_id}),
        None,
    );
    assert_eq!(status, 403);
    assert!(body["error"].as_str().unwrap().contains("Tier 0"));
}

#[test]
fn unresolved_escalation_blocks_execution_with_202() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);

    let (_, body) = propose(server.port, "agent:coder", "bash", "curl https://c.example");
    let intent_id = body["intent_event_id"].as_str().unwrap().to_string();

    let (status, body) = http_post(
        server.port,
        "/execute",
        &json!({"proposal_id": intent_id}),
        None,
    );
    assert_eq!(status, 202);
    assert!(body["message"].as_str().unwrap().contains("awaiting"));
}

#[test]
fn execute_unknown_proposal_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);
    let (status, _) = http_post(
        server.port,
        "/execute",
        &json!({"proposal_id": "no-such-proposal"}),
        None,
    );
    assert_eq!(status, 404);
}

#[test]
fn role_lock_binds_the_first_role_per_chain() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);

    let (status, _) = http_post(
        server.port,
        "/propose",
        &json!({
            "actor_id": "agent:coder",
            "role": "developer",
            "action": {"action_type": "bash", "content": "echo one"},
            "chain_id": "chain-lock-test",
        }),
        None,
    );
    assert_eq!(status, 200);

    // Same chain, same role: fine.
    let (status, _) = http_post(
        server.port,
        "/propose",
        &json!({
            "actor_id": "agent:coder",
            "role": "developer",
            "action": {"action_type": "bash", "content": "echo two"},
            "chain_id": "chain-lock-test",
        }),
        None,
    );
    assert_eq!(status, 200);

    // Same chain, different role: conflict.
    let (status, body) = http_post(
        server.port,
        "/propose",
        &json!({
            "actor_id": "agent:coder",
            "role": "auditor",
            "action": {"action_type": "bash", "content": "echo three"},
            "chain_id": "chain-lock-test",
        }),
        None,
    );
    assert_eq!(status, 409);
    assert!(body["error"].as_str().unwrap().contains("role-lock"));
}

#[test]
fn escalations_summary_counts_derived_states() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path(), &[]);

    propose(server.port, "agent:coder", "bash", "curl https://one.example");
    propose(server.port, "agent:coder", "bash", "curl https://two.example");

    let (status, body) = http_get(server.port, "/escalations");
    assert_eq!(status, 200);
    assert_eq!(body["summary"]["pending"], 2);
    assert_eq!(body["summary"]["resolved"], 0);
    assert_eq!(body["initial_timeout_seconds"], 300);
    assert_eq!(body["max_timeout_seconds"], 3600);
}

#[test]
fn sweeper_auto_denies_expired_escalations() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(
        dir.path(),
        &[
            ("ESCALATION_INITIAL_TIMEOUT_SECONDS", "0"),
            ("ESCALATION_MAX_TIMEOUT_SECONDS", "0"),
            ("GAVEL_SWEEP_INTERVAL_SECONDS", "1"),
        ],
    );

    let (status, body) = propose(server.port, "agent:coder", "bash", "curl https://d.example");
    assert_eq!(status, 202);
    let intent_id = body["intent_event_id"].as_str().unwrap().to_string();

    // Give the sweeper a couple of ticks to land the durable denial.
    std::thread::sleep(Duration::from_millis(2500));

    let (status, body) = http_post(
        server.port,
        "/execute",
        &json!({"proposal_id": intent_id}),
        None,
    );
    assert_eq!(status, 410, "{}", body);

    let (_, summary) = http_get(server.port, "/escalations");
    assert_eq!(summary["summary"]["resolved"], 1);

    let ledger = std::fs::read_to_string(&server.ledger_path).unwrap();
    assert!(ledger.contains("AUTO_DENIED_TIMEOUT"));
}

#[test]
fn ledger_survives_restart_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let port;
    let ledger_path;
    {
        let server = start_server(dir.path(), &[]);
        port = server.port;
        ledger_path = server.ledger_path.clone();
        propose(port, "agent:coder", "bash", "echo persist me");
        propose(port, "agent:coder", "file_edit", "CONSTITUTION.md");
    }

    // Re-verify the chain out of process.
    let output = Command::new(env!("CARGO_BIN_EXE_gavel"))
        .arg("verify-chain")
        .arg(&ledger_path)
        .arg("--quiet")
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("VALID"));
}
