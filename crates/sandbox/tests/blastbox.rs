//! Blast box integration tests against a real Docker daemon.
//!
//! Every test probes the runtime first and skips itself when Docker is not
//! reachable, so the suite stays green on hosts without a container
//! runtime.

use std::path::Path;

use gavel_sandbox::{is_available, run, BlastBoxConfig};

async fn docker_or_skip() -> bool {
    if is_available().await {
        return true;
    }
    eprintln!("skipping: docker is not available");
    false
}

fn quick_config() -> BlastBoxConfig {
    BlastBoxConfig {
        timeout_seconds: 60,
        ..BlastBoxConfig::from_env()
    }
}

#[tokio::test]
async fn echo_captures_stdout_and_exits_zero() {
    if !docker_or_skip().await {
        return;
    }
    let result = run("echo hello", None, &quick_config()).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.contains("hello"));
    assert!(!result.timed_out);
    assert!(!result.oom_killed);
}

#[tokio::test]
async fn destructive_command_stays_inside_the_container() {
    if !docker_or_skip().await {
        return;
    }
    // The container has a read-only root; the host is untouched either way.
    let result = run("rm -rf / 2>/dev/null || true", None, &quick_config())
        .await
        .unwrap();
    assert!(!result.timed_out);
    assert!(Path::new("/etc").exists());
}

#[tokio::test]
async fn wall_clock_timeout_kills_the_container() {
    if !docker_or_skip().await {
        return;
    }
    let config = BlastBoxConfig {
        timeout_seconds: 5,
        ..BlastBoxConfig::from_env()
    };
    let result = run("sleep 60", None, &config).await.unwrap();
    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
}

#[tokio::test]
async fn workspace_diff_detects_added_file() {
    if !docker_or_skip().await {
        return;
    }
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(workspace.path().join("existing.txt"), b"before").unwrap();
    let result = run(
        "echo test > /workspace/newfile.txt",
        Some(workspace.path()),
        &quick_config(),
    )
    .await
    .unwrap();
    assert!(result.workspace_diff.added.contains_key("newfile.txt"));
    assert!(result.workspace_diff.unchanged.contains_key("existing.txt"));
    assert!(result.workspace_diff.deleted.is_empty());
}

#[tokio::test]
async fn network_mode_none_blocks_outbound_access() {
    if !docker_or_skip().await {
        return;
    }
    let result = run(
        "wget -q -O- http://example.com 2>&1 || echo BLOCKED",
        None,
        &quick_config(),
    )
    .await
    .unwrap();
    let blocked = result.stdout.contains("BLOCKED")
        || result.exit_code != 0
        || result.stderr.to_lowercase().contains("fail")
        || result.stderr.to_lowercase().contains("bad address");
    assert!(blocked, "stdout={:?} stderr={:?}", result.stdout, result.stderr);
}
