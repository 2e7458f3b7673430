//! Container execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::BlastBoxConfig;
use crate::error::SandboxError;
use crate::snapshot::{diff_snapshots, snapshot_workspace, WorkspaceDiff, WorkspaceSnapshot};

/// 64 KiB cap per output stream.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Deadline for runtime housekeeping commands (probe, kill, inspect, rm).
const RUNTIME_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Container names are `blastbox-<pid>-<counter>`; the counter makes
/// concurrent runs in one process collision-free.
static CONTAINER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Outcome of a single sandbox execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastBoxResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub workspace_diff: WorkspaceDiff,
    pub timed_out: bool,
    pub oom_killed: bool,
}

/// Whether the Docker daemon answers within the housekeeping deadline.
pub async fn is_available() -> bool {
    let mut cmd = Command::new("docker");
    cmd.arg("info")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    matches!(
        tokio::time::timeout(RUNTIME_COMMAND_TIMEOUT, cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

/// Execute `command` inside a disposable container.
///
/// When `workspace_dir` is `None` a temporary directory is created and
/// removed afterwards; otherwise the caller's directory is bind-mounted at
/// `/workspace`. The container gets no network by default, a read-only
/// root filesystem with a writable `/tmp` tmpfs, and the configured
/// memory/CPU caps. The container is removed on every exit path.
pub async fn run(
    command: &str,
    workspace_dir: Option<&Path>,
    config: &BlastBoxConfig,
) -> Result<BlastBoxResult, SandboxError> {
    let (_workspace_guard, workspace) = match workspace_dir {
        Some(dir) => (None, dir.to_path_buf()),
        None => {
            let temp = tempfile::Builder::new()
                .prefix("blastbox_")
                .tempdir()
                .map_err(|source| SandboxError::Workspace { source })?;
            let path = temp.path().to_path_buf();
            (Some(temp), path)
        }
    };

    let before = snapshot_blocking(workspace.clone()).await;

    let container_name = format!(
        "blastbox-{}-{}",
        std::process::id(),
        CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    let mount = format!("{}:/workspace", absolute(&workspace).display());

    let mut cmd = Command::new("docker");
    cmd.args(["run", "--name", &container_name])
        .args(["--network", &config.network_mode])
        .args(["--memory", &config.memory_limit])
        .args(["--cpus", &config.cpu_limit.to_string()])
        .arg("--read-only")
        .args(["--tmpfs", "/tmp"])
        .args(["-v", &mount])
        .args(["-w", "/workspace"])
        .arg(&config.image)
        .args(["sh", "-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let child = cmd.spawn().map_err(|source| SandboxError::Spawn { source })?;

    let mut timed_out = false;
    let (exit_code, stdout_raw, stderr_raw) = match tokio::time::timeout(
        Duration::from_secs(config.timeout_seconds),
        child.wait_with_output(),
    )
    .await
    {
        Ok(Ok(output)) => (
            output.status.code().unwrap_or(-1),
            output.stdout,
            output.stderr,
        ),
        Ok(Err(source)) => {
            remove_container(&container_name).await;
            return Err(SandboxError::Wait { source });
        }
        Err(_elapsed) => {
            timed_out = true;
            runtime_command(&["kill", &container_name]).await;
            (-1, Vec::new(), Vec::new())
        }
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    let mut oom_killed = false;
    if exit_code == 137 {
        oom_killed = inspect_oom(&container_name).await;
    }

    remove_container(&container_name).await;

    let after = snapshot_blocking(workspace.clone()).await;
    let workspace_diff = diff_snapshots(&before, &after);

    Ok(BlastBoxResult {
        exit_code,
        stdout: truncate_lossy(stdout_raw),
        stderr: truncate_lossy(stderr_raw),
        duration_ms,
        workspace_diff,
        timed_out,
        oom_killed,
    })
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

async fn snapshot_blocking(workspace: PathBuf) -> WorkspaceSnapshot {
    tokio::task::spawn_blocking(move || snapshot_workspace(&workspace))
        .await
        .unwrap_or_default()
}

fn truncate_lossy(mut raw: Vec<u8>) -> String {
    raw.truncate(MAX_OUTPUT_BYTES);
    String::from_utf8_lossy(&raw).into_owned()
}

/// Fire a docker housekeeping command, tolerating every failure mode.
async fn runtime_command(args: &[&str]) -> Option<std::process::Output> {
    let mut cmd = Command::new("docker");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    let child = cmd.spawn().ok()?;
    tokio::time::timeout(RUNTIME_COMMAND_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()
}

async fn inspect_oom(container_name: &str) -> bool {
    runtime_command(&[
        "inspect",
        "--format",
        "{{.State.OOMKilled}}",
        container_name,
    ])
    .await
    .map(|output| {
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .eq_ignore_ascii_case("true")
    })
    .unwrap_or(false)
}

async fn remove_container(container_name: &str) {
    runtime_command(&["rm", "-f", container_name]).await;
}
