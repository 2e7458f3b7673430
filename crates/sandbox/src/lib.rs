//! The blast box: disposable Docker containers for agent-proposed commands.
//!
//! Every run snapshots the bind-mounted workspace before and after
//! execution, so callers get a deterministic diff of side effects along
//! with exit status, captured output, and timeout/OOM flags.

mod config;
mod error;
mod runner;
mod snapshot;

pub use config::BlastBoxConfig;
pub use error::SandboxError;
pub use runner::{is_available, run, BlastBoxResult};
pub use snapshot::{diff_snapshots, snapshot_workspace, WorkspaceDiff, WorkspaceSnapshot};
