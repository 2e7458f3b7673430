/// Failures the sandbox surfaces to its caller.
///
/// Snapshot read errors are not here: an unreadable file is skipped and
/// execution continues.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create sandbox workspace: {source}")]
    Workspace {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch container runtime: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for container: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}
