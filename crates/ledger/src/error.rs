/// All errors a `LedgerStore` implementation can return.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Two writers raced for the same chain tail. The append did not
    /// happen; callers retry through [`crate::append_with_retry`].
    #[error("ledger tail conflict: another writer advanced past {observed_tail}")]
    TailConflict { observed_tail: String },

    /// Conditional consumption append refused: the approval was already
    /// spent by an earlier `APPROVAL_CONSUMED` event.
    #[error("approval {approval_event_id} has already been consumed")]
    AlreadyConsumed { approval_event_id: String },

    /// A stored line failed to parse while loading a file-backed ledger.
    #[error("corrupt ledger file {path} at line {line}: {reason}")]
    Corrupt {
        path: String,
        line: usize,
        reason: String,
    },

    /// Reading or writing the backing file failed.
    #[error("ledger I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A backend-specific failure (connection, serialization, etc.).
    #[error("ledger backend error: {0}")]
    Backend(String),
}
