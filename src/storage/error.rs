/// Failures visible to callers of the coordinator.
///
/// Per-node RPC errors are never returned as-is; they are folded into one of
/// these outcomes.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no storage nodes available")]
    NoNodesAvailable,

    #[error(
        "write quorum failed ({acknowledged}/{required} acknowledged, {attempted} attempted): {last_error}"
    )]
    QuorumFailed {
        acknowledged: usize,
        required: usize,
        attempted: usize,
        last_error: String,
    },

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("failed to delete from any node ({attempted} attempted): {last_error}")]
    DeleteFailed { attempted: usize, last_error: String },

    #[error("failed to read payload: {0}")]
    Payload(#[source] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
