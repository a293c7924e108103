/// Errors reported by a protocol node client.
///
/// String payloads carry the node's own message. They are human-readable
/// diagnostics, callers should not match on their content.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Protocol node unreachable: {0}")]
    Unreachable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Group is not active on this device: {0}")]
    GroupNotActive(String),
    #[error("Request rejected by node: {0}")]
    Rejected(String),
    #[error("Stream closed by node")]
    Closed,
}

impl NodeError {
    /// True when the client that produced this error should be discarded.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, NodeError::Unreachable(_) | NodeError::Closed)
    }
}
