//! Structured error types for the node engine.

use thiserror::Error;

/// Errors raised by the write path.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeError {
    /// A spawned child or adapter write task could not be joined.
    #[error("write task for '{path}' failed: {reason}")]
    WriteTaskFailed { path: String, reason: String },
}

impl NodeError {
    /// Check if this error is related to task execution.
    pub fn is_task_error(&self) -> bool {
        matches!(self, NodeError::WriteTaskFailed { .. })
    }
}

impl From<NodeError> for crate::Error {
    fn from(err: NodeError) -> Self {
        crate::Error::Node(err)
    }
}
