//! Worker-specific error types.

use std::io;
use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur during worker communication.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),

    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("failed to read from worker: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    #[error("failed to deserialize response: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// No response within the client timeout, or the worker reported a
    /// statement timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("worker process exited unexpectedly")]
    WorkerExited,

    /// Response channel was closed (internal error).
    #[error("response channel closed unexpectedly")]
    ChannelClosed,

    #[error("worker error: {message} (code: {code})")]
    Remote { code: String, message: String },

    #[error("database driver not found: {0}")]
    DriverNotFound(String),

    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),
}

impl WorkerError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if this error indicates the worker has exited.
    pub fn is_worker_exited(&self) -> bool {
        matches!(self, Self::WorkerExited | Self::ChannelClosed)
    }

    /// Whether the worker or its database could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed(_)
                | Self::WriteFailed(_)
                | Self::ReadFailed(_)
                | Self::WorkerExited
                | Self::ChannelClosed
                | Self::ConnectionFailed(_)
                | Self::DriverNotFound(_)
        )
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for WorkerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}
