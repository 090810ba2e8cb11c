//! Worker-specific error types.

use std::io;
use thiserror::Error;

use super::protocol::{codes, CommandKind, ErrorInfo};

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors that can occur while talking to the executor.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// `open()` called on a connection that is already open.
    #[error("connection is already open")]
    AlreadyOpen,

    /// A command was issued while the connection is not open.
    #[error("connection is not open")]
    NotOpen,

    /// No reply arrived before the call's deadline.
    #[error("timed out waiting for a reply to {kind}")]
    Timeout {
        /// The command that timed out.
        kind: CommandKind,
    },

    /// The executor reported a failure while handling the command.
    #[error("executor error: {message} (code: {code})")]
    Remote {
        /// Error code from the executor.
        code: String,
        /// Error message from the executor (usually the engine's message).
        message: String,
    },

    /// The executor could not make sense of a command.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The call was cancelled because the connection was closed underneath it.
    #[error("connection closed before a reply arrived")]
    Closed,

    /// Failed to start the executor thread.
    #[error("failed to spawn executor thread: {0}")]
    SpawnFailed(#[source] io::Error),

    /// The executor thread is gone (internal error).
    #[error("executor channel closed unexpectedly")]
    ChannelClosed,

    /// Failed to encode a command payload.
    #[error("failed to serialize payload: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to decode a reply payload.
    #[error("failed to deserialize reply: {0}")]
    DeserializeFailed(#[source] serde_json::Error),
}

impl WorkerError {
    /// Create a remote error.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Classify an error payload reported by the executor.
    pub fn from_info(info: ErrorInfo) -> Self {
        match info.code.as_str() {
            codes::UNKNOWN_COMMAND | codes::INVALID_PAYLOAD => Self::MalformedMessage(info.message),
            _ => Self::remote(info.code, info.message),
        }
    }

    /// Check if this error is a call deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error was reported by the executor.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::MalformedMessage(_))
    }

    /// Check if this error indicates the executor has exited.
    pub fn is_worker_exited(&self) -> bool {
        matches!(self, Self::ChannelClosed)
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for WorkerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}
