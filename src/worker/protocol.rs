//! Message types that cross the boundary between the controller and the
//! executor thread.
//!
//! Everything here is plain owned data. Commands carry their kind as a string
//! so that a kind the executor does not understand is still representable;
//! the executor reports it back instead of the controller silently losing it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single result row: column name to cell value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Command Kinds
// ============================================================================

/// Commands understood by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Open,
    Close,
    Execute,
    GetChanges,
    GetTotalChanges,
    GetLastInsertId,
}

impl CommandKind {
    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Open => "OPEN",
            CommandKind::Close => "CLOSE",
            CommandKind::Execute => "EXECUTE",
            CommandKind::GetChanges => "GET_CHANGES",
            CommandKind::GetTotalChanges => "GET_TOTAL_CHANGES",
            CommandKind::GetLastInsertId => "GET_LAST_INSERT_ID",
        }
    }

    /// Parse a wire name. Returns `None` for unknown commands.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(CommandKind::Open),
            "CLOSE" => Some(CommandKind::Close),
            "EXECUTE" => Some(CommandKind::Execute),
            "GET_CHANGES" => Some(CommandKind::GetChanges),
            "GET_TOTAL_CHANGES" => Some(CommandKind::GetTotalChanges),
            "GET_LAST_INSERT_ID" => Some(CommandKind::GetLastInsertId),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// Command envelope sent to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command name (e.g., "EXECUTE").
    pub kind: String,
    /// Command-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Correlation token. Always set by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CommandEnvelope {
    pub fn new(kind: CommandKind, payload: serde_json::Value, token: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            payload,
            token: Some(token.into()),
        }
    }
}

/// Reply to exactly one command, tagged with that command's token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Token of the command this reply answers.
    pub token: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information (present if success = false).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ReplyEnvelope {
    pub fn ok(token: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            token: token.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(token: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            token: token.into(),
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Split into the success payload or the reported error.
    pub fn into_result(self) -> Result<serde_json::Value, ErrorInfo> {
        if self.success {
            Ok(self.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| {
                ErrorInfo::new(codes::ENGINE_ERROR, "executor reported an unknown error")
            }))
        }
    }
}

/// Unsolicited message that is not addressed to any pending call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// A database handle was opened. Precedes the OPEN reply.
    Opened { file: String },
    /// A failure that could not be tied to a command token.
    Error { message: String },
}

/// Anything the executor emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMessage {
    Notification(Notification),
    Reply(ReplyEnvelope),
}

/// Error information in a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (see [`codes`]).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error codes reported by the executor.
pub mod codes {
    pub const NOT_OPENED: &str = "NOT_OPENED";
    pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
    pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
    pub const ENGINE_ERROR: &str = "ENGINE_ERROR";
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of `OPEN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenParams {
    /// Database file; `":memory:"` for a private in-memory database.
    pub file: String,
}

/// Payload of `EXECUTE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteParams {
    /// SQL statement to run.
    pub sql: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
}
