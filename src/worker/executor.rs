//! Executor: the command loop that owns the database handle.
//!
//! Runs on the isolated unit's thread. Commands are handled strictly one at a
//! time, and every command with a token gets exactly one reply. Failures are
//! turned into error replies; the loop itself keeps going.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use super::engine::{DatabaseHandle, Engine};
use super::protocol::{
    codes, CommandEnvelope, CommandKind, ErrorInfo, ExecuteParams, Notification, OpenParams,
    ReplyEnvelope, WorkerMessage,
};

/// Dispatches commands against at most one live database handle.
pub struct Executor {
    engine: Arc<dyn Engine>,
    handle: Option<Box<dyn DatabaseHandle>>,
}

impl Executor {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            handle: None,
        }
    }

    /// Whether a database handle is currently open.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Serve commands until the inbox closes or the controller goes away.
    pub fn run(
        mut self,
        mut inbox: UnboundedReceiver<CommandEnvelope>,
        outbox: UnboundedSender<WorkerMessage>,
    ) {
        while let Some(cmd) = inbox.blocking_recv() {
            let token = cmd.token.clone();
            let mut emit = |msg: WorkerMessage| {
                let _ = outbox.send(msg);
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(cmd, &mut emit)));
            if let Err(payload) = outcome {
                let message = panic_message(payload.as_ref());
                warn!(token = ?token, %message, "executor panicked while handling command");
                emit(match token {
                    Some(token) => WorkerMessage::Reply(ReplyEnvelope::err(
                        token,
                        ErrorInfo::new(codes::ENGINE_ERROR, message),
                    )),
                    None => WorkerMessage::Notification(Notification::Error { message }),
                });
            }

            if outbox.is_closed() {
                debug!("controller went away, stopping executor");
                break;
            }
        }

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.close() {
                warn!(error = %e, "failed to close database handle on shutdown");
            }
        }
    }

    /// Handle one command to completion, emitting its reply (and, for `OPEN`,
    /// the `Opened` notification that precedes it).
    pub fn dispatch(&mut self, cmd: CommandEnvelope, emit: &mut dyn FnMut(WorkerMessage)) {
        let Some(token) = cmd.token else {
            warn!(kind = %cmd.kind, "dropping command without correlation token");
            emit(WorkerMessage::Notification(Notification::Error {
                message: format!("command {} has no correlation token", cmd.kind),
            }));
            return;
        };

        debug!(kind = %cmd.kind, token = %token, "dispatching command");
        let reply = match self.handle_command(&cmd.kind, cmd.payload, emit) {
            Ok(result) => ReplyEnvelope::ok(token, result),
            Err(error) => {
                debug!(kind = %cmd.kind, token = %token, code = %error.code, "command failed");
                ReplyEnvelope::err(token, error)
            }
        };
        emit(WorkerMessage::Reply(reply));
    }

    fn handle_command(
        &mut self,
        kind: &str,
        payload: Value,
        emit: &mut dyn FnMut(WorkerMessage),
    ) -> Result<Value, ErrorInfo> {
        let Some(kind) = CommandKind::from_str(kind) else {
            return Err(ErrorInfo::new(
                codes::UNKNOWN_COMMAND,
                format!("Unknown command: {kind}"),
            ));
        };

        match kind {
            CommandKind::Open => {
                let params: OpenParams = parse_payload(kind, payload)?;
                if let Some(previous) = self.handle.take() {
                    if let Err(e) = previous.close() {
                        debug!(error = %e, "ignoring failure closing previous handle");
                    }
                }
                self.handle = Some(self.engine.open(&params.file).map_err(engine_error)?);
                emit(WorkerMessage::Notification(Notification::Opened {
                    file: params.file,
                }));
                Ok(Value::Bool(true))
            }
            CommandKind::Close => {
                let handle = self.handle.take().ok_or_else(not_opened)?;
                handle.close().map_err(engine_error)?;
                Ok(Value::Null)
            }
            CommandKind::Execute => {
                let params: ExecuteParams = parse_payload(kind, payload)?;
                let rows = self
                    .handle_mut()?
                    .execute(&params.sql, &params.params)
                    .map_err(engine_error)?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            CommandKind::GetChanges => {
                let n = self.handle_mut()?.changes().map_err(engine_error)?;
                Ok(Value::from(n))
            }
            CommandKind::GetTotalChanges => {
                let n = self.handle_mut()?.total_changes().map_err(engine_error)?;
                Ok(Value::from(n))
            }
            CommandKind::GetLastInsertId => {
                let n = self.handle_mut()?.last_insert_rowid().map_err(engine_error)?;
                Ok(Value::from(n))
            }
        }
    }

    fn handle_mut(&mut self) -> Result<&mut Box<dyn DatabaseHandle>, ErrorInfo> {
        self.handle.as_mut().ok_or_else(not_opened)
    }
}

fn parse_payload<T: DeserializeOwned>(kind: CommandKind, payload: Value) -> Result<T, ErrorInfo> {
    serde_json::from_value(payload).map_err(|e| {
        ErrorInfo::new(
            codes::INVALID_PAYLOAD,
            format!("invalid payload for {kind}: {e}"),
        )
    })
}

fn not_opened() -> ErrorInfo {
    ErrorInfo::new(codes::NOT_OPENED, "DB not opened")
}

fn engine_error(err: super::engine::EngineError) -> ErrorInfo {
    ErrorInfo::new(codes::ENGINE_ERROR, err.to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "executor panicked".to_string()
    }
}
