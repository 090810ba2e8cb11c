//! Correlation engine: turns one-way posts to the executor into awaitable calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{WorkerError, WorkerResult};
use super::protocol::{CommandEnvelope, CommandKind, Notification, WorkerMessage};
use super::unit::IsolatedUnit;

/// An outstanding call awaiting its reply.
struct PendingCall {
    kind: CommandKind,
    tx: oneshot::Sender<WorkerResult<Value>>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingCall>>>;

/// Async client for an executor running in an [`IsolatedUnit`].
///
/// Every call gets a fresh UUID token. The pending table maps tokens to the
/// waiting callers; a background task reads the executor's messages, resolves
/// replies by token and hands token-less notifications to a callback.
pub struct WorkerClient {
    /// The executor thread we post commands to.
    unit: IsolatedUnit,

    /// Map of pending tokens to response channels.
    pending: PendingTable,

    /// Handle to the background routing task.
    router: JoinHandle<()>,
}

impl WorkerClient {
    /// Start routing messages from `outbox`.
    ///
    /// `on_notification` sees every unsolicited message in arrival order.
    /// `on_exit` runs if the executor goes away on its own; every call still
    /// pending at that point fails with [`WorkerError::ChannelClosed`].
    pub fn start<N, X>(
        unit: IsolatedUnit,
        outbox: UnboundedReceiver<WorkerMessage>,
        on_notification: N,
        on_exit: X,
    ) -> Self
    where
        N: Fn(Notification) + Send + Sync + 'static,
        X: FnOnce() + Send + 'static,
    {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let router = Self::spawn_router(outbox, pending.clone(), on_notification, on_exit);

        Self {
            unit,
            pending,
            router,
        }
    }

    fn spawn_router<N, X>(
        mut outbox: UnboundedReceiver<WorkerMessage>,
        pending: PendingTable,
        on_notification: N,
        on_exit: X,
    ) -> JoinHandle<()>
    where
        N: Fn(Notification) + Send + Sync + 'static,
        X: FnOnce() + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(msg) = outbox.recv().await {
                match msg {
                    WorkerMessage::Reply(reply) => {
                        let call = pending.lock().await.remove(&reply.token);
                        match call {
                            Some(call) => {
                                let outcome = reply.into_result().map_err(WorkerError::from_info);
                                // The caller may have stopped waiting.
                                let _ = call.tx.send(outcome);
                            }
                            None => {
                                debug!(token = %reply.token, "dropping orphaned reply");
                            }
                        }
                    }
                    WorkerMessage::Notification(notification) => on_notification(notification),
                }
            }

            // Executor exited - fail everything still waiting
            let mut pending = pending.lock().await;
            if !pending.is_empty() {
                warn!(pending = pending.len(), "executor exited with calls in flight");
            }
            for (_, call) in pending.drain() {
                let _ = call.tx.send(Err(WorkerError::ChannelClosed));
            }
            drop(pending);
            on_exit();
        })
    }

    /// Send a command and wait for its reply.
    ///
    /// With `timeout = None` the call waits until the reply arrives. When the
    /// deadline passes first the call fails with [`WorkerError::Timeout`]; the
    /// executor is not told and a reply arriving later is dropped.
    pub async fn send(
        &self,
        kind: CommandKind,
        payload: Value,
        timeout: Option<Duration>,
    ) -> WorkerResult<Value> {
        let token = Uuid::new_v4().to_string();

        // Register response channel
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(token.clone(), PendingCall { kind, tx });

        if let Err(e) = self
            .unit
            .post(CommandEnvelope::new(kind, payload, token.clone()))
        {
            self.pending.lock().await.remove(&token);
            return Err(e);
        }

        let Some(limit) = timeout else {
            return rx.await?;
        };

        match tokio::time::timeout(limit, rx).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                // Timeout - forget the token so a late reply is dropped
                self.pending.lock().await.remove(&token);
                warn!(%kind, token = %token, timeout_ms = limit.as_millis() as u64, "call timed out");
                Err(WorkerError::Timeout { kind })
            }
        }
    }

    /// Fail every pending call with the error produced by `err`.
    ///
    /// Returns the number of calls failed.
    pub async fn fail_all(&self, err: impl Fn() -> WorkerError) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        for (token, call) in pending.drain() {
            debug!(token = %token, kind = %call.kind, "cancelling pending call");
            let _ = call.tx.send(Err(err()));
        }
        count
    }

    /// Number of calls awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Check if the executor thread is still running.
    pub fn is_alive(&self) -> bool {
        self.unit.is_alive() && !self.router.is_finished()
    }

    #[cfg(test)]
    pub(crate) fn unit(&self) -> &IsolatedUnit {
        &self.unit
    }

    /// Stop routing and terminate the executor thread.
    pub fn shutdown(&self) {
        self.router.abort();
        self.unit.terminate();
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
