//! The isolated unit hosting an [`Executor`].
//!
//! A unit is a dedicated OS thread plus two channels: commands go in, worker
//! messages come out. Nothing else is shared with the thread.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::engine::Engine;
use super::error::{WorkerError, WorkerResult};
use super::executor::Executor;
use super::protocol::{CommandEnvelope, WorkerMessage};

/// Handle to a running executor thread.
pub struct IsolatedUnit {
    /// Sender for commands. Taking it out stops the executor loop.
    inbox: Mutex<Option<UnboundedSender<CommandEnvelope>>>,

    /// The executor thread. Never joined: it may be stuck in a long statement.
    thread: JoinHandle<()>,
}

impl IsolatedUnit {
    /// Start an executor thread for `engine`.
    ///
    /// Returns the unit together with the receiver for everything the executor
    /// emits.
    pub fn spawn(
        engine: Arc<dyn Engine>,
        thread_name: &str,
    ) -> WorkerResult<(Self, UnboundedReceiver<WorkerMessage>)> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let executor = Executor::new(engine);
        let thread = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || executor.run(cmd_rx, msg_tx))
            .map_err(WorkerError::SpawnFailed)?;

        debug!(thread = thread_name, "spawned executor thread");
        Ok((
            Self {
                inbox: Mutex::new(Some(cmd_tx)),
                thread,
            },
            msg_rx,
        ))
    }

    /// Send a command across the boundary.
    pub fn post(&self, cmd: CommandEnvelope) -> WorkerResult<()> {
        let inbox = self.inbox.lock().map_err(|_| WorkerError::ChannelClosed)?;
        inbox
            .as_ref()
            .ok_or(WorkerError::ChannelClosed)?
            .send(cmd)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Check if the executor thread is still running.
    pub fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Tear the unit down.
    ///
    /// The executor stops reading commands; a statement already running
    /// finishes first and its reply goes nowhere.
    /// Commands posted afterwards fail with [`WorkerError::ChannelClosed`].
    pub fn terminate(&self) {
        let Ok(mut inbox) = self.inbox.lock() else {
            return;
        };
        if inbox.take().is_some() {
            debug!(
                thread = self.thread.thread().name().unwrap_or("executor"),
                "terminating executor thread"
            );
        }
    }
}
