//! The public connection type and its open/closed lifecycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{Settings, SettingsError};
use crate::worker::engine::{Engine, SqliteEngine};
use crate::worker::events::{Event, EventHub, EventKind, ListenerId};
use crate::worker::protocol::{
    codes, CommandKind, ExecuteParams, Notification, OpenParams, Row,
};
use crate::worker::{IsolatedUnit, WorkerClient, WorkerError, WorkerResult};

/// Default timeout for calls (10 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Lifecycle state of a [`SqliteWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

/// Options a [`SqliteWorker`] is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Deadline for every call, `None` to wait for the reply indefinitely.
    pub timeout: Option<Duration>,

    /// Name of the executor thread.
    pub thread_name: String,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            thread_name: "sqlworker-executor".to_string(),
        }
    }
}

/// A SQLite connection living on its own executor thread.
///
/// Every method is a round trip to the executor. The executor thread is
/// started by the first `open()` and torn down by `close()`; opening again
/// starts a new one.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
/// use sqlworker::SqliteWorker;
///
/// let db = SqliteWorker::new("app.db");
/// db.open().await?;
/// db.execute("CREATE TABLE t (a TEXT, b INTEGER)", &[]).await?;
/// db.execute("INSERT INTO t VALUES (?, ?)", &[json!("x"), json!(1)]).await?;
/// let rows = db.execute("SELECT * FROM t", &[]).await?;
/// db.close().await?;
/// ```
pub struct SqliteWorker {
    file: String,
    options: WorkerOptions,
    engine: Arc<dyn Engine>,

    /// Set by the executor's `Opened` notification, cleared by `close()`.
    open: Arc<AtomicBool>,
    events: Arc<EventHub>,

    /// The correlation engine of the current executor thread, if any.
    client: RwLock<Option<Arc<WorkerClient>>>,

    /// Serializes `open()` and `close()`.
    lifecycle: Mutex<()>,
}

impl SqliteWorker {
    /// Create a closed connection to `file` with default options.
    pub fn new(file: impl Into<String>) -> Self {
        Self::with_options(file, WorkerOptions::default())
    }

    /// Create a closed connection to `file`.
    pub fn with_options(file: impl Into<String>, options: WorkerOptions) -> Self {
        Self::with_engine(file, options, Arc::new(SqliteEngine))
    }

    /// Create a closed connection whose executor uses `engine`.
    pub fn with_engine(
        file: impl Into<String>,
        options: WorkerOptions,
        engine: Arc<dyn Engine>,
    ) -> Self {
        Self {
            file: file.into(),
            options,
            engine,
            open: Arc::new(AtomicBool::new(false)),
            events: Arc::new(EventHub::new()),
            client: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Create a closed connection from configuration.
    ///
    /// Uses an in-memory database when no file is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let file = settings
            .worker
            .resolved_file()?
            .unwrap_or_else(|| ":memory:".to_string());
        Ok(Self::with_options(file, settings.worker.options()?))
    }

    /// The database file this connection targets.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The options this connection was created with.
    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn state(&self) -> ConnectionState {
        if self.open.load(Ordering::SeqCst) {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Register a listener for `opened`, `closed` or `error` events.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Remove a listener registered with [`SqliteWorker::on`].
    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Number of calls awaiting a reply.
    pub async fn pending_calls(&self) -> usize {
        match self.current_client() {
            Some(client) => client.pending_count().await,
            None => 0,
        }
    }

    /// Open the database.
    ///
    /// Starts the executor thread if there is none. The `opened` event fires
    /// as soon as the executor reports the handle open, before this call
    /// returns.
    ///
    /// # Errors
    ///
    /// [`WorkerError::AlreadyOpen`] if the connection is open, otherwise any
    /// failure reported by the executor while opening the file.
    pub async fn open(&self) -> WorkerResult<&Self> {
        let _guard = self.lifecycle.lock().await;
        if self.is_open() {
            return Err(WorkerError::AlreadyOpen);
        }

        let client = self.ensure_client()?;
        let payload = serde_json::to_value(OpenParams {
            file: self.file.clone(),
        })
        .map_err(WorkerError::SerializeFailed)?;
        match client
            .send(CommandKind::Open, payload, self.options.timeout)
            .await
        {
            Ok(_) => {}
            Err(e @ WorkerError::Timeout { .. }) => {
                // A late `Opened` must not flip the state behind the caller.
                self.teardown(&client);
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        debug!(file = %self.file, "database opened");
        Ok(self)
    }

    /// Close the database and tear the executor thread down.
    ///
    /// Calls still waiting for a reply once the executor has closed the
    /// handle fail with [`WorkerError::Closed`]. The connection ends up
    /// closed even when the `CLOSE` command times out: the command stays
    /// queued and the executor releases the handle before it exits.
    ///
    /// # Errors
    ///
    /// [`WorkerError::NotOpen`] if the connection is not open. An engine
    /// failure while closing the handle is returned after the teardown.
    pub async fn close(&self) -> WorkerResult<&Self> {
        let _guard = self.lifecycle.lock().await;
        let client = self.live_client()?;

        let outcome = match client
            .send(CommandKind::Close, Value::Null, self.options.timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(WorkerError::Timeout { .. }) => {
                warn!(file = %self.file, "close timed out, tearing the executor down");
                Ok(())
            }
            // The handle is already gone.
            Err(WorkerError::Remote { code, .. }) if code == codes::NOT_OPENED => Ok(()),
            Err(e) => Err(e),
        };

        let cancelled = client.fail_all(|| WorkerError::Closed).await;
        if cancelled > 0 {
            debug!(cancelled, "failed pending calls on close");
        }

        self.teardown(&client);
        self.events.emit(&Event::Closed);
        debug!(file = %self.file, "database closed");
        outcome.map(|()| self)
    }

    /// Run a statement and collect every result row.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> WorkerResult<Vec<Row>> {
        self.execute_with_timeout(sql, params, self.options.timeout)
            .await
    }

    /// Run a statement with an explicit deadline (`None` waits indefinitely).
    pub async fn execute_with_timeout(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> WorkerResult<Vec<Row>> {
        let payload = serde_json::to_value(ExecuteParams {
            sql: sql.to_string(),
            params: params.to_vec(),
        })
        .map_err(WorkerError::SerializeFailed)?;

        let rows = self.call(CommandKind::Execute, payload, timeout).await?;
        serde_json::from_value(rows).map_err(WorkerError::DeserializeFailed)
    }

    /// Run a query and deserialize each row into `T`.
    pub async fn query<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> WorkerResult<Vec<T>> {
        let rows = self.execute(sql, params).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)))
            .collect::<Result<_, _>>()
            .map_err(WorkerError::DeserializeFailed)
    }

    /// Rows modified by the most recent statement.
    pub async fn changes(&self) -> WorkerResult<i64> {
        self.counter(CommandKind::GetChanges).await
    }

    /// Rows modified since the database was opened.
    pub async fn total_changes(&self) -> WorkerResult<i64> {
        self.counter(CommandKind::GetTotalChanges).await
    }

    /// Rowid of the most recent successful insert.
    pub async fn last_insert_id(&self) -> WorkerResult<i64> {
        self.counter(CommandKind::GetLastInsertId).await
    }

    async fn counter(&self, kind: CommandKind) -> WorkerResult<i64> {
        let value = self.call(kind, Value::Null, self.options.timeout).await?;
        serde_json::from_value(value).map_err(WorkerError::DeserializeFailed)
    }

    async fn call(
        &self,
        kind: CommandKind,
        payload: Value,
        timeout: Option<Duration>,
    ) -> WorkerResult<Value> {
        let client = self.live_client()?;
        client.send(kind, payload, timeout).await
    }

    /// Drop the current executor and mark the connection closed.
    fn teardown(&self, client: &WorkerClient) {
        client.shutdown();
        if let Ok(mut slot) = self.client.write() {
            slot.take();
        }
        self.open.store(false, Ordering::SeqCst);
    }

    fn current_client(&self) -> Option<Arc<WorkerClient>> {
        self.client.read().ok().and_then(|slot| slot.clone())
    }

    /// The client to use for a call, if the connection is open.
    fn live_client(&self) -> WorkerResult<Arc<WorkerClient>> {
        if !self.is_open() {
            return Err(WorkerError::NotOpen);
        }
        self.current_client().ok_or(WorkerError::NotOpen)
    }

    /// Reuse the running executor or start a new one.
    fn ensure_client(&self) -> WorkerResult<Arc<WorkerClient>> {
        let mut slot = self.client.write().map_err(|_| WorkerError::ChannelClosed)?;
        if let Some(client) = slot.as_ref().filter(|c| c.is_alive()) {
            return Ok(client.clone());
        }

        let (unit, outbox) = IsolatedUnit::spawn(self.engine.clone(), &self.options.thread_name)?;

        let open = self.open.clone();
        let events = self.events.clone();
        let on_notification = move |notification: Notification| match notification {
            Notification::Opened { file } => {
                debug!(file = %file, "executor reported database open");
                open.store(true, Ordering::SeqCst);
                events.emit(&Event::Opened);
            }
            Notification::Error { message } => {
                warn!(%message, "executor reported an error");
                events.emit(&Event::Error(message));
            }
        };

        let open = self.open.clone();
        let on_exit = move || {
            warn!("executor thread exited");
            open.store(false, Ordering::SeqCst);
        };

        let client = Arc::new(WorkerClient::start(unit, outbox, on_notification, on_exit));
        *slot = Some(client.clone());
        Ok(client)
    }
}

impl fmt::Debug for SqliteWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteWorker")
            .field("file", &self.file)
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.client.write() {
            if let Some(client) = slot.take() {
                client.shutdown();
            }
        }
    }
}
