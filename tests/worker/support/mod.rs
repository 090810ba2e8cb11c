//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use sqlworker::worker::engine::EngineResult;
use sqlworker::worker::{DatabaseHandle, Engine, SqliteEngine};
use sqlworker::{Row, SqliteWorker, WorkerOptions};

/// Statements starting with this marker make the executor sleep first.
pub const SLOW: &str = "/* slow */ ";

/// SQLite engine that stalls on statements marked [`SLOW`].
pub struct SlowEngine {
    pub delay: Duration,

    /// Extra time spent opening the file.
    pub open_delay: Duration,
}

impl Engine for SlowEngine {
    fn open(&self, file: &str) -> EngineResult<Box<dyn DatabaseHandle>> {
        thread::sleep(self.open_delay);
        Ok(Box::new(SlowHandle {
            inner: SqliteEngine.open(file)?,
            delay: self.delay,
        }))
    }
}

struct SlowHandle {
    inner: Box<dyn DatabaseHandle>,
    delay: Duration,
}

impl DatabaseHandle for SlowHandle {
    fn execute(&mut self, sql: &str, params: &[Value]) -> EngineResult<Vec<Row>> {
        if sql.starts_with(SLOW) {
            thread::sleep(self.delay);
        }
        self.inner.execute(sql, params)
    }

    fn changes(&self) -> EngineResult<i64> {
        self.inner.changes()
    }

    fn total_changes(&self) -> EngineResult<i64> {
        self.inner.total_changes()
    }

    fn last_insert_rowid(&self) -> EngineResult<i64> {
        self.inner.last_insert_rowid()
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.inner.close()
    }
}

/// An open in-memory connection whose `SLOW` statements take `delay`.
pub async fn open_slow(delay: Duration, options: WorkerOptions) -> SqliteWorker {
    let db = SqliteWorker::with_engine(
        ":memory:",
        options,
        Arc::new(SlowEngine {
            delay,
            open_delay: Duration::ZERO,
        }),
    );
    db.open().await.expect("open failed");
    db
}

/// An open in-memory connection with default options.
pub async fn open_memory() -> SqliteWorker {
    let db = SqliteWorker::new(":memory:");
    db.open().await.expect("open failed");
    db
}
