//! # sqlworker
//!
//! Async access to a SQLite connection that lives on its own executor thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        SqliteWorker (open / close / execute / stats)    │
//! │        lifecycle state machine + lifecycle events       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [correlation engine]
//! ┌─────────────────────────────────────────────────────────┐
//! │      WorkerClient: token → pending call, timeouts       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [message boundary]
//! ┌─────────────────────────────────────────────────────────┐
//! │      Executor thread: dispatch against the database     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod worker;

pub use connection::{ConnectionState, SqliteWorker, WorkerOptions, DEFAULT_TIMEOUT};
pub use worker::protocol::Row;
pub use worker::{Event, EventKind, ListenerId, WorkerError, WorkerResult};
