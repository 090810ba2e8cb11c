//! Worker communication module.
//!
//! This module runs a database handle on a dedicated executor thread and
//! provides async, correlated request/response access to it. The controller
//! side never touches the handle; everything crosses the boundary as owned
//! messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Controller (caller's runtime)                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                    WorkerClient (Async)                   │  │
//! │  │  - UUID token per call, pending table keyed by token      │  │
//! │  │  - Per-call timeout, late replies dropped                 │  │
//! │  │  - Token-less notifications routed to events              │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                              │                                  │
//! │            CommandEnvelope   │   WorkerMessage                  │
//! │                              ▼                                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           IsolatedUnit (dedicated OS thread)                    │
//! │  Executor: one command at a time against one DatabaseHandle     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod client;
pub mod engine;
mod error;
pub mod events;
pub mod executor;
pub mod protocol;
mod unit;

pub use client::WorkerClient;
pub use engine::{DatabaseHandle, Engine, EngineError, SqliteEngine};
pub use error::{WorkerError, WorkerResult};
pub use events::{Event, EventHub, EventKind, ListenerId};
pub use executor::Executor;
pub use unit::IsolatedUnit;
