//! Database engine seam.
//!
//! The executor only talks to an [`Engine`] (to open handles) and to the
//! [`DatabaseHandle`]s it returns. [`SqliteEngine`] is the real implementation;
//! tests plug in their own engines to control timing.

use base64::Engine as _;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use super::protocol::Row;

/// Error raised by the database engine.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Opens database handles for the executor.
pub trait Engine: Send + Sync + 'static {
    /// Open a handle against `file`.
    fn open(&self, file: &str) -> EngineResult<Box<dyn DatabaseHandle>>;
}

/// A live database handle. Owned by exactly one executor.
pub trait DatabaseHandle: Send {
    /// Run one statement with positional parameters and collect every row.
    fn execute(&mut self, sql: &str, params: &[Value]) -> EngineResult<Vec<Row>>;

    /// Rows modified by the most recent statement.
    fn changes(&self) -> EngineResult<i64>;

    /// Rows modified since the handle was opened.
    fn total_changes(&self) -> EngineResult<i64>;

    /// Rowid of the most recent successful insert.
    fn last_insert_rowid(&self) -> EngineResult<i64>;

    /// Close the handle, releasing the underlying file.
    fn close(self: Box<Self>) -> EngineResult<()>;
}

/// SQLite engine backed by rusqlite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

impl Engine for SqliteEngine {
    fn open(&self, file: &str) -> EngineResult<Box<dyn DatabaseHandle>> {
        let conn = if file == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(file)?
        };
        Ok(Box::new(SqliteHandle { conn }))
    }
}

struct SqliteHandle {
    conn: Connection,
}

impl SqliteHandle {
    fn counter(&self, sql: &str) -> EngineResult<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }
}

impl DatabaseHandle for SqliteHandle {
    fn execute(&mut self, sql: &str, params: &[Value]) -> EngineResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), from_sql_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn changes(&self) -> EngineResult<i64> {
        self.counter("SELECT changes()")
    }

    fn total_changes(&self) -> EngineResult<i64> {
        self.counter("SELECT total_changes()")
    }

    fn last_insert_rowid(&self) -> EngineResult<i64> {
        Ok(self.conn.last_insert_rowid())
    }

    fn close(self: Box<Self>) -> EngineResult<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

/// Bind a JSON parameter. Arrays and objects are bound as their JSON text.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a result cell. Blobs become base64 strings.
fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}
