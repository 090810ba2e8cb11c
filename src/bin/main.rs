//! sqlworker CLI - Run SQL statements through an executor thread
//!
//! Usage:
//!   sqlworker [--file <db>] [--config <toml>] [--timeout <dur>] <SQL>...
//!
//! Examples:
//!   sqlworker --file app.db "CREATE TABLE t (a TEXT, b INTEGER)"
//!   sqlworker --file app.db "INSERT INTO t VALUES ('x', 1)" "SELECT * FROM t"
//!   sqlworker --timeout none "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 1000000) SELECT count(*) FROM c"

use clap::Parser;
use sqlworker::config::{parse_duration, Settings};
use sqlworker::{EventKind, SqliteWorker, WorkerError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlworker")]
#[command(about = "Run SQL statements against a SQLite database on an executor thread")]
#[command(version)]
struct Cli {
    /// Database file (overrides the config file; defaults to in-memory)
    #[arg(short, long)]
    file: Option<String>,

    /// Path to a sqlworker.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-call timeout, e.g. "10s", "500ms" or "none"
    #[arg(short, long)]
    timeout: Option<String>,

    /// SQL statements to run, in order
    #[arg(required = true)]
    sql: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let mut settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(file) = cli.file {
        settings.worker.file = Some(file);
    }
    if let Some(timeout) = cli.timeout {
        if let Err(e) = parse_duration(&timeout) {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
        settings.worker.timeout = timeout;
    }

    let db = match SqliteWorker::from_settings(&settings) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    db.on(EventKind::Error, |event| eprintln!("Executor error: {:?}", event));

    match run(&db, &cli.sql).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(db: &SqliteWorker, statements: &[String]) -> Result<(), WorkerError> {
    db.open().await?;

    for sql in statements {
        let rows = db.execute(sql, &[]).await?;
        for row in rows {
            println!("{}", serde_json::Value::Object(row));
        }
    }

    eprintln!("Changes: {}", db.changes().await?);
    eprintln!("Total changes: {}", db.total_changes().await?);
    eprintln!("Last insert id: {}", db.last_insert_id().await?);

    db.close().await?;
    Ok(())
}
