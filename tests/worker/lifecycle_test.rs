//! Open/close lifecycle and lifecycle events.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use sqlworker::{ConnectionState, Event, EventKind, SqliteWorker, WorkerError, WorkerOptions};
use support::{open_slow, SlowEngine, SLOW};

fn recorder(db: &SqliteWorker) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Opened, EventKind::Closed, EventKind::Error] {
        let s = seen.clone();
        db.on(kind, move |event| s.lock().unwrap().push(event.clone()));
    }
    seen
}

#[tokio::test]
async fn test_open_close_events() {
    let db = SqliteWorker::new(":memory:");
    let seen = recorder(&db);

    db.open().await.unwrap();
    assert_eq!(db.state(), ConnectionState::Open);
    assert_eq!(*seen.lock().unwrap(), vec![Event::Opened]);

    db.close().await.unwrap();
    assert_eq!(db.state(), ConnectionState::Closed);
    assert_eq!(*seen.lock().unwrap(), vec![Event::Opened, Event::Closed]);
}

#[tokio::test]
async fn test_open_twice_without_close() {
    let db = SqliteWorker::new(":memory:");
    db.open().await.unwrap();

    let err = db.open().await.unwrap_err();
    assert!(matches!(err, WorkerError::AlreadyOpen));
    // The failed open did not disturb the live connection.
    assert!(db.execute("SELECT 1", &[]).await.is_ok());
}

#[tokio::test]
async fn test_calls_after_close_fail_with_not_open() {
    let db = SqliteWorker::new(":memory:");
    db.open().await.unwrap();
    db.close().await.unwrap();

    assert!(matches!(db.execute("SELECT 1", &[]).await, Err(WorkerError::NotOpen)));
    assert!(matches!(db.changes().await, Err(WorkerError::NotOpen)));
    assert!(matches!(db.total_changes().await, Err(WorkerError::NotOpen)));
    assert!(matches!(db.last_insert_id().await, Err(WorkerError::NotOpen)));
    assert!(matches!(db.close().await, Err(WorkerError::NotOpen)));
}

#[tokio::test]
async fn test_reopen_same_instance_starts_new_executor() {
    let db = SqliteWorker::new(":memory:");
    db.open().await.unwrap();
    db.execute("CREATE TABLE t (a)", &[]).await.unwrap();
    db.close().await.unwrap();

    db.open().await.unwrap();
    // A new in-memory database: the old table is gone.
    let err = db.execute("SELECT * FROM t", &[]).await.unwrap_err();
    assert!(err.is_remote());
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_off_stops_delivery() {
    let db = SqliteWorker::new(":memory:");
    let hits = Arc::new(Mutex::new(0));
    let h = hits.clone();
    let id = db.on(EventKind::Opened, move |_| *h.lock().unwrap() += 1);

    db.open().await.unwrap();
    db.close().await.unwrap();
    assert!(db.off(id));

    db.open().await.unwrap();
    db.close().await.unwrap();
    assert_eq!(*hits.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_close_fails_calls_left_behind() {
    let db = Arc::new(
        open_slow(
            Duration::from_millis(200),
            WorkerOptions {
                timeout: None,
                ..WorkerOptions::default()
            },
        )
        .await,
    );

    // Occupies the executor so CLOSE and the straggler queue behind it.
    let slow = {
        let db = db.clone();
        tokio::spawn(async move {
            let sql = format!("{SLOW}SELECT 1 AS one");
            let rows = db.execute(&sql, &[]).await;
            rows
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let closing = {
        let db = db.clone();
        tokio::spawn(async move {
            db.close().await?;
            Ok::<(), WorkerError>(())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let straggler = db.execute("SELECT 2", &[]).await;

    // Calls queued before CLOSE complete normally.
    assert_eq!(slow.await.unwrap().unwrap()[0]["one"], json!(1));
    closing.await.unwrap().unwrap();

    // The call queued after CLOSE never succeeds.
    match straggler {
        Err(WorkerError::Closed) => {}
        Err(e) => assert!(e.is_remote(), "unexpected error: {e:?}"),
        Ok(rows) => panic!("call after close succeeded: {rows:?}"),
    }
    assert_eq!(db.state(), ConnectionState::Closed);
    assert_eq!(db.pending_calls().await, 0);
}

#[tokio::test]
async fn test_close_timeout_still_closes() {
    let db = Arc::new(
        open_slow(
            Duration::from_millis(300),
            WorkerOptions {
                timeout: Some(Duration::from_millis(100)),
                ..WorkerOptions::default()
            },
        )
        .await,
    );
    let seen = recorder(&db);

    // Keeps the executor busy past the CLOSE deadline.
    let slow = {
        let db = db.clone();
        tokio::spawn(async move {
            let sql = format!("{SLOW}SELECT 1");
            let rows = db.execute_with_timeout(&sql, &[], None).await;
            rows
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    db.close().await.unwrap();
    assert_eq!(db.state(), ConnectionState::Closed);
    assert_eq!(*seen.lock().unwrap(), vec![Event::Closed]);

    // The slow call was still waiting when the connection closed.
    assert!(matches!(slow.await.unwrap(), Err(WorkerError::Closed)));
    assert_eq!(db.pending_calls().await, 0);

    assert!(matches!(db.close().await, Err(WorkerError::NotOpen)));
    assert!(matches!(db.execute("SELECT 1", &[]).await, Err(WorkerError::NotOpen)));

    db.open().await.unwrap();
    let rows = db.execute("SELECT 1 AS one", &[]).await.unwrap();
    assert_eq!(rows[0]["one"], json!(1));
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_open_timeout_leaves_connection_closed() {
    let db = SqliteWorker::with_engine(
        ":memory:",
        WorkerOptions {
            timeout: Some(Duration::from_millis(100)),
            ..WorkerOptions::default()
        },
        Arc::new(SlowEngine {
            delay: Duration::ZERO,
            open_delay: Duration::from_millis(300),
        }),
    );
    let seen = recorder(&db);

    let err = db.open().await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");

    // Give the abandoned open time to finish on the executor.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(db.state(), ConnectionState::Closed);
    assert!(seen.lock().unwrap().is_empty());
    assert!(matches!(db.execute("SELECT 1", &[]).await, Err(WorkerError::NotOpen)));

    // Retrying opens again instead of reporting AlreadyOpen.
    let err = db.open().await.unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
}
