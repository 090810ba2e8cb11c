//! Reply correlation, timeouts and remote error propagation.

mod support;

use std::time::Duration;

use futures::future::join_all;
use serde_json::json;
use sqlworker::worker::protocol::CommandKind;
use sqlworker::{WorkerError, WorkerOptions};
use support::{open_memory, open_slow, SLOW};

#[tokio::test]
async fn test_concurrent_calls_resolve_independently() {
    let db = open_memory().await;

    let calls = (0..32).map(|i| {
        let db = &db;
        async move { (i, db.execute("SELECT ? AS n", &[json!(i)]).await) }
    });

    for (i, result) in join_all(calls).await {
        let rows = result.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["n"], json!(i));
    }
    assert_eq!(db.pending_calls().await, 0);
}

#[tokio::test]
async fn test_malformed_sql_is_remote_error() {
    let db = open_memory().await;

    let err = db.execute("SELEC nonsense", &[]).await.unwrap_err();
    match err {
        WorkerError::Remote { message, .. } => {
            assert!(message.contains("syntax error"), "{message}")
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    // The executor keeps serving.
    let rows = db.execute("SELECT 1 AS one", &[]).await.unwrap();
    assert_eq!(rows[0]["one"], json!(1));
}

#[tokio::test]
async fn test_wrong_parameter_count_is_remote_error() {
    let db = open_memory().await;
    let err = db
        .execute("SELECT ?, ?", &[json!(1)])
        .await
        .unwrap_err();
    assert!(err.is_remote(), "{err:?}");
}

#[tokio::test]
async fn test_timeout_leaves_connection_usable() {
    let db = open_slow(Duration::from_millis(300), WorkerOptions::default()).await;

    let err = db
        .execute_with_timeout(
            &format!("{SLOW}SELECT 'late' AS v"),
            &[],
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Timeout {
            kind: CommandKind::Execute
        }
    ));
    assert_eq!(db.pending_calls().await, 0);

    // Queued behind the slow statement; must get its own reply, not the
    // orphaned one.
    let rows = db.execute("SELECT 'fresh' AS v", &[]).await.unwrap();
    assert_eq!(rows[0]["v"], json!("fresh"));
    assert_eq!(db.pending_calls().await, 0);
}

#[tokio::test]
async fn test_uniform_timeout_applies_to_execute() {
    let db = open_slow(
        Duration::from_millis(500),
        WorkerOptions {
            timeout: Some(Duration::from_millis(100)),
            ..WorkerOptions::default()
        },
    )
    .await;

    let err = db
        .execute(&format!("{SLOW}SELECT 1"), &[])
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_no_timeout_waits_for_reply() {
    let db = open_slow(
        Duration::from_millis(300),
        WorkerOptions {
            timeout: Some(Duration::from_millis(100)),
            ..WorkerOptions::default()
        },
    )
    .await;

    let rows = db
        .execute_with_timeout(&format!("{SLOW}SELECT 7 AS n"), &[], None)
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], json!(7));
}

#[tokio::test]
async fn test_every_call_resolves_exactly_once_around_a_timeout() {
    let db = open_slow(Duration::from_millis(200), WorkerOptions::default()).await;
    let db = &db;

    let slow_sql = format!("{SLOW}SELECT 0 AS n");
    let timed_out = db.execute_with_timeout(&slow_sql, &[], Some(Duration::from_millis(20)));
    let followers =
        (1..5).map(|i| async move { db.execute("SELECT ? AS n", &[json!(i)]).await });

    let (first, rest) = tokio::join!(timed_out, join_all(followers));
    assert!(first.unwrap_err().is_timeout());
    for (i, result) in rest.into_iter().enumerate() {
        assert_eq!(result.unwrap()[0]["n"], json!(i + 1));
    }
    assert_eq!(db.pending_calls().await, 0);
}
