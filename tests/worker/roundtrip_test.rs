//! End-to-end statement round trips against real SQLite files.

mod support;

use serde_json::{json, Value};
use sqlworker::SqliteWorker;
use support::open_memory;

#[tokio::test]
async fn test_create_insert_select() {
    let db = open_memory().await;

    db.execute("CREATE TABLE t(a TEXT, b INTEGER)", &[])
        .await
        .unwrap();
    let inserted = db
        .execute("INSERT INTO t VALUES(?, ?)", &[json!("x"), json!(1)])
        .await
        .unwrap();
    assert!(inserted.is_empty());

    assert_eq!(db.changes().await.unwrap(), 1);
    assert!(db.last_insert_id().await.unwrap() > 0);

    let rows = db.execute("SELECT * FROM t", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(Value::Object(rows[0].clone()), json!({"a": "x", "b": 1}));

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_statistics_track_modifications() {
    let db = open_memory().await;

    db.execute("CREATE TABLE t (f1 TEXT, f2 INTEGER)", &[])
        .await
        .unwrap();
    db.execute("INSERT INTO t (f1, f2) VALUES (?, ?)", &[json!("hello"), json!(6)])
        .await
        .unwrap();
    db.execute("INSERT INTO t (f1, f2) VALUES (?, ?)", &[json!("world"), json!(9)])
        .await
        .unwrap();

    assert_eq!(db.changes().await.unwrap(), 1);
    assert_eq!(db.total_changes().await.unwrap(), 2);
    assert_eq!(db.last_insert_id().await.unwrap(), 2);

    db.execute("DELETE FROM t", &[]).await.unwrap();
    assert_eq!(db.changes().await.unwrap(), 2);
    assert_eq!(db.total_changes().await.unwrap(), 4);
}

#[tokio::test]
async fn test_null_and_real_values() {
    let db = open_memory().await;
    let rows = db
        .execute("SELECT ? AS n, ? AS r, ? AS flag", &[Value::Null, json!(2.5), json!(true)])
        .await
        .unwrap();
    assert_eq!(
        Value::Object(rows[0].clone()),
        json!({"n": null, "r": 2.5, "flag": 1})
    );
}

#[tokio::test]
async fn test_fresh_instance_sees_committed_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.db");
    let file = path.to_str().unwrap().to_string();

    let first = SqliteWorker::new(file.clone());
    first.open().await.unwrap();
    first
        .execute("CREATE TABLE t (a TEXT, b INTEGER)", &[])
        .await
        .unwrap();
    first
        .execute("INSERT INTO t VALUES (?, ?)", &[json!("kept"), json!(42)])
        .await
        .unwrap();
    first.close().await.unwrap();

    let second = SqliteWorker::new(file);
    second.open().await.unwrap();
    let rows = second.execute("SELECT a, b FROM t", &[]).await.unwrap();
    assert_eq!(Value::Object(rows[0].clone()), json!({"a": "kept", "b": 42}));
    second.close().await.unwrap();
}
