//! Row edits applied through a session against SQLite.

use oxide_apply::prelude::*;
use oxide_apply::{Connection, ExecutionResult};
use oxide_apply_sqlite::SqliteConnection;
use sqlx::sqlite::SqlitePoolOptions;

async fn session_with(schema: &[&str]) -> Session<SqliteConnection> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");
    let mut conn = SqliteConnection::from_pool(pool);
    for sql in schema {
        conn.execute(sql, &[]).await.unwrap();
    }
    Session::new(conn, SessionConfig::new(DialectKind::Sqlite))
}

async fn rows(session: &mut Session<SqliteConnection>, sql: &str) -> Vec<Vec<SqlValue>> {
    session.query(sql, &[]).await.unwrap().rows
}

fn int(n: i64) -> SqlValue {
    SqlValue::Int(n)
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

const PEOPLE: &str = "CREATE TABLE test_inserts (id INTEGER PRIMARY KEY, name TEXT)";

const PAIRS: &str =
    "CREATE TABLE pairs (id1 INTEGER, id2 INTEGER, name TEXT, PRIMARY KEY (id1, id2))";

#[tokio::test]
async fn test_insert_two_rows() {
    let mut session = session_with(&[PEOPLE]).await;
    let changes = ChangeSet::new().insert(
        InsertOp::new("test_inserts")
            .row([("id", int(1)), ("name", text("Terry"))])
            .row([("id", int(2)), ("name", text("John"))]),
    );

    let result = session.apply_changes(changes).await.unwrap();

    assert!(result.committed);
    assert_eq!(result.total_rows(), 2);
    assert_eq!(
        rows(&mut session, "SELECT id, name FROM test_inserts ORDER BY id").await,
        vec![vec![int(1), text("Terry")], vec![int(2), text("John")]]
    );
}

#[tokio::test]
async fn test_duplicate_key_aborts_whole_batch() {
    let mut session = session_with(&[PEOPLE]).await;
    let changes = ChangeSet::new()
        .insert(InsertOp::new("test_inserts").row([("id", int(1)), ("name", text("a"))]))
        .insert(InsertOp::new("test_inserts").row([("id", int(1)), ("name", text("b"))]));

    let err = session.apply_changes(changes).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(
        rows(&mut session, "SELECT COUNT(*) FROM test_inserts").await,
        vec![vec![int(0)]]
    );
}

#[tokio::test]
async fn test_composite_key_update_and_delete() {
    let mut session = session_with(&[
        PAIRS,
        "INSERT INTO pairs VALUES (1, 1, 'a'), (1, 2, 'b'), (2, 1, 'c')",
    ])
    .await;
    let changes = ChangeSet::new()
        .update(
            UpdateOp::new("pairs", "name", "renamed")
                .key("id1", 1)
                .key("id2", 1),
        )
        .delete(DeleteOp::new("pairs").key("id1", 1).key("id2", 2));

    let result: ExecutionResult = session.apply_changes(changes).await.unwrap();

    assert_eq!(result.unmatched().count(), 0);
    assert_eq!(
        rows(&mut session, "SELECT id1, id2, name FROM pairs ORDER BY id1, id2").await,
        vec![
            vec![int(1), int(1), text("renamed")],
            vec![int(2), int(1), text("c")],
        ]
    );
}

#[tokio::test]
async fn test_partial_composite_key_is_refused() {
    let mut session = session_with(&[PAIRS, "INSERT INTO pairs VALUES (1, 1, 'a'), (1, 2, 'b')"]).await;
    let changes = ChangeSet::new().delete(DeleteOp::new("pairs").key("id1", 1));

    let err = session.apply_changes(changes).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AmbiguousTarget);
    assert_eq!(
        rows(&mut session, "SELECT COUNT(*) FROM pairs").await,
        vec![vec![int(2)]]
    );
}

#[tokio::test]
async fn test_mixed_failure_keeps_original_rows() {
    let mut session = session_with(&[PEOPLE, "INSERT INTO test_inserts VALUES (1, 'orig')"]).await;
    let changes = ChangeSet::new()
        .insert(
            InsertOp::new("test_inserts")
                .row([("id", int(2)), ("name", text("two"))])
                .row([("id", int(3)), ("name", text("three"))]),
        )
        .update(UpdateOp::new("test_inserts", "id", 2).key("id", 1))
        .delete(DeleteOp::new("test_inserts").key("id", 1));

    let err = session.apply_changes(changes).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(
        rows(&mut session, "SELECT id, name FROM test_inserts").await,
        vec![vec![int(1), text("orig")]]
    );
}

#[tokio::test]
async fn test_render_matches_execution() {
    let schema = [PEOPLE, "INSERT INTO test_inserts VALUES (1, 'orig'), (2, 'gone')"];
    let changes = ChangeSet::new()
        .insert(InsertOp::new("test_inserts").row([("id", int(3)), ("name", text("O'Hara"))]))
        .update(UpdateOp::new("test_inserts", "name", "new").key("id", 1))
        .delete(DeleteOp::new("test_inserts").key("id", 2));

    let mut executed = session_with(&schema).await;
    executed.apply_changes(changes.clone()).await.unwrap();

    let mut rendered = session_with(&schema).await;
    let sql = rendered.apply_changes_sql(changes).await.unwrap();
    for statement in sql.split(";\n") {
        rendered
            .query(statement.trim_end_matches(';'), &[])
            .await
            .unwrap();
    }

    let query = "SELECT id, name FROM test_inserts ORDER BY id";
    assert_eq!(rows(&mut executed, query).await, rows(&mut rendered, query).await);
}

#[tokio::test]
async fn test_generated_column_is_refused() {
    let mut session = session_with(&[
        "CREATE TABLE t (id INTEGER PRIMARY KEY, a INTEGER, b INTEGER GENERATED ALWAYS AS (a * 2))",
    ])
    .await;
    let changes = ChangeSet::new().insert(InsertOp::new("t").row([("id", 1), ("b", 4)]));

    let err = session.apply_changes(changes).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidColumn);
}

#[tokio::test]
async fn test_zero_row_update_is_reported() {
    let mut session = session_with(&[PEOPLE]).await;
    let changes = ChangeSet::new().update(UpdateOp::new("test_inserts", "name", "x").key("id", 42));

    let result = session.apply_changes(changes).await.unwrap();

    assert!(result.committed);
    assert_eq!(result.unmatched().count(), 1);
}

#[tokio::test]
async fn test_read_only_refuses_writes_but_reads() {
    let mut session = session_with(&[PEOPLE, "INSERT INTO test_inserts VALUES (1, 'orig')"]).await;
    session.set_read_only(true);

    let changes = ChangeSet::new().delete(DeleteOp::new("test_inserts").key("id", 1));
    let err = session.apply_changes(changes).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);

    let err = session.truncate_table(None, "test_inserts").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);

    let err = session
        .query("DELETE FROM test_inserts", &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation);

    assert_eq!(session.list_tables(None).await.unwrap().len(), 1);
    assert_eq!(
        rows(&mut session, "SELECT COUNT(*) FROM test_inserts").await,
        vec![vec![int(1)]]
    );
}

#[tokio::test]
async fn test_read_only_refuses_writes_hidden_in_reads() {
    let mut session =
        session_with(&[PEOPLE, "INSERT INTO test_inserts VALUES (1, 'a'), (2, 'b')"]).await;
    session.set_read_only(true);

    for sql in [
        "WITH x AS (SELECT 1) DELETE FROM test_inserts",
        "SELECT 1; DROP TABLE test_inserts",
        "PRAGMA user_version = 7",
        "SELECT * INTO copy FROM test_inserts",
    ] {
        let err = session.query(sql, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnlyViolation, "{sql}");
    }

    assert_eq!(session.list_tables(None).await.unwrap().len(), 1);
    assert_eq!(
        rows(&mut session, "SELECT COUNT(*) FROM test_inserts").await,
        vec![vec![int(2)]]
    );
    assert_eq!(
        rows(&mut session, "PRAGMA user_version").await,
        vec![vec![int(0)]]
    );
    assert_eq!(
        rows(&mut session, "WITH x AS (SELECT 1 AS n) SELECT n FROM x;").await,
        vec![vec![int(1)]]
    );
}

#[tokio::test]
async fn test_insert_beyond_one_statement() {
    let mut session = session_with(&[PEOPLE]).await;
    let op = (0..40_000).fold(InsertOp::new("test_inserts"), |op, id| {
        op.row([("id", int(id)), ("name", text("n"))])
    });

    let result = session.apply_changes(ChangeSet::new().insert(op)).await.unwrap();

    assert!(result.rows_affected.len() > 1);
    assert_eq!(result.total_rows(), 40_000);
    assert_eq!(
        rows(&mut session, "SELECT COUNT(*) FROM test_inserts").await,
        vec![vec![int(40_000)]]
    );
}

#[tokio::test]
async fn test_file_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("app.db").display());

    let mut conn = SqliteConnection::connect(&url).await.unwrap();
    conn.execute(PEOPLE, &[]).await.unwrap();
    let mut session = Session::new(conn, SessionConfig::new(DialectKind::Sqlite));
    session
        .apply_changes(ChangeSet::new().insert(InsertOp::new("test_inserts").row([("id", 7)])))
        .await
        .unwrap();
    session.close().await.unwrap();

    let conn = SqliteConnection::connect(&url).await.unwrap();
    let mut session = Session::new(conn, SessionConfig::new(DialectKind::Sqlite));
    assert_eq!(
        rows(&mut session, "SELECT id FROM test_inserts").await,
        vec![vec![int(7)]]
    );
}
