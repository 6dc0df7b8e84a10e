//! End-to-end tests against `SQLite` database files.
//!
//! Each test gets its own temporary directory and registry.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use dbflow::{
    Changes, Conditions, ConnectionConfig, ConnectionRegistry, DatabaseSettings, Db, Error,
    ExecutionErrorKind, KeyedColumn, Page, PoolSettings, Record, RuntimeFlags, Value, codes,
};
use dbflow::Connection;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const SCHEMA: &str = "CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    tags TEXT NOT NULL DEFAULT ''
)";

fn database(dir: &TempDir) -> ConnectionConfig {
    ConnectionConfig::sqlite(dir.path().join("app.db").to_string_lossy())
}

fn open(dir: &TempDir) -> Arc<Connection> {
    open_with(database(dir))
}

fn open_with(config: ConnectionConfig) -> Arc<Connection> {
    let registry = ConnectionRegistry::new(RuntimeFlags::debug(), None);
    let conn = registry.connection(&config).expect("open sqlite database");
    conn.execute(SCHEMA, &[]).expect("create schema");
    conn
}

fn seed(conn: &Connection, count: usize) {
    let statuses = ["active", "pending", "banned"];
    let records = (0..count)
        .map(|i| {
            Record::new()
                .set("name", format!("user{i}"))
                .set("age", 10 + i)
                .set("status", statuses[i % 3])
        })
        .collect();
    conn.table("users").insert_list(records).unwrap();
}

#[test]
fn test_end_to_end_crud() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);

    let id = conn
        .table("users")
        .insert(
            Record::new()
                .set("name", "Ann")
                .set("age", 30)
                .set("hacked", 1),
        )
        .unwrap();
    assert_eq!(id, Value::Int(1));
    assert_eq!(
        conn.last_sql(),
        "INSERT INTO `users` (`name`,`age`) VALUES ('Ann',30)"
    );

    conn.table("users")
        .insert(Record::new().set("name", "Bob").set("age", 12))
        .unwrap();

    assert_eq!(conn.table("users").and_where("age", ">", 18).count().unwrap(), 1);

    let affected = conn
        .table("users")
        .where_pk(2)
        .update(Changes::new().set("name", "Robert").increment("age", 5))
        .unwrap();
    assert_eq!(affected, 1);
    let row = conn.table("users").where_eq("id", 2).row().unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("Robert")));
    assert_eq!(row.get("age"), Some(&Value::Int(17)));

    assert_eq!(conn.table("users").where_eq("name", "Ann").delete().unwrap(), 1);
    assert_eq!(conn.table("users").count().unwrap(), 1);
    assert_eq!(
        conn.table("users").where_eq("id", 1).value("name").unwrap(),
        None
    );
}

#[test]
fn test_pagination_with_or_conditions() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 30);

    let mut page = Page::new(2, 10);
    let rows = conn
        .table("users")
        .where_conditions(
            Conditions::new()
                .or_eq("status", "active")
                .or_eq("status", "pending"),
        )
        .order_by("id DESC")
        .page(&mut page)
        .list(true)
        .unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(page.total, 20);
    assert_eq!(page.total_pages, 2);
    let first = rows[0].get("id").and_then(Value::as_i64).unwrap();
    let last = rows[9].get("id").and_then(Value::as_i64).unwrap();
    assert!(first > last);
    assert!(
        rows.iter()
            .all(|r| r.get("status") != Some(&Value::from("banned")))
    );
}

#[test]
fn test_list_without_count() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 5);

    let mut page = Page::new(1, 2);
    page.record_total(40);
    let rows = conn.table("users").page(&mut page).list(false).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!((page.total, page.total_pages), (0, 0));
    assert_eq!(conn.last_sql(), "SELECT * FROM `users` LIMIT 0,2");
}

#[test]
fn test_grouped_pagination_counts_groups() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 9);

    let mut page = Page::new(1, 2);
    let rows = conn
        .table("users")
        .select("status, COUNT(*) AS n")
        .group_by("status")
        .order_by("status")
        .page(&mut page)
        .list(true)
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("status"), Some(&Value::from("active")));
    assert_eq!(rows[0].get("n"), Some(&Value::Int(3)));
}

#[test]
fn test_pagination_with_projection_bindings() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 10);

    let mut page = Page::new(1, 4);
    let rows = conn
        .table("users")
        .select("id, CASE WHEN age > ? THEN 'adult' ELSE 'minor' END AS band")
        .bind([12])
        .and_where("age", ">", 10)
        .order_by("id")
        .page(&mut page)
        .list(true)
        .unwrap();

    assert_eq!(page.total, 9);
    assert_eq!(page.total_pages, 3);
    let bands: Vec<_> = rows.iter().map(|r| r.get("band").cloned().unwrap()).collect();
    assert_eq!(
        bands,
        ["minor", "minor", "adult", "adult"].map(Value::from)
    );
    assert_eq!(
        conn.last_sql(),
        "SELECT id, CASE WHEN age > 12 THEN 'adult' ELSE 'minor' END AS band \
         FROM `users` WHERE `age` > 10 ORDER BY id LIMIT 0,4"
    );
}

#[test]
fn test_pagination_with_join_bindings() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 6);
    conn.execute(
        "CREATE TABLE scores (user_id INTEGER NOT NULL, season INTEGER NOT NULL, points INTEGER NOT NULL)",
        &[],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO scores (user_id, season, points) VALUES (1, 2024, 5), (2, 2024, 7), (3, 2023, 9), (4, 2024, 1)",
        &[],
    )
    .unwrap();

    let mut page = Page::new(1, 2);
    let rows = conn
        .table("users")
        .alias("u")
        .select("u.id, s.points + ? AS boosted")
        .bind([100])
        .join_with("JOIN scores s ON s.user_id = u.id AND s.season = ?", [2024])
        .and_where("s.points", ">", 2)
        .order_by("u.id")
        .page(&mut page)
        .list(true)
        .unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 1);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("boosted"), Some(&Value::Int(105)));
    assert_eq!(rows[1].get("boosted"), Some(&Value::Int(107)));
}

#[test]
fn test_operators_against_sqlite() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    conn.table("users")
        .insert_list(vec![
            Record::new().set("name", "a").set("age", 20).set("tags", "red,blue"),
            Record::new().set("name", "b").set("age", 30).set("tags", "blue"),
            Record::new().set("name", "c").set("age", 40).set("tags", "green"),
        ])
        .unwrap();

    let names = |q: dbflow::Query<'_>| -> Vec<Value> { q.order_by("id").column("name").unwrap() };

    assert_eq!(
        names(conn.table("users").where_find_in_set("tags", "blue")),
        [Value::from("a"), Value::from("b")]
    );
    assert_eq!(
        names(conn.table("users").where_in("age", vec![20, 40])),
        [Value::from("a"), Value::from("c")]
    );
    assert!(names(conn.table("users").where_in("age", Vec::<i64>::new())).is_empty());
    assert_eq!(
        names(conn.table("users").where_between("age", 25, 40)),
        [Value::from("b"), Value::from("c")]
    );
    assert_eq!(
        names(conn.table("users").where_like("name", "c%")),
        [Value::from("c")]
    );
    assert_eq!(
        names(
            conn.table("users")
                .and_where("age", "<>", 30)
                .where_group(|g| g.where_eq("name", "a").or_where_eq("name", "b"))
        ),
        [Value::from("a")]
    );
    assert_eq!(
        names(conn.table("users").where_json(&json!({"age": [">=", 30], "name": "c"}))),
        [Value::from("c")]
    );
    assert_eq!(
        names(conn.table("users").where_raw("age % ? = 0", vec![Value::Int(20)])),
        [Value::from("a"), Value::from("c")]
    );
}

#[test]
fn test_keyed_columns_and_aggregates() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 4);

    let keyed = conn.table("users").order_by("id").column_by("name", "id").unwrap();
    assert_eq!(
        keyed,
        KeyedColumn::Values(vec![
            (Value::Int(1), Value::from("user0")),
            (Value::Int(2), Value::from("user1")),
            (Value::Int(3), Value::from("user2")),
            (Value::Int(4), Value::from("user3")),
        ])
    );

    assert_eq!(conn.table("users").sum("age").unwrap(), Value::Int(46));
    assert_eq!(conn.table("users").avg("age").unwrap(), Value::Float(11.5));
    assert_eq!(conn.table("users").max("age").unwrap(), Value::Int(13));
    assert_eq!(conn.table("users").min("age").unwrap(), Value::Int(10));
    assert_eq!(
        conn.table("users").where_eq("status", "nobody").sum("age").unwrap(),
        Value::Int(0)
    );
    assert_eq!(conn.table("users").count_of("DISTINCT status").unwrap(), 3);
}

#[test]
fn test_inc_and_dec() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 1);

    conn.table("users").where_eq("id", 1).inc("age", 5).unwrap();
    conn.table("users").where_eq("id", 1).dec("age", 2).unwrap();
    assert_eq!(
        conn.table("users").where_eq("id", 1).value("age").unwrap(),
        Some(Value::Int(13))
    );
}

#[test]
fn test_unconditioned_writes_are_rejected() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 3);

    let err = conn
        .table("users")
        .update(Record::new().set("name", "x"))
        .unwrap_err();
    assert!(matches!(err, Error::QueryBuild(_)));
    let err = conn.table("users").delete().unwrap_err();
    assert_eq!(err.code(), codes::QUERY_BUILD);
    assert_eq!(conn.table("users").where_eq("name", "x").count().unwrap(), 0);
    assert_eq!(conn.table("users").count().unwrap(), 3);
}

#[test]
fn test_transactions() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);

    {
        let tx = conn.start_trans().unwrap();
        tx.table("users").insert(Record::new().set("name", "kept")).unwrap();
        assert_eq!(tx.table("users").count().unwrap(), 1);
        tx.commit().unwrap();
    }
    {
        let tx = conn.start_trans().unwrap();
        tx.table("users").insert(Record::new().set("name", "undone")).unwrap();
        tx.rollback().unwrap();
        tx.rollback().unwrap();
    }
    {
        let tx = conn.start_trans().unwrap();
        tx.table("users").insert(Record::new().set("name", "dropped")).unwrap();
    }
    let result: dbflow::Result<()> = conn.transaction(|tx| {
        tx.table("users").insert(Record::new().set("name", "failed"))?;
        Err(Error::QueryBuild("abort".to_string()))
    });
    assert!(result.is_err());

    let names = conn.table("users").column("name").unwrap();
    assert_eq!(names, [Value::from("kept")]);
}

#[test]
fn test_for_update_is_accepted() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    seed(&conn, 2);

    let tx = conn.start_trans().unwrap();
    let row = tx.table("users").where_eq("id", 2).for_update().row().unwrap();
    assert!(row.is_some());
    tx.commit().unwrap();
}

#[test]
fn test_execution_error_carries_interpolated_sql() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);

    let err = conn
        .table("missing")
        .where_eq("name", "Ann")
        .row()
        .unwrap_err();
    match &err {
        Error::Execution { kind, sql, message, .. } => {
            assert_eq!(*kind, ExecutionErrorKind::Failed);
            assert_eq!(sql, "SELECT * FROM `missing` WHERE `name` = 'Ann' LIMIT 1");
            assert!(message.contains("no such table"));
        },
        other => unreachable!("unexpected error: {other}"),
    }
    assert_eq!(err.code(), 1);
}

#[test]
fn test_introspection_helpers() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);

    assert_eq!(conn.tables().unwrap(), ["users"]);
    assert_eq!(conn.primary_key("users").unwrap(), "id");
    assert!(conn.is_auto_increment("users").unwrap());
    assert_eq!(
        conn.fields("users").unwrap(),
        ["id", "name", "age", "status", "tags"]
    );
    let columns = conn.describe("users").unwrap();
    assert_eq!(columns[0].key, "PRI");
    assert_eq!(columns[0].extra, "auto_increment");
    assert!(!columns[1].null);
    assert!(conn.ping());

    let err = conn.primary_key("nope").unwrap_err();
    assert_eq!(err.code(), 1146);
}

#[test]
fn test_text_primary_key_is_echoed() {
    let dir = TempDir::new().unwrap();
    let conn = open(&dir);
    conn.execute("CREATE TABLE tags (code TEXT PRIMARY KEY, label TEXT)", &[])
        .unwrap();

    let key = conn
        .table("tags")
        .insert(Record::new().set("code", "rust").set("label", "Rust"))
        .unwrap();
    assert_eq!(key, Value::from("rust"));
    assert!(!conn.is_auto_increment("tags").unwrap());
}

#[test]
fn test_pool_checkout_timeout() {
    let dir = TempDir::new().unwrap();
    let conn = open_with(
        database(&dir).with_pool(
            PoolSettings::default()
                .with_max_size(1)
                .with_acquire_timeout_ms(50),
        ),
    );

    let tx = conn.start_trans().unwrap();
    let err = conn.table("users").count().unwrap_err();
    assert!(matches!(
        err,
        Error::Connection {
            code: codes::POOL_TIMEOUT,
            ..
        }
    ));
    tx.commit().unwrap();
    drop(tx);
    assert_eq!(conn.table("users").count().unwrap(), 0);
}

#[test]
fn test_concurrent_callers_share_pool() {
    let dir = TempDir::new().unwrap();
    let conn = open_with(
        database(&dir).with_pool(PoolSettings::default().with_max_size(3)),
    );
    seed(&conn, 6);

    let handles: Vec<_> = (0..8_u64)
        .map(|i| {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                for _ in 0..20 {
                    let n = conn.table("users").and_where("age", ">=", 10 + (i % 6)).count()?;
                    assert_eq!(n, 6 - i % 6);
                }
                Ok::<_, Error>(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
}

#[test]
fn test_facade_default_connection() {
    let dir = TempDir::new().unwrap();
    let settings = DatabaseSettings::new()
        .with_runtime(RuntimeFlags::debug())
        .with_connection("default", database(&dir).with_prefix("app_"));
    let db = Db::new(settings);

    db.execute(&SCHEMA.replace("users", "app_users"), &[]).unwrap();
    db.name("users")
        .unwrap()
        .insert(Record::new().set("name", "Ann"))
        .unwrap();
    assert_eq!(db.table("app_users").unwrap().count().unwrap(), 1);
    let row = db
        .query_one("SELECT name FROM app_users WHERE id = ?", &[Value::Int(1)])
        .unwrap()
        .unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("Ann")));
}
