//! Integration tests for the SQLite adapter: reflection, caching, execution,
//! transactions and batches.

use std::sync::Arc;

use sql_agent::config::DatabaseConfig;
use sql_agent::db::{DatabaseDialect, DatabaseType};
use sql_agent::db::sqlite::SqliteAdapter;
use sql_agent::models::{BindParams, BindValue};

/// In-memory database with a small commerce-style schema.
async fn setup_adapter() -> SqliteAdapter {
    let adapter = SqliteAdapter::connect(&DatabaseConfig::sqlite(":memory:"))
        .await
        .expect("Failed to open in-memory SQLite");

    for sql in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, avatar BLOB)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id), total REAL)",
        "INSERT INTO users (name, avatar) VALUES ('Alice', X'00FF10')",
        "INSERT INTO users (name) VALUES ('Bob')",
        "INSERT INTO orders (id, user_id, total) VALUES (1, 1, 9.5)",
    ] {
        let result = adapter.execute_query(sql, &[]).await;
        assert!(result.success, "setup failed: {:?}", result.error);
    }
    adapter
}

#[tokio::test]
async fn test_reflection_tables_columns_and_keys() {
    let adapter = setup_adapter().await;
    let schema = adapter.schema_info().await.unwrap();

    assert_eq!(schema.database_type, DatabaseType::SQLite);
    assert_eq!(schema.table_names(), vec!["orders", "users"]);

    let users = &schema.tables["users"];
    let id = users.column("id").unwrap();
    assert!(id.primary_key);
    assert!(id.autoincrement);
    let name = users.column("name").unwrap();
    assert!(!name.nullable);

    assert_eq!(schema.foreign_keys.len(), 1);
    let fk = &schema.foreign_keys[0];
    assert_eq!(fk.constrained_table, "orders");
    assert_eq!(fk.constrained_columns, vec!["user_id"]);
    assert_eq!(fk.referred_table, "users");
    assert_eq!(fk.referred_columns, vec!["id"]);
}

#[tokio::test]
async fn test_sample_rows_hex_encode_binary() {
    let adapter = setup_adapter().await;
    let schema = adapter.schema_info().await.unwrap();

    let samples = &schema.tables["users"].sample_data;
    assert!(!samples.is_empty());
    assert_eq!(samples[0]["avatar"], serde_json::json!("00ff10"));
}

#[tokio::test]
async fn test_schema_info_is_cached() {
    let adapter = setup_adapter().await;
    let first = adapter.schema_info().await.unwrap();

    // Changes after the first reflection are invisible to the cache
    let result = adapter
        .execute_query("CREATE TABLE late_arrival (id INTEGER)", &[])
        .await;
    assert!(result.success);

    let second = adapter.schema_info().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!second.has_table("late_arrival"));
}

#[tokio::test]
async fn test_execute_query_with_bound_values() {
    let adapter = setup_adapter().await;
    let result = adapter
        .execute_query(
            "SELECT name FROM users WHERE id = ?",
            &[BindValue::Int(1)],
        )
        .await;

    assert!(result.success);
    assert_eq!(result.row_count, 1);
    assert_eq!(result.columns, vec!["name"]);
    assert_eq!(result.data[0]["name"], serde_json::json!("Alice"));
    assert!(result.execution_time_ms.is_some());
}

#[tokio::test]
async fn test_execute_query_failure_is_not_an_err() {
    let adapter = setup_adapter().await;
    let result = adapter.execute_query("SELECT * FROM missing", &[]).await;

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("missing"), "unexpected error: {}", error);
}

#[tokio::test]
async fn test_row_cap_truncates_results() {
    let adapter = SqliteAdapter::connect(&DatabaseConfig::sqlite(":memory:"))
        .await
        .unwrap()
        .with_max_rows(3);
    adapter
        .execute_query("CREATE TABLE n (v INTEGER)", &[])
        .await;
    for v in 0..10 {
        adapter
            .execute_query("INSERT INTO n (v) VALUES (?)", &[BindValue::Int(v)])
            .await;
    }

    let result = adapter.execute_query("SELECT v FROM n", &[]).await;
    assert!(result.success);
    assert_eq!(result.row_count, 3);
}

#[tokio::test]
async fn test_validate_through_adapter_read_only() {
    let adapter = SqliteAdapter::connect(&DatabaseConfig::sqlite(":memory:"))
        .await
        .unwrap()
        .with_read_only(true);

    assert!(adapter.validate_and_sanitize_sql("SELECT 1").is_ok());
    let err = adapter
        .validate_and_sanitize_sql("DELETE FROM users")
        .unwrap_err();
    assert!(err.to_string().contains("SELECT"));
}

#[tokio::test]
async fn test_escape_identifier_quote_doubling() {
    let adapter = SqliteAdapter::connect(&DatabaseConfig::sqlite(":memory:"))
        .await
        .unwrap();
    assert_eq!(adapter.escape_identifier("users"), "\"users\"");
    assert_eq!(adapter.escape_identifier("we\"ird"), "\"we\"\"ird\"");
    // Empty identifiers still quote cleanly
    assert_eq!(adapter.escape_identifier(""), "\"\"");
}

#[tokio::test]
async fn test_aggregate_and_expression_columns_decode() {
    let adapter = setup_adapter().await;
    let result = adapter
        .execute_query(
            "SELECT COUNT(*) AS c, MAX(total) AS m, 'x' || 'y' AS s FROM orders",
            &[],
        )
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.data[0]["c"], serde_json::json!(1));
    assert_eq!(result.data[0]["m"], serde_json::json!(9.5));
    assert_eq!(result.data[0]["s"], serde_json::json!("xy"));
}

#[tokio::test]
async fn test_aggregate_over_empty_set_is_null() {
    let adapter = setup_adapter().await;
    let result = adapter
        .execute_query("SELECT MAX(total) AS m FROM orders WHERE id > 100", &[])
        .await;

    assert!(result.success);
    assert_eq!(result.data[0]["m"], serde_json::Value::Null);
}

async fn count_users(adapter: &SqliteAdapter) -> serde_json::Value {
    adapter
        .execute_query("SELECT COUNT(*) AS c FROM users", &[])
        .await
        .data[0]["c"]
        .clone()
}

#[tokio::test]
async fn test_transaction_scopes_statements() {
    let adapter = setup_adapter().await;

    // A write between begin and rollback is undone
    adapter.begin_transaction().await.unwrap();
    let insert = adapter
        .execute_query("INSERT INTO users (name) VALUES ('Eve')", &[])
        .await;
    assert!(insert.success, "error: {:?}", insert.error);
    assert_eq!(count_users(&adapter).await, serde_json::json!(3));
    adapter.rollback().await.unwrap();
    assert_eq!(count_users(&adapter).await, serde_json::json!(2));

    // The same write between begin and commit is durable
    adapter.begin_transaction().await.unwrap();
    adapter
        .execute_query("INSERT INTO users (name) VALUES ('Eve')", &[])
        .await;
    adapter.commit().await.unwrap();
    assert_eq!(count_users(&adapter).await, serde_json::json!(3));
}

#[tokio::test]
async fn test_transaction_slot_state_rules() {
    let adapter = setup_adapter().await;

    // begin twice is an error
    adapter.begin_transaction().await.unwrap();
    assert!(adapter.begin_transaction().await.is_err());
    adapter.rollback().await.unwrap();

    // rollback with nothing open is a no-op
    adapter.rollback().await.unwrap();

    // commit with nothing open is an error
    assert!(adapter.commit().await.is_err());
}

#[tokio::test]
async fn test_batch_execute_rejected_inside_explicit_transaction() {
    let adapter = setup_adapter().await;
    adapter.begin_transaction().await.unwrap();

    let rows: Vec<BindParams> =
        vec![[("id".to_string(), BindValue::Int(50))].into_iter().collect()];
    let err = adapter
        .batch_execute("INSERT INTO orders (id, user_id, total) VALUES (:id, 1, 1.0)", &rows)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("transaction"));

    adapter.rollback().await.unwrap();
}

#[tokio::test]
async fn test_file_backed_database_persists_across_adapters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.db");
    let config = DatabaseConfig::sqlite(path.to_str().unwrap());

    // First adapter creates the file and writes a row
    let adapter = SqliteAdapter::connect(&config).await.unwrap();
    let created = adapter
        .execute_query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[])
        .await;
    assert!(created.success);
    adapter
        .execute_query(
            "INSERT INTO notes (body) VALUES (?)",
            &[BindValue::String("remember".to_string())],
        )
        .await;
    adapter.close().await;

    // A fresh adapter sees the persisted data and reflects the table
    let reopened = SqliteAdapter::connect(&config).await.unwrap();
    let schema = reopened.schema_info().await.unwrap();
    assert!(schema.has_table("notes"));

    let result = reopened
        .execute_query("SELECT body FROM notes", &[])
        .await;
    assert_eq!(result.row_count, 1);
    assert_eq!(result.data[0]["body"], serde_json::json!("remember"));
}

#[tokio::test]
async fn test_batch_execute_all_or_nothing() {
    let adapter = setup_adapter().await;

    let good: BindParams = [("id".to_string(), BindValue::Int(10))].into_iter().collect();
    let bad: BindParams = [("id".to_string(), BindValue::Int(1))].into_iter().collect();

    // Second row violates the primary key; the whole batch must roll back
    let err = adapter
        .batch_execute(
            "INSERT INTO orders (id, user_id, total) VALUES (:id, 1, 1.0)",
            &[good.clone(), bad],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("unique")
        || err.to_string().to_lowercase().contains("constraint"));

    let result = adapter
        .execute_query("SELECT COUNT(*) AS c FROM orders", &[])
        .await;
    assert_eq!(result.data[0]["c"], serde_json::json!(1));

    // A clean batch commits and reports total affected rows
    let other: BindParams = [("id".to_string(), BindValue::Int(11))].into_iter().collect();
    let affected = adapter
        .batch_execute(
            "INSERT INTO orders (id, user_id, total) VALUES (:id, 1, 1.0)",
            &[good, other],
        )
        .await
        .unwrap();
    assert_eq!(affected, 2);
}
