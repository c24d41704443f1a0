//! SQLite dialect adapter.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::db::dialect::DatabaseDialect;
use crate::db::rows::RowToJson;
use crate::db::{DatabaseType, DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_SAMPLE_LIMIT};
use crate::error::{AgentError, AgentResult};
use crate::models::{
    BindParams, BindValue, ColumnInfo, ForeignKeyInfo, QueryResult, SchemaInfo, TableSchemaInfo,
};

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const TABLE_DDL: &str =
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?";
}

/// SQLite adapter backed by a single-connection pool.
pub struct SqliteAdapter {
    pool: SqlitePool,
    read_only: bool,
    query_timeout: Duration,
    max_rows: u32,
    include_sample_data: bool,
    sample_limit: u32,
    schema: OnceCell<Arc<SchemaInfo>>,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteAdapter {
    /// Connect to the database file (or ":memory:") named by the config.
    pub async fn connect(config: &DatabaseConfig) -> AgentResult<Self> {
        let url = config.connection_url();
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(AgentError::from)?
            .create_if_missing(true);

        // A single connection keeps in-memory databases alive and serializes
        // writers, which SQLite requires anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                AgentError::connection(
                    format!("Failed to open SQLite database '{}': {}", config.database, e),
                    "Check the database path and file permissions",
                )
            })?;

        debug!(database = %config.database, "Connected to SQLite");
        Ok(Self {
            pool,
            read_only: false,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            max_rows: DEFAULT_MAX_ROWS,
            include_sample_data: true,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            schema: OnceCell::new(),
            tx: Mutex::new(None),
        })
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn with_sample_data(mut self, include: bool, limit: u32) -> Self {
        self.include_sample_data = include;
        self.sample_limit = limit;
        self
    }

    async fn reflect(&self) -> AgentResult<SchemaInfo> {
        let mut schema = SchemaInfo::new(DatabaseType::SQLite, self.read_only);

        let table_rows = sqlx::query(queries::LIST_TABLES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("sqlite", e.to_string()))?;

        for row in &table_rows {
            let table_name: String = row.get("name");
            let columns = self.reflect_columns(&table_name).await?;
            let primary_key = columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect();

            let sample_data = if self.include_sample_data {
                self.fetch_sample_rows(&table_name).await
            } else {
                Vec::new()
            };

            schema.tables.insert(
                table_name.clone(),
                TableSchemaInfo {
                    columns,
                    primary_key,
                    sample_data,
                },
            );

            schema
                .foreign_keys
                .extend(self.reflect_foreign_keys(&table_name).await);
        }

        debug!(tables = schema.tables.len(), "Reflected SQLite schema");
        Ok(schema)
    }

    async fn reflect_columns(&self, table_name: &str) -> AgentResult<Vec<ColumnInfo>> {
        let pragma = format!(
            "PRAGMA table_info({})",
            self.escape_identifier(table_name)
        );
        let rows = sqlx::query(&pragma)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("sqlite", e.to_string()))?;

        let ddl: Option<String> = sqlx::query(queries::TABLE_DDL)
            .bind(table_name)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .and_then(|r| r.try_get("sql").ok());
        let has_autoincrement = ddl
            .map(|s| s.to_uppercase().contains("AUTOINCREMENT"))
            .unwrap_or(false);

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let data_type: String = row.get("type");
                let notnull: i32 = row.get("notnull");
                let default: Option<String> = row.try_get("dflt_value").ok().flatten();
                let pk: i32 = row.get("pk");
                let is_pk = pk > 0;
                // An INTEGER PRIMARY KEY aliases the rowid and auto-assigns
                let autoincrement = is_pk
                    && data_type.eq_ignore_ascii_case("integer")
                    && (has_autoincrement || pk == 1);

                ColumnInfo {
                    name,
                    data_type,
                    nullable: notnull == 0 && !is_pk,
                    default,
                    primary_key: is_pk,
                    autoincrement,
                }
            })
            .collect())
    }

    async fn reflect_foreign_keys(&self, table_name: &str) -> Vec<ForeignKeyInfo> {
        let pragma = format!(
            "PRAGMA foreign_key_list({})",
            self.escape_identifier(table_name)
        );
        let rows = sqlx::query(&pragma)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default();

        rows.iter()
            .map(|row| {
                let from: String = row.get("from");
                let referred_table: String = row.get("table");
                let to: String = row.get("to");
                ForeignKeyInfo {
                    constrained_table: table_name.to_string(),
                    constrained_columns: vec![from],
                    referred_table,
                    referred_columns: vec![to],
                }
            })
            .collect()
    }

    async fn fetch_sample_rows(&self, table_name: &str) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.escape_identifier(table_name),
            self.sample_limit
        );
        sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| r.to_json_map())
            .collect()
    }

    // Statements run inside the open transaction when one is held in the
    // slot; otherwise on the pool. With a single-connection pool the open
    // transaction owns the only connection, so bypassing it would deadlock.
    async fn fetch_rows(&self, sql: &str, params: &[BindValue]) -> AgentResult<Vec<SqliteRow>> {
        let fetch_limit = self.max_rows as usize + 1;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let mut slot = self.tx.lock().await;
        let fetched = match slot.as_mut() {
            Some(tx) => {
                let rows_future = query.fetch(&mut **tx).take(fetch_limit).collect::<Vec<_>>();
                timeout(self.query_timeout, rows_future).await
            }
            None => {
                let rows_future = query.fetch(&self.pool).take(fetch_limit).collect::<Vec<_>>();
                timeout(self.query_timeout, rows_future).await
            }
        };
        drop(slot);

        match fetched {
            Ok(results) => {
                let mut rows = Vec::with_capacity(results.len());
                for result in results {
                    rows.push(result.map_err(AgentError::from)?);
                }
                Ok(rows)
            }
            Err(_) => Err(AgentError::query_execution(
                format!(
                    "Query execution timed out after {}s",
                    self.query_timeout.as_secs()
                ),
                None,
            )),
        }
    }

    async fn execute_write(&self, sql: &str, params: &[BindValue]) -> AgentResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let mut slot = self.tx.lock().await;
        let executed = match slot.as_mut() {
            Some(tx) => timeout(self.query_timeout, query.execute(&mut **tx)).await,
            None => timeout(self.query_timeout, query.execute(&self.pool)).await,
        };
        drop(slot);

        match executed {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(AgentError::from(e)),
            Err(_) => Err(AgentError::query_execution(
                format!(
                    "Write operation timed out after {}s",
                    self.query_timeout.as_secs()
                ),
                None,
            )),
        }
    }
}

#[async_trait]
impl DatabaseDialect for SqliteAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    async fn schema_info(&self) -> AgentResult<Arc<SchemaInfo>> {
        self.schema
            .get_or_try_init(|| async { self.reflect().await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn execute_query(&self, sql: &str, params: &[BindValue]) -> QueryResult {
        let start = Instant::now();

        if is_row_returning(sql) {
            match self.fetch_rows(sql, params).await {
                Ok(rows) => {
                    let truncated = rows.len() > self.max_rows as usize;
                    if truncated {
                        warn!(limit = self.max_rows, "Query result truncated");
                    }
                    let columns = rows
                        .first()
                        .map(|r| r.column_names())
                        .unwrap_or_default();
                    let data = rows
                        .iter()
                        .take(self.max_rows as usize)
                        .map(|r| r.to_json_map())
                        .collect();
                    QueryResult::success(
                        data,
                        columns,
                        sql.to_string(),
                        start.elapsed().as_millis() as u64,
                    )
                }
                Err(e) => QueryResult::failure(e.normalized_message(), sql.to_string()),
            }
        } else {
            match self.execute_write(sql, params).await {
                Ok(affected) => QueryResult::affected(
                    affected,
                    sql.to_string(),
                    start.elapsed().as_millis() as u64,
                ),
                Err(e) => QueryResult::failure(e.normalized_message(), sql.to_string()),
            }
        }
    }

    async fn begin_transaction(&self) -> AgentResult<()> {
        let mut slot = self.tx.lock().await;
        if slot.is_some() {
            return Err(AgentError::query_execution(
                "A transaction is already open",
                None,
            ));
        }
        *slot = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&self) -> AgentResult<()> {
        match self.tx.lock().await.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => Err(AgentError::query_execution("No open transaction to commit", None)),
        }
    }

    async fn rollback(&self) -> AgentResult<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn batch_execute(&self, sql: &str, rows: &[BindParams]) -> AgentResult<u64> {
        // The batch needs its own transaction, and the single connection is
        // unavailable while an explicit one is open.
        if self.tx.lock().await.is_some() {
            return Err(AgentError::query_execution(
                "Cannot batch execute while an explicit transaction is open",
                None,
            ));
        }
        let mut tx = self.pool.begin().await?;
        let mut total = 0u64;
        for row in rows {
            let (bound_sql, values) = self.bind_parameters(sql, row)?;
            let mut query = sqlx::query(&bound_sql);
            for value in &values {
                query = bind_value(query, value);
            }
            match query.execute(&mut *tx).await {
                Ok(r) => total += r.rows_affected(),
                Err(e) => {
                    tx.rollback().await?;
                    return Err(AgentError::from(e));
                }
            }
        }
        tx.commit().await?;
        Ok(total)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_row_returning(sql: &str) -> bool {
    let head = sql.trim_start().to_lowercase();
    head.starts_with("select") || head.starts_with("with")
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q BindValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        BindValue::Null => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::String(v) => query.bind(v.as_str()),
        // SQLite has no native JSON type, store as string
        BindValue::Json(v) => query.bind(v.to_string()),
    }
}
