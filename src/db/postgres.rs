//! PostgreSQL dialect adapter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
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
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = 'public'
        AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            column_name,
            data_type,
            is_nullable,
            column_default,
            is_identity
        FROM information_schema.columns
        WHERE table_schema = 'public' AND table_name = $1
        ORDER BY ordinal_position
        "#;

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_name = $1
        AND tc.table_schema = 'public'
        AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY kcu.ordinal_position
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            tc.table_name AS constrained_table,
            kcu.column_name AS constrained_column,
            ccu.table_name AS referred_table,
            ccu.column_name AS referred_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        WHERE tc.table_schema = 'public'
        AND tc.constraint_type = 'FOREIGN KEY'
        "#;
}

/// PostgreSQL adapter backed by a connection pool.
pub struct PostgresAdapter {
    pool: PgPool,
    read_only: bool,
    query_timeout: Duration,
    max_rows: u32,
    include_sample_data: bool,
    sample_limit: u32,
    schema: OnceCell<Arc<SchemaInfo>>,
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PostgresAdapter {
    pub async fn connect(config: &DatabaseConfig) -> AgentResult<Self> {
        let url = config.connection_url();
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&url)
            .await
            .map_err(|e| {
                AgentError::connection(
                    format!("Failed to connect to PostgreSQL at {}: {}", config.host, e),
                    "Check host, port, credentials and that the server accepts connections",
                )
            })?;

        debug!(host = %config.host, database = %config.database, "Connected to PostgreSQL");
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
        let mut schema = SchemaInfo::new(DatabaseType::Postgres, self.read_only);

        let table_rows = sqlx::query(queries::LIST_TABLES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("postgresql", e.to_string()))?;

        for row in &table_rows {
            let table_name: String = row.get("table_name");
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
                table_name,
                TableSchemaInfo {
                    columns,
                    primary_key,
                    sample_data,
                },
            );
        }

        schema.foreign_keys = self.reflect_foreign_keys().await?;
        debug!(tables = schema.tables.len(), "Reflected PostgreSQL schema");
        Ok(schema)
    }

    async fn reflect_columns(&self, table_name: &str) -> AgentResult<Vec<ColumnInfo>> {
        let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("postgresql", e.to_string()))?;

        let pk_rows = sqlx::query(queries::PRIMARY_KEY_COLUMNS)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("postgresql", e.to_string()))?;
        let pk_columns: Vec<String> = pk_rows.iter().map(|r| r.get("column_name")).collect();

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let data_type: String = row.get("data_type");
                let nullable: String = row.get("is_nullable");
                let default: Option<String> = row.try_get("column_default").ok().flatten();
                let is_identity: String = row.try_get("is_identity").unwrap_or_default();
                let autoincrement = is_identity == "YES"
                    || default
                        .as_deref()
                        .map(|d| d.starts_with("nextval"))
                        .unwrap_or(false);

                ColumnInfo {
                    primary_key: pk_columns.contains(&name),
                    name,
                    data_type,
                    nullable: nullable == "YES",
                    default,
                    autoincrement,
                }
            })
            .collect())
    }

    async fn reflect_foreign_keys(&self) -> AgentResult<Vec<ForeignKeyInfo>> {
        let rows = sqlx::query(queries::FOREIGN_KEYS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("postgresql", e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyInfo {
                constrained_table: row.get("constrained_table"),
                constrained_columns: vec![row.get("constrained_column")],
                referred_table: row.get("referred_table"),
                referred_columns: vec![row.get("referred_column")],
            })
            .collect())
    }

    async fn fetch_sample_rows(
        &self,
        table_name: &str,
    ) -> Vec<serde_json::Map<String, serde_json::Value>> {
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
    // slot; otherwise on the pool.
    async fn fetch_rows(&self, sql: &str, params: &[BindValue]) -> AgentResult<Vec<PgRow>> {
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
impl DatabaseDialect for PostgresAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
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

    fn case_insensitive_match(&self, column: &str, placeholder: &str) -> String {
        format!("{} ILIKE {}", column, placeholder)
    }

    async fn execute_query(&self, sql: &str, params: &[BindValue]) -> QueryResult {
        let start = Instant::now();

        if is_row_returning(sql) {
            match self.fetch_rows(sql, params).await {
                Ok(rows) => {
                    if rows.len() > self.max_rows as usize {
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
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &'q BindValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Null => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::String(v) => query.bind(v.as_str()),
        BindValue::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}
