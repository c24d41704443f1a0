//! MySQL dialect adapter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use sqlx::mysql::{MySqlArguments, MySqlPoolOptions, MySqlRow};
use sqlx::{MySql, MySqlPool, Row, Transaction};
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
        SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#;

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
            CONVERT(EXTRA USING utf8) AS EXTRA
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        ORDER BY ORDINAL_POSITION
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(REFERENCED_TABLE_NAME USING utf8) AS REFERENCED_TABLE_NAME,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS REFERENCED_COLUMN_NAME
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE()
        AND REFERENCED_TABLE_NAME IS NOT NULL
        "#;
}

/// MySQL adapter backed by a connection pool.
pub struct MySqlAdapter {
    pool: MySqlPool,
    read_only: bool,
    query_timeout: Duration,
    max_rows: u32,
    include_sample_data: bool,
    sample_limit: u32,
    schema: OnceCell<Arc<SchemaInfo>>,
    tx: Mutex<Option<Transaction<'static, MySql>>>,
}

impl MySqlAdapter {
    pub async fn connect(config: &DatabaseConfig) -> AgentResult<Self> {
        let url = config.connection_url();
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&url)
            .await
            .map_err(|e| {
                AgentError::connection(
                    format!("Failed to connect to MySQL at {}: {}", config.host, e),
                    "Check host, port, credentials and that the server accepts connections",
                )
            })?;

        debug!(host = %config.host, database = %config.database, "Connected to MySQL");
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
        let mut schema = SchemaInfo::new(DatabaseType::MySql, self.read_only);

        let table_rows = sqlx::query(queries::LIST_TABLES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("mysql", e.to_string()))?;

        for row in &table_rows {
            let table_name = get_string(row, "TABLE_NAME");
            if table_name.is_empty() {
                continue;
            }
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
        debug!(tables = schema.tables.len(), "Reflected MySQL schema");
        Ok(schema)
    }

    async fn reflect_columns(&self, table_name: &str) -> AgentResult<Vec<ColumnInfo>> {
        let rows = sqlx::query(queries::DESCRIBE_COLUMNS)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("mysql", e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "COLUMN_NAME");
                let data_type = get_string(row, "COLUMN_TYPE");
                let nullable = get_string(row, "IS_NULLABLE");
                let default = get_optional_string(row, "COLUMN_DEFAULT");
                let column_key = get_string(row, "COLUMN_KEY");
                let extra = get_string(row, "EXTRA");

                ColumnInfo {
                    name,
                    data_type,
                    nullable: nullable == "YES",
                    default,
                    primary_key: column_key == "PRI",
                    autoincrement: extra.contains("auto_increment"),
                }
            })
            .collect())
    }

    async fn reflect_foreign_keys(&self) -> AgentResult<Vec<ForeignKeyInfo>> {
        let rows = sqlx::query(queries::FOREIGN_KEYS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AgentError::schema_reflection("mysql", e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyInfo {
                constrained_table: get_string(row, "TABLE_NAME"),
                constrained_columns: vec![get_string(row, "COLUMN_NAME")],
                referred_table: get_string(row, "REFERENCED_TABLE_NAME"),
                referred_columns: vec![get_string(row, "REFERENCED_COLUMN_NAME")],
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
    async fn fetch_rows(&self, sql: &str, params: &[BindValue]) -> AgentResult<Vec<MySqlRow>> {
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
impl DatabaseDialect for MySqlAdapter {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySql
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
        format!("LOWER({}) LIKE LOWER({})", column, placeholder)
    }

    fn escape_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
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

/// MySQL may return VARBINARY instead of VARCHAR depending on charset settings.
fn get_string(row: &MySqlRow, column: &str) -> String {
    row.try_get::<String, _>(column)
        .ok()
        .or_else(|| {
            row.try_get::<Vec<u8>, _>(column)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
        .unwrap_or_default()
}

fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q BindValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        BindValue::Null => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::String(v) => query.bind(v.as_str()),
        BindValue::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}
