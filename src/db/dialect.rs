//! The dialect adapter trait.
//!
//! Every backend adapter implements [`DatabaseDialect`]. Validation, binding,
//! pagination and identifier escaping have default implementations shared by
//! all backends; reflection, execution and transaction control are
//! backend-specific.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{binder, validator, DatabaseType};
use crate::error::AgentResult;
use crate::models::{BindParams, BindValue, ForeignKeyInfo, QueryResult, SchemaInfo};

#[async_trait]
pub trait DatabaseDialect: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    /// Whether this connection refuses write statements.
    fn read_only(&self) -> bool;

    /// Reflected schema snapshot. Reflection runs on the first call only; the
    /// snapshot is cached for the adapter's lifetime and later calls return
    /// the same `Arc` without touching the catalog.
    async fn schema_info(&self) -> AgentResult<Arc<SchemaInfo>>;

    /// Foreign keys from the cached schema snapshot.
    async fn foreign_keys(&self) -> AgentResult<Vec<ForeignKeyInfo>> {
        Ok(self.schema_info().await?.foreign_keys.clone())
    }

    /// Parse and check a generated statement; returns the sanitized text.
    fn validate_and_sanitize_sql(&self, sql: &str) -> AgentResult<String> {
        validator::validate_statement(sql, self.database_type(), self.read_only())
    }

    /// Rewrite `:name` placeholders into the backend's positional form.
    fn bind_parameters(
        &self,
        sql: &str,
        params: &BindParams,
    ) -> AgentResult<(String, Vec<BindValue>)> {
        binder::bind_named(sql, params, self.database_type())
    }

    /// Pagination clause for generated queries.
    fn pagination_syntax(&self, limit: u64, offset: Option<u64>) -> String {
        match offset {
            Some(o) => format!("LIMIT {} OFFSET {}", limit, o),
            None => format!("LIMIT {}", limit),
        }
    }

    /// Case-insensitive text match expression for prompt guidance.
    fn case_insensitive_match(&self, column: &str, placeholder: &str) -> String {
        format!("{} LIKE {}", column, placeholder)
    }

    /// Quote an identifier, doubling embedded quote characters.
    fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Execute a bound statement. Failures are reported inside the returned
    /// [`QueryResult`], never as an `Err`.
    async fn execute_query(&self, sql: &str, params: &[BindValue]) -> QueryResult;

    /// Open an explicit transaction on a dedicated connection. While it is
    /// open, `execute_query` routes statements through it.
    async fn begin_transaction(&self) -> AgentResult<()>;

    /// Commit the open transaction, making its statements durable. Errors if
    /// none is open.
    async fn commit(&self) -> AgentResult<()>;

    /// Roll back the open transaction, discarding its statements. A no-op
    /// when none is open.
    async fn rollback(&self) -> AgentResult<()>;

    /// Execute one statement per parameter set inside a single transaction.
    /// All-or-nothing: any failure rolls the whole batch back. Returns total
    /// rows affected.
    async fn batch_execute(&self, sql: &str, rows: &[BindParams]) -> AgentResult<u64>;

    /// Dispose the connection pool.
    async fn close(&self);
}
