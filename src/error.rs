//! Error types for the SQL agent.
//!
//! This module defines the error taxonomy using `thiserror`. Connection and
//! schema-reflection failures are construction-time faults and abort agent
//! initialization; the remaining four kinds (validation, generation, parameter
//! extraction, execution) are caught at the orchestrator's public entry point
//! and converted into failed [`QueryResult`](crate::models::QueryResult)s.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Schema reflection failed for database '{database}': {detail}")]
    SchemaReflection { database: String, detail: String },

    #[error("SQL validation failed: {message}")]
    SqlValidation { message: String },

    #[error("SQL generation failed: {detail}")]
    LlmGeneration { detail: String },

    #[error("Parameter extraction failed: {detail}")]
    ParameterExtraction { detail: String },

    #[error("Query execution failed: {message}")]
    QueryExecution {
        message: String,
        /// Backend SQLSTATE code when available, e.g. "42P01" for undefined table.
        sql_state: Option<String>,
    },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl AgentError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema reflection error.
    pub fn schema_reflection(database: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaReflection {
            database: database.into(),
            detail: detail.into(),
        }
    }

    /// Create a SQL validation error.
    pub fn sql_validation(message: impl Into<String>) -> Self {
        Self::SqlValidation {
            message: message.into(),
        }
    }

    /// Create an LLM generation error.
    pub fn llm_generation(detail: impl Into<String>) -> Self {
        Self::LlmGeneration {
            detail: detail.into(),
        }
    }

    /// Create a parameter extraction error.
    pub fn parameter_extraction(detail: impl Into<String>) -> Self {
        Self::ParameterExtraction {
            detail: detail.into(),
        }
    }

    /// Create a query execution error.
    pub fn query_execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::QueryExecution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for the four kinds the orchestrator converts into a failed
    /// QueryResult instead of propagating.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::SqlValidation { .. }
                | Self::LlmGeneration { .. }
                | Self::ParameterExtraction { .. }
                | Self::QueryExecution { .. }
        )
    }

    /// Human-readable message with the SQLSTATE code appended when present.
    /// Raw driver errors never reach callers; this is what a QueryResult carries.
    pub fn normalized_message(&self) -> String {
        match self {
            Self::QueryExecution {
                message,
                sql_state: Some(code),
            } => format!("{} (SQLSTATE: {})", message, code),
            other => other.to_string(),
        }
    }
}

/// Convert sqlx errors into normalized execution/connection errors.
impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AgentError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AgentError::query_execution(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => AgentError::connection(
                "Connection pool acquire timed out",
                "Check that the database server is reachable and not overloaded",
            ),
            sqlx::Error::PoolClosed => {
                AgentError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => AgentError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => AgentError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => AgentError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::RowNotFound => AgentError::query_execution("No rows returned", None),
            sqlx::Error::ColumnNotFound(col) => {
                AgentError::query_execution(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => AgentError::query_execution(
                format!("Failed to decode column {}: {}", index, source),
                None,
            ),
            sqlx::Error::Decode(source) => {
                AgentError::query_execution(format!("Decode error: {}", source), None)
            }
            other => AgentError::query_execution(format!("Database error: {}", other), None),
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::llm_generation(format!("provider request failed: {}", err))
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::connection("refused", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_user_facing_classification() {
        assert!(AgentError::sql_validation("two statements").is_user_facing());
        assert!(AgentError::llm_generation("no sql block").is_user_facing());
        assert!(AgentError::parameter_extraction("bad json").is_user_facing());
        assert!(AgentError::query_execution("syntax error", None).is_user_facing());
        assert!(!AgentError::connection("refused", "retry").is_user_facing());
        assert!(!AgentError::schema_reflection("mydb", "catalog gone").is_user_facing());
    }

    #[test]
    fn test_normalized_message_includes_sql_state() {
        let err = AgentError::query_execution("syntax error", Some("42601".to_string()));
        let msg = err.normalized_message();
        assert!(msg.contains("syntax error"));
        assert!(msg.contains("42601"));
    }

    #[test]
    fn test_normalized_message_without_sql_state() {
        let err = AgentError::query_execution("boom", None);
        assert!(!err.normalized_message().contains("SQLSTATE"));
    }
}
