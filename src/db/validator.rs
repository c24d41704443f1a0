//! SQL statement validation and sanitization.
//!
//! Generated SQL passes through here exactly once before execution. The
//! statement is parsed with the backend's sqlparser dialect, so multi-statement
//! payloads and write operations cannot slip through via formatting tricks.

use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::db::DatabaseType;
use crate::error::{AgentError, AgentResult};

fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::Postgres => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySql => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Validate a generated statement and return its sanitized text.
///
/// Rules:
/// - the input must parse as exactly one statement;
/// - read-only connections accept SELECT only;
/// - read-write connections accept SELECT, INSERT, UPDATE and DELETE;
/// - everything else (DDL, transaction control, administrative commands) is
///   rejected.
///
/// The returned text is the input trimmed, with a trailing semicolon removed.
pub fn validate_statement(
    sql: &str,
    db_type: DatabaseType,
    read_only: bool,
) -> AgentResult<String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(AgentError::sql_validation("Empty SQL statement"));
    }

    let dialect = dialect_for(db_type);
    let statements = Parser::parse_sql(dialect.as_ref(), trimmed)
        .map_err(|e| AgentError::sql_validation(format!("Failed to parse SQL: {}", e)))?;

    match statements.len() {
        0 => return Err(AgentError::sql_validation("Empty SQL statement")),
        1 => {}
        n => {
            return Err(AgentError::sql_validation(format!(
                "Expected a single SQL statement, found {}. \
                 Multi-statement input is not allowed.",
                n
            )));
        }
    }

    check_allowed(&statements[0], read_only)?;

    let sanitized = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    Ok(sanitized.to_string())
}

fn check_allowed(stmt: &Statement, read_only: bool) -> AgentResult<()> {
    let operation = match stmt {
        Statement::Query(_) => return Ok(()),
        Statement::Insert(_) => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete(_) => "DELETE",
        other => {
            return Err(AgentError::sql_validation(format!(
                "Statement type not allowed: {}. \
                 Only SELECT, INSERT, UPDATE and DELETE are supported.",
                statement_name(other)
            )));
        }
    };

    if read_only {
        return Err(AgentError::sql_validation(format!(
            "{} not allowed on a read-only connection. Only SELECT statements are permitted.",
            operation
        )));
    }
    Ok(())
}

/// Short display name for a rejected statement kind.
fn statement_name(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex(_) => "CREATE INDEX",
        Statement::CreateDatabase { .. } => "CREATE DATABASE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::StartTransaction { .. } => "BEGIN",
        Statement::Commit { .. } => "COMMIT",
        Statement::Rollback { .. } => "ROLLBACK",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Set(_) => "SET",
        Statement::Call { .. } => "CALL",
        Statement::Execute { .. } => "EXECUTE",
        Statement::Merge { .. } => "MERGE",
        Statement::Copy { .. } => "COPY",
        Statement::Pragma { .. } => "PRAGMA",
        Statement::AttachDatabase { .. } => "ATTACH",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: DatabaseType = DatabaseType::Postgres;

    #[test]
    fn test_select_allowed_read_only() {
        let out = validate_statement("SELECT * FROM users;", DB, true).unwrap();
        assert_eq!(out, "SELECT * FROM users");
    }

    #[test]
    fn test_select_with_named_placeholder() {
        let sql = "SELECT * FROM users WHERE name = :name";
        assert!(validate_statement(sql, DB, true).is_ok());
    }

    #[test]
    fn test_insert_rejected_read_only_mentions_select() {
        let err = validate_statement("INSERT INTO users (id) VALUES (1)", DB, true).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("INSERT"));
        assert!(msg.contains("SELECT"));
    }

    #[test]
    fn test_insert_allowed_read_write() {
        assert!(validate_statement("INSERT INTO users (id) VALUES (1)", DB, false).is_ok());
    }

    #[test]
    fn test_update_and_delete_read_write() {
        assert!(validate_statement("UPDATE users SET active = false", DB, false).is_ok());
        assert!(validate_statement("DELETE FROM users WHERE id = 1", DB, false).is_ok());
    }

    #[test]
    fn test_ddl_rejected_even_read_write() {
        let err = validate_statement("DROP TABLE users", DB, false).unwrap_err();
        assert!(err.to_string().contains("DROP"));
        assert!(validate_statement("CREATE TABLE t (id INT)", DB, false).is_err());
        assert!(validate_statement("TRUNCATE TABLE users", DB, false).is_err());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = validate_statement("SELECT 1; SELECT 2", DB, true).unwrap_err();
        assert!(err.to_string().contains("single"));
    }

    #[test]
    fn test_piggybacked_write_rejected() {
        let sql = "SELECT * FROM users; DROP TABLE users";
        assert!(validate_statement(sql, DB, true).is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(validate_statement("   ", DB, true).is_err());
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(validate_statement("SELECT FROM WHERE", DB, true).is_err());
    }

    #[test]
    fn test_insert_select_not_allowed_read_only() {
        let sql = "INSERT INTO archive SELECT * FROM users";
        assert!(validate_statement(sql, DB, true).is_err());
    }

    #[test]
    fn test_transaction_control_rejected() {
        assert!(validate_statement("COMMIT", DB, false).is_err());
        assert!(validate_statement("BEGIN", DB, false).is_err());
    }

    #[test]
    fn test_trailing_semicolon_stripped() {
        let out = validate_statement("  SELECT 1;  ", DB, true).unwrap();
        assert_eq!(out, "SELECT 1");
    }

    #[test]
    fn test_sqlite_dialect_accepts_sqlite_sql() {
        let sql = "SELECT name FROM sqlite_master WHERE type = 'table'";
        assert!(validate_statement(sql, DatabaseType::SQLite, true).is_ok());
    }
}
