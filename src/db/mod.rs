//! Database layer: dialect adapters, SQL validation and parameter binding.
//!
//! Each supported backend (PostgreSQL, MySQL, SQLite) lives in its own
//! submodule and implements the [`DatabaseDialect`] trait. The submodules are
//! intentionally parallel in structure so differences between backends stay
//! obvious. Cross-backend logic (statement validation, named-parameter
//! binding, row decoding) is factored into `validator`, `binder` and `rows`.

pub mod binder;
pub mod dialect;
pub mod factory;
pub mod mysql;
pub mod postgres;
pub mod rows;
pub mod sqlite;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use dialect::DatabaseDialect;
pub use factory::{AdapterOptions, DialectFactory};

/// Default timeout applied to every query execution.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default cap on rows fetched by a generated query.
pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// Default number of sample rows captured per table during reflection.
pub const DEFAULT_SAMPLE_LIMIT: u32 = 3;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgres,
    MySql,
    SQLite,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Postgres => write!(f, "postgresql"),
            DatabaseType::MySql => write!(f, "mysql"),
            DatabaseType::SQLite => write!(f, "sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_display() {
        assert_eq!(DatabaseType::Postgres.to_string(), "postgresql");
        assert_eq!(DatabaseType::MySql.to_string(), "mysql");
        assert_eq!(DatabaseType::SQLite.to_string(), "sqlite");
    }

    #[test]
    fn test_database_type_serde() {
        assert_eq!(
            serde_json::to_string(&DatabaseType::SQLite).unwrap(),
            "\"sqlite\""
        );
    }
}
