//! SQL Agent Library
//!
//! Translates natural-language requests into parameterized SQL, executes them
//! against a relational database (SQLite, PostgreSQL, MySQL) and returns
//! normalized tabular results.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;

pub use agent::SqlAgent;
pub use config::{DatabaseConfig, LlmConfig};
pub use error::{AgentError, AgentResult};
pub use models::QueryResult;
