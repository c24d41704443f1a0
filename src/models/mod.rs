//! Data models shared across the agent.

pub mod query;
pub mod schema;

pub use query::{BindParams, BindValue, QueryResult};
pub use schema::{ColumnInfo, ForeignKeyInfo, SchemaInfo, TableSchemaInfo};
