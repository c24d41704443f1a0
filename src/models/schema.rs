//! Schema reflection models.
//!
//! [`SchemaInfo`] is the cached snapshot of a database's structure: tables in a
//! deterministic order, column details, primary keys, foreign keys and optional
//! sample rows. It is built once per adapter and reused for every prompt.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::DatabaseType;

/// A single column as reported by the backend catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Backend type name, e.g. "integer", "varchar(255)", "TEXT".
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub primary_key: bool,
    pub autoincrement: bool,
}

/// Structure of one table: columns in ordinal order plus optional sample rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchemaInfo {
    pub columns: Vec<ColumnInfo>,
    pub primary_key: BTreeSet<String>,
    /// Representative rows with binary values hex-encoded and datetimes in
    /// ISO-8601, so the snapshot is always valid JSON.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_data: Vec<serde_json::Map<String, Value>>,
}

impl TableSchemaInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A foreign-key relationship between two tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub constrained_table: String,
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

/// Full reflected schema for one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Ordered map so schema text renders deterministically.
    pub tables: BTreeMap<String, TableSchemaInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub database_type: DatabaseType,
    pub read_only: bool,
}

impl SchemaInfo {
    pub fn new(database_type: DatabaseType, read_only: bool) -> Self {
        Self {
            tables: BTreeMap::new(),
            foreign_keys: Vec::new(),
            database_type,
            read_only,
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Foreign keys touching a given table, in either direction.
    pub fn foreign_keys_for(&self, table: &str) -> Vec<&ForeignKeyInfo> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.constrained_table == table || fk.referred_table == table)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> SchemaInfo {
        let mut schema = SchemaInfo::new(DatabaseType::SQLite, true);
        schema.tables.insert(
            "users".to_string(),
            TableSchemaInfo {
                columns: vec![ColumnInfo {
                    name: "id".to_string(),
                    data_type: "INTEGER".to_string(),
                    nullable: false,
                    default: None,
                    primary_key: true,
                    autoincrement: true,
                }],
                primary_key: BTreeSet::from(["id".to_string()]),
                sample_data: Vec::new(),
            },
        );
        schema.tables.insert("orders".to_string(), TableSchemaInfo::default());
        schema.foreign_keys.push(ForeignKeyInfo {
            constrained_table: "orders".to_string(),
            constrained_columns: vec!["user_id".to_string()],
            referred_table: "users".to_string(),
            referred_columns: vec!["id".to_string()],
        });
        schema
    }

    #[test]
    fn test_table_names_are_sorted() {
        let schema = sample_schema();
        assert_eq!(schema.table_names(), vec!["orders", "users"]);
    }

    #[test]
    fn test_foreign_keys_for_either_direction() {
        let schema = sample_schema();
        assert_eq!(schema.foreign_keys_for("users").len(), 1);
        assert_eq!(schema.foreign_keys_for("orders").len(), 1);
        assert!(schema.foreign_keys_for("products").is_empty());
    }

    #[test]
    fn test_column_lookup() {
        let schema = sample_schema();
        let users = &schema.tables["users"];
        assert!(users.column("id").unwrap().primary_key);
        assert!(users.column("missing").is_none());
    }
}
