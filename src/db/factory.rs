//! Driver-name to adapter constructor registry.
//!
//! The built-in drivers cover the three sqlx backends. [`DialectFactory::register`]
//! is the extension point for additional backends; lookups are
//! case-insensitive.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::DatabaseConfig;
use crate::db::dialect::DatabaseDialect;
use crate::db::mysql::MySqlAdapter;
use crate::db::postgres::PostgresAdapter;
use crate::db::sqlite::SqliteAdapter;
use crate::db::{DEFAULT_MAX_ROWS, DEFAULT_SAMPLE_LIMIT};
use crate::error::{AgentError, AgentResult};

/// Behavior knobs applied to every adapter the factory builds.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub read_only: bool,
    pub max_rows: u32,
    pub include_sample_data: bool,
    pub sample_limit: u32,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            max_rows: DEFAULT_MAX_ROWS,
            include_sample_data: true,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

type Constructor = Arc<
    dyn Fn(DatabaseConfig, AdapterOptions) -> BoxFuture<'static, AgentResult<Arc<dyn DatabaseDialect>>>
        + Send
        + Sync,
>;

/// Registry of driver names to adapter constructors.
pub struct DialectFactory {
    constructors: HashMap<String, Constructor>,
}

impl DialectFactory {
    /// Factory with the built-in PostgreSQL, MySQL and SQLite constructors.
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };

        let postgres: Constructor = Arc::new(|config, options| {
            Box::pin(async move {
                let adapter = PostgresAdapter::connect(&config)
                    .await?
                    .with_read_only(options.read_only)
                    .with_max_rows(options.max_rows)
                    .with_sample_data(options.include_sample_data, options.sample_limit);
                Ok(Arc::new(adapter) as Arc<dyn DatabaseDialect>)
            })
        });
        factory.register("postgres", postgres.clone());
        factory.register("postgresql", postgres);

        factory.register(
            "mysql",
            Arc::new(|config, options| {
                Box::pin(async move {
                    let adapter = MySqlAdapter::connect(&config)
                        .await?
                        .with_read_only(options.read_only)
                        .with_max_rows(options.max_rows)
                        .with_sample_data(options.include_sample_data, options.sample_limit);
                    Ok(Arc::new(adapter) as Arc<dyn DatabaseDialect>)
                })
            }),
        );

        factory.register(
            "sqlite",
            Arc::new(|config, options| {
                Box::pin(async move {
                    let adapter = SqliteAdapter::connect(&config)
                        .await?
                        .with_read_only(options.read_only)
                        .with_max_rows(options.max_rows)
                        .with_sample_data(options.include_sample_data, options.sample_limit);
                    Ok(Arc::new(adapter) as Arc<dyn DatabaseDialect>)
                })
            }),
        );

        factory
    }

    /// Register a constructor under a driver name, replacing any existing one.
    pub fn register(&mut self, drivername: &str, constructor: Constructor) {
        self.constructors
            .insert(drivername.to_lowercase(), constructor);
    }

    /// Registered driver names, sorted.
    pub fn supported_drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a connected adapter for the config's driver.
    pub async fn create(
        &self,
        config: &DatabaseConfig,
        options: AdapterOptions,
    ) -> AgentResult<Arc<dyn DatabaseDialect>> {
        let key = config.drivername.to_lowercase();
        let constructor = self.constructors.get(&key).ok_or_else(|| {
            AgentError::config(format!(
                "No dialect registered for driver '{}'. Supported drivers: {}",
                config.drivername,
                self.supported_drivers().join(", ")
            ))
        })?;
        constructor(config.clone(), options).await
    }
}

impl Default for DialectFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_drivers_registered() {
        let factory = DialectFactory::new();
        let drivers = factory.supported_drivers();
        assert!(drivers.contains(&"postgres".to_string()));
        assert!(drivers.contains(&"postgresql".to_string()));
        assert!(drivers.contains(&"mysql".to_string()));
        assert!(drivers.contains(&"sqlite".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_driver_lists_supported() {
        let factory = DialectFactory::new();
        let mut config = DatabaseConfig::sqlite(":memory:");
        config.drivername = "oracle".to_string();
        let err = factory
            .create(&config, AdapterOptions::default())
            .await
            .err()
            .expect("unknown driver must be rejected");
        let msg = err.to_string();
        assert!(msg.contains("oracle"));
        assert!(msg.contains("sqlite"));
    }

    #[tokio::test]
    async fn test_lookup_case_insensitive() {
        let factory = DialectFactory::new();
        let mut config = DatabaseConfig::sqlite(":memory:");
        config.drivername = "SQLite".to_string();
        let adapter = factory
            .create(&config, AdapterOptions::default())
            .await
            .unwrap();
        assert_eq!(adapter.database_type(), crate::db::DatabaseType::SQLite);
    }
}
