//! Query orchestrator.
//!
//! [`SqlAgent`] drives the full pipeline for a natural-language request:
//! schema fetch, relevant-table inference, SQL generation, validation,
//! parameter extraction, binding and execution. The public entry point
//! [`SqlAgent::process_natural_language_query`] never propagates an error;
//! failures come back as a [`QueryResult`] carrying the normalized message and
//! the original request text.

pub mod extract;
pub mod prompt;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{DatabaseConfig, LlmConfig};
use crate::db::{binder, AdapterOptions, DatabaseDialect, DialectFactory};
use crate::error::AgentResult;
use crate::llm::{create_provider, LlmProvider};
use crate::models::{BindParams, BindValue, QueryResult, SchemaInfo};

pub struct SqlAgent {
    dialect: Arc<dyn DatabaseDialect>,
    provider: Arc<dyn LlmProvider>,
}

impl SqlAgent {
    /// Connect with the built-in dialect factory and provider set, and
    /// pre-warm the schema cache. Fails on connection or reflection errors.
    pub async fn connect(
        db_config: &DatabaseConfig,
        llm_config: &LlmConfig,
    ) -> AgentResult<Self> {
        Self::connect_with(
            &DialectFactory::new(),
            db_config,
            AdapterOptions::default(),
            llm_config,
        )
        .await
    }

    /// Connect through a caller-supplied factory, for registered extra
    /// backends or non-default adapter options.
    pub async fn connect_with(
        factory: &DialectFactory,
        db_config: &DatabaseConfig,
        options: AdapterOptions,
        llm_config: &LlmConfig,
    ) -> AgentResult<Self> {
        let dialect = factory.create(db_config, options).await?;
        let provider = create_provider(llm_config)?;
        Self::new(dialect, provider).await
    }

    /// Assemble an agent from parts and pre-warm the schema cache.
    pub async fn new(
        dialect: Arc<dyn DatabaseDialect>,
        provider: Arc<dyn LlmProvider>,
    ) -> AgentResult<Self> {
        let schema = dialect.schema_info().await?;
        info!(
            database = %schema.database_type,
            tables = schema.tables.len(),
            provider = provider.name(),
            "Agent ready"
        );
        Ok(Self { dialect, provider })
    }

    /// The cached schema snapshot.
    pub async fn schema_info(&self) -> AgentResult<Arc<SchemaInfo>> {
        self.dialect.schema_info().await
    }

    /// The underlying dialect adapter.
    pub fn dialect(&self) -> &Arc<dyn DatabaseDialect> {
        &self.dialect
    }

    /// Dispose the database connection pool.
    pub async fn close(&self) {
        self.dialect.close().await;
    }

    /// Translate and execute a natural-language request.
    ///
    /// Validation, generation, parameter and execution failures are converted
    /// into a failed [`QueryResult`] whose `query` field holds the original
    /// request; this method never returns an error to the caller.
    pub async fn process_natural_language_query(&self, request: &str) -> QueryResult {
        match self.run_pipeline(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Query pipeline failed");
                QueryResult::failure(e.normalized_message(), request.to_string())
            }
        }
    }

    async fn run_pipeline(&self, request: &str) -> AgentResult<QueryResult> {
        let schema = self.dialect.schema_info().await?;

        let tables = self.infer_relevant_tables(request, &schema).await;
        debug!(?tables, "Relevant tables");

        let generation_prompt =
            prompt::sql_generation_prompt(request, &schema, &tables, self.dialect.as_ref());
        let response = self.provider.generate_sql(&generation_prompt).await?;
        let raw_sql = extract::extract_sql(&response)?;
        debug!(sql = %raw_sql, "Generated SQL");

        let sql = self.dialect.validate_and_sanitize_sql(&raw_sql)?;

        let placeholder_names = binder::named_placeholders(&sql);
        let params = if placeholder_names.is_empty() {
            BindParams::new()
        } else {
            self.extract_parameters(request, &sql, &placeholder_names)
                .await
        };

        let (bound_sql, values) = self.dialect.bind_parameters(&sql, &params)?;
        Ok(self.dialect.execute_query(&bound_sql, &values).await)
    }

    /// Ask the provider which tables the request needs, then validate the
    /// answer against the schema and expand one foreign-key hop in both
    /// directions. Any failure along the way falls back to keyword matching.
    async fn infer_relevant_tables(&self, request: &str, schema: &SchemaInfo) -> Vec<String> {
        let inference_prompt = prompt::table_inference_prompt(request, schema);

        let inferred = match self.provider.generate_sql(&inference_prompt).await {
            Ok(response) => extract::extract_json(&response)
                .and_then(|json| serde_json::from_str::<Vec<String>>(&json).ok()),
            Err(e) => {
                warn!(error = %e, "Table inference call failed, using keyword fallback");
                None
            }
        };

        let validated = inferred
            .map(|names| canonical_table_names(&names, schema))
            .unwrap_or_default();

        let tables = if validated.is_empty() {
            keyword_fallback(request, schema)
        } else {
            validated
        };

        expand_foreign_keys(tables, schema)
    }

    /// Second LLM round-trip: extract a value per named placeholder. Soft
    /// failure: unusable answers degrade to an empty map and binding reports
    /// the missing names.
    async fn extract_parameters(
        &self,
        request: &str,
        sql: &str,
        names: &[String],
    ) -> BindParams {
        let extraction_prompt = prompt::parameter_extraction_prompt(request, sql, names);

        let response = match self.provider.generate_sql(&extraction_prompt).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Parameter extraction call failed");
                return BindParams::new();
            }
        };

        let parsed = extract::extract_json(&response)
            .and_then(|json| {
                serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&json).ok()
            });

        match parsed {
            Some(map) => map
                .into_iter()
                .map(|(k, v)| (k, BindValue::from_json(v)))
                .collect(),
            None => {
                warn!("Parameter extraction response was not a JSON object");
                BindParams::new()
            }
        }
    }
}

/// Map inferred names onto actual schema tables, case-insensitively, dropping
/// names the schema does not have.
fn canonical_table_names(names: &[String], schema: &SchemaInfo) -> Vec<String> {
    let mut out = Vec::new();
    for name in names {
        let canonical = schema
            .tables
            .keys()
            .find(|t| t.eq_ignore_ascii_case(name));
        if let Some(t) = canonical {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
    }
    out
}

/// Tables whose names, column names, or their singular forms appear in the
/// request text. Falls back to every table when nothing matches.
fn keyword_fallback(request: &str, schema: &SchemaInfo) -> Vec<String> {
    let lower = request.to_lowercase();
    let mentioned = |word: &str| {
        let w = word.to_lowercase();
        lower.contains(&w) || lower.contains(w.strip_suffix('s').unwrap_or(&w))
    };

    let mut tables: Vec<String> = schema
        .tables
        .iter()
        .filter(|(name, table)| {
            mentioned(name.as_str()) || table.columns.iter().any(|c| mentioned(&c.name))
        })
        .map(|(name, _)| name.clone())
        .collect();

    if tables.is_empty() {
        tables = schema.tables.keys().cloned().collect();
    }
    tables
}

/// Add every table one foreign-key hop away from the given set, in either
/// direction.
fn expand_foreign_keys(tables: Vec<String>, schema: &SchemaInfo) -> Vec<String> {
    let mut expanded = tables.clone();
    for table in &tables {
        for fk in &schema.foreign_keys {
            if fk.constrained_table == *table
                && schema.has_table(&fk.referred_table)
                && !expanded.contains(&fk.referred_table)
            {
                expanded.push(fk.referred_table.clone());
            }
            if fk.referred_table == *table
                && schema.has_table(&fk.constrained_table)
                && !expanded.contains(&fk.constrained_table)
            {
                expanded.push(fk.constrained_table.clone());
            }
        }
    }
    expanded.sort();
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseType;
    use crate::models::{ColumnInfo, ForeignKeyInfo, TableSchemaInfo};

    fn schema_with(tables: &[&str], fks: &[(&str, &str)]) -> SchemaInfo {
        let mut schema = SchemaInfo::new(DatabaseType::SQLite, true);
        for t in tables {
            schema.tables.insert(
                t.to_string(),
                TableSchemaInfo {
                    columns: vec![ColumnInfo {
                        name: "id".to_string(),
                        data_type: "INTEGER".to_string(),
                        nullable: false,
                        default: None,
                        primary_key: true,
                        autoincrement: true,
                    }],
                    primary_key: std::iter::once("id".to_string()).collect(),
                    sample_data: Vec::new(),
                },
            );
        }
        for (from, to) in fks {
            schema.foreign_keys.push(ForeignKeyInfo {
                constrained_table: from.to_string(),
                constrained_columns: vec!["ref_id".to_string()],
                referred_table: to.to_string(),
                referred_columns: vec!["id".to_string()],
            });
        }
        schema
    }

    #[test]
    fn test_canonical_table_names_case_insensitive() {
        let schema = schema_with(&["users", "orders"], &[]);
        let names = vec!["Users".to_string(), "ORDERS".to_string(), "ghost".to_string()];
        assert_eq!(canonical_table_names(&names, &schema), vec!["users", "orders"]);
    }

    #[test]
    fn test_keyword_fallback_matches_singular() {
        let schema = schema_with(&["users", "orders", "products"], &[]);
        let tables = keyword_fallback("show me every user", &schema);
        assert_eq!(tables, vec!["users"]);
    }

    #[test]
    fn test_keyword_fallback_matches_column_names() {
        let mut schema = schema_with(&["users", "orders"], &[]);
        schema
            .tables
            .get_mut("orders")
            .unwrap()
            .columns
            .push(ColumnInfo {
                name: "total".to_string(),
                data_type: "REAL".to_string(),
                nullable: true,
                default: None,
                primary_key: false,
                autoincrement: false,
            });
        let tables = keyword_fallback("what is the highest total", &schema);
        assert_eq!(tables, vec!["orders"]);
    }

    #[test]
    fn test_keyword_fallback_all_tables_when_no_match() {
        let schema = schema_with(&["users", "orders"], &[]);
        let tables = keyword_fallback("what happened yesterday", &schema);
        assert_eq!(tables, vec!["orders", "users"]);
    }

    #[test]
    fn test_fk_expansion_both_directions() {
        let schema = schema_with(
            &["users", "orders", "items"],
            &[("orders", "users"), ("items", "orders")],
        );
        // users pulls in orders (referencing side)
        let expanded = expand_foreign_keys(vec!["users".to_string()], &schema);
        assert_eq!(expanded, vec!["orders", "users"]);
        // orders pulls in both neighbors
        let expanded = expand_foreign_keys(vec!["orders".to_string()], &schema);
        assert_eq!(expanded, vec!["items", "orders", "users"]);
    }

    #[test]
    fn test_fk_expansion_is_one_hop() {
        let schema = schema_with(
            &["a", "b", "c"],
            &[("b", "a"), ("c", "b")],
        );
        let expanded = expand_foreign_keys(vec!["a".to_string()], &schema);
        // c is two hops from a and stays out
        assert_eq!(expanded, vec!["a", "b"]);
    }
}
