//! Prompt construction.
//!
//! Everything here renders deterministic text from the reflected schema, so
//! prompts are stable across runs and easy to assert on in tests.

use crate::db::DatabaseDialect;
use crate::models::SchemaInfo;

/// Render the schema as prompt text, optionally restricted to a table subset.
///
/// Tables render in map order (alphabetical); each lists its columns with type
/// and constraint markers, followed by foreign keys and up to the captured
/// sample rows.
pub fn schema_text(schema: &SchemaInfo, tables: Option<&[String]>) -> String {
    let mut out = String::new();

    for (name, table) in &schema.tables {
        if let Some(subset) = tables {
            if !subset.iter().any(|t| t == name) {
                continue;
            }
        }

        out.push_str(&format!("Table: {}\n", name));
        for col in &table.columns {
            let mut markers = Vec::new();
            if col.primary_key {
                markers.push("primary key".to_string());
            }
            if col.autoincrement {
                markers.push("autoincrement".to_string());
            }
            if !col.nullable {
                markers.push("not null".to_string());
            }
            if let Some(default) = &col.default {
                markers.push(format!("default {}", default));
            }
            let suffix = if markers.is_empty() {
                String::new()
            } else {
                format!(", {}", markers.join(", "))
            };
            out.push_str(&format!("  - {} ({}{})\n", col.name, col.data_type, suffix));
        }

        let fks = schema
            .foreign_keys
            .iter()
            .filter(|fk| fk.constrained_table == *name)
            .collect::<Vec<_>>();
        for fk in fks {
            out.push_str(&format!(
                "  FK: {}.{} -> {}.{}\n",
                fk.constrained_table,
                fk.constrained_columns.join(","),
                fk.referred_table,
                fk.referred_columns.join(",")
            ));
        }

        if !table.sample_data.is_empty() {
            out.push_str("  Sample rows:\n");
            for row in &table.sample_data {
                out.push_str(&format!(
                    "    {}\n",
                    serde_json::to_string(row).unwrap_or_default()
                ));
            }
        }
        out.push('\n');
    }
    out
}

/// Prompt asking which tables a request needs.
pub fn table_inference_prompt(request: &str, schema: &SchemaInfo) -> String {
    let mut tables = String::new();
    for (name, table) in &schema.tables {
        tables.push_str(&format!(
            "- {}: {}\n",
            name,
            table.column_names().join(", ")
        ));
    }

    format!(
        "Given this database with tables:\n{tables}\n\
         Which tables are needed to answer the following request?\n\
         Request: {request}\n\n\
         Respond with only a JSON array of table names inside a fenced block, \
         for example:\n```json\n[\"table_a\", \"table_b\"]\n```"
    )
}

/// Prompt asking for a single SQL statement answering the request.
pub fn sql_generation_prompt(
    request: &str,
    schema: &SchemaInfo,
    tables: &[String],
    dialect: &dyn DatabaseDialect,
) -> String {
    let schema_section = schema_text(schema, Some(tables));
    let examples = example_queries(schema, tables, dialect);
    let examples_section = if examples.is_empty() {
        String::new()
    } else {
        format!("Example queries for this schema:\n{}\n", examples.join("\n"))
    };
    let write_rule = if schema.read_only {
        "Only SELECT statements are allowed."
    } else {
        "Only SELECT, INSERT, UPDATE and DELETE statements are allowed."
    };

    format!(
        "You are writing {db_type} SQL.\n\n\
         Database schema:\n{schema_section}\
         {examples_section}\
         Rules:\n\
         - Produce exactly one statement. {write_rule}\n\
         - Use named parameters like :name for every literal value taken from the request.\n\
         - For case-insensitive text matching use: {ci_example}\n\
         - For pagination use: {pagination}\n\n\
         Request: {request}\n\n\
         Respond with only the SQL inside a fenced block:\n```sql\n...\n```",
        db_type = schema.database_type,
        ci_example = dialect.case_insensitive_match("column_name", ":value"),
        pagination = dialect.pagination_syntax(10, Some(0)),
    )
}

/// Prompt asking for values for the statement's named parameters.
pub fn parameter_extraction_prompt(request: &str, sql: &str, names: &[String]) -> String {
    format!(
        "This SQL statement answers the request below.\n\n\
         Request: {request}\n\nSQL:\n{sql}\n\n\
         Extract a value for each named parameter: {names}.\n\
         Respond with only a JSON object inside a fenced block, for example:\n\
         ```json\n{{\"name\": \"value\"}}\n```",
        names = names.join(", "),
    )
}

/// Up to three representative queries derived from the schema: a plain
/// paginated select, a case-insensitive text filter, and a foreign-key join.
pub fn example_queries(
    schema: &SchemaInfo,
    tables: &[String],
    dialect: &dyn DatabaseDialect,
) -> Vec<String> {
    let mut examples = Vec::new();

    let Some(first) = tables.iter().find(|t| schema.has_table(t)) else {
        return examples;
    };
    examples.push(format!(
        "SELECT * FROM {} {};",
        first,
        dialect.pagination_syntax(10, None)
    ));

    if let Some(table) = schema.tables.get(first) {
        if let Some(text_col) = table.columns.iter().find(|c| {
            let t = c.data_type.to_lowercase();
            t.contains("char") || t.contains("text")
        }) {
            examples.push(format!(
                "SELECT * FROM {} WHERE {};",
                first,
                dialect.case_insensitive_match(&text_col.name, ":pattern")
            ));
        }
    }

    if let Some(fk) = schema.foreign_keys.iter().find(|fk| {
        tables.contains(&fk.constrained_table) && tables.contains(&fk.referred_table)
    }) {
        examples.push(format!(
            "SELECT * FROM {c} JOIN {r} ON {c}.{cc} = {r}.{rc};",
            c = fk.constrained_table,
            r = fk.referred_table,
            cc = fk.constrained_columns.join(","),
            rc = fk.referred_columns.join(","),
        ));
    }

    examples.truncate(3);
    examples
}
