//! Named-parameter binding.
//!
//! Generated SQL uses `:name` placeholders. Before execution they are rewritten
//! into the backend's positional form (`$n` for PostgreSQL, `?` for MySQL and
//! SQLite) together with the ordered value list. The scanner is quote- and
//! cast-aware: `::text` casts, string literals, quoted identifiers and comments
//! are never mistaken for placeholders.

use crate::db::DatabaseType;
use crate::error::{AgentError, AgentResult};
use crate::models::{BindParams, BindValue};

/// A `:name` placeholder occurrence with its byte range in the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    name: String,
    start: usize,
    end: usize,
}

/// Distinct placeholder names in first-occurrence order.
pub fn named_placeholders(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    for ph in scan(sql) {
        if !names.contains(&ph.name) {
            names.push(ph.name);
        }
    }
    names
}

/// Rewrite `:name` placeholders to the backend's positional form and produce
/// the ordered value list.
///
/// PostgreSQL gets `$n` with one index per distinct name (repeats reuse the
/// index); MySQL and SQLite get `?` with a value appended per occurrence.
/// Placeholders without a matching entry in `params` are all reported in a
/// single error. SQL without placeholders passes through unchanged.
pub fn bind_named(
    sql: &str,
    params: &BindParams,
    db_type: DatabaseType,
) -> AgentResult<(String, Vec<BindValue>)> {
    let placeholders = scan(sql);
    if placeholders.is_empty() {
        return Ok((sql.to_string(), Vec::new()));
    }

    let mut missing: Vec<&str> = Vec::new();
    for ph in &placeholders {
        if !params.contains_key(&ph.name) && !missing.contains(&ph.name.as_str()) {
            missing.push(&ph.name);
        }
    }
    if !missing.is_empty() {
        return Err(AgentError::parameter_extraction(format!(
            "Missing values for parameters: {}",
            missing.join(", ")
        )));
    }

    let mut rewritten = String::with_capacity(sql.len());
    let mut values: Vec<BindValue> = Vec::new();
    let mut dollar_index: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    for ph in &placeholders {
        rewritten.push_str(&sql[cursor..ph.start]);
        match db_type {
            DatabaseType::Postgres => {
                let idx = match dollar_index.iter().position(|n| n == &ph.name) {
                    Some(i) => i + 1,
                    None => {
                        dollar_index.push(ph.name.clone());
                        values.push(params[&ph.name].clone());
                        dollar_index.len()
                    }
                };
                rewritten.push_str(&format!("${}", idx));
            }
            DatabaseType::MySql | DatabaseType::SQLite => {
                values.push(params[&ph.name].clone());
                rewritten.push('?');
            }
        }
        cursor = ph.end;
    }
    rewritten.push_str(&sql[cursor..]);

    Ok((rewritten, values))
}

/// Scan SQL text for `:name` placeholders, skipping quoted regions, comments
/// and `::` casts.
fn scan(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut placeholders = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            // String literal: skip to the closing quote, '' escapes a quote.
            b'\'' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // Quoted identifiers.
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                i += 1;
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
                i += 1;
            }
            // Line comment.
            b'-' if i + 1 < bytes.len() && bytes[i + 1] == b'-' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            // Block comment.
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            b':' => {
                // `::` is a cast, never a placeholder.
                if i + 1 < bytes.len() && bytes[i + 1] == b':' {
                    i += 2;
                    // Skip the cast target so `::name` is not re-scanned.
                    while i < bytes.len()
                        && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                    {
                        i += 1;
                    }
                    continue;
                }
                let start = i;
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j].is_ascii_alphabetic() || bytes[j] == b'_') {
                    j += 1;
                    while j < bytes.len()
                        && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_')
                    {
                        j += 1;
                    }
                    placeholders.push(Placeholder {
                        name: sql[start + 1..j].to_string(),
                        start,
                        end: j,
                    });
                    i = j;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    placeholders
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn params(pairs: &[(&str, BindValue)]) -> BindParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>()
    }

    #[test]
    fn test_no_placeholders_passthrough() {
        let (sql, values) =
            bind_named("SELECT * FROM users", &BindParams::new(), DatabaseType::Postgres).unwrap();
        assert_eq!(sql, "SELECT * FROM users");
        assert!(values.is_empty());
    }

    #[test]
    fn test_postgres_dollar_numbering() {
        let p = params(&[("name", "Alice".into()), ("age", BindValue::Int(30))]);
        let (sql, values) = bind_named(
            "SELECT * FROM users WHERE name = :name AND age > :age",
            &p,
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE name = $1 AND age > $2");
        assert_eq!(values, vec!["Alice".into(), BindValue::Int(30)]);
    }

    #[test]
    fn test_postgres_repeated_name_reuses_index() {
        let p = params(&[("q", "x".into())]);
        let (sql, values) = bind_named(
            "SELECT * FROM t WHERE a = :q OR b = :q",
            &p,
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 OR b = $1");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_question_mark_repeats_reappend() {
        let p = params(&[("q", "x".into())]);
        let (sql, values) = bind_named(
            "SELECT * FROM t WHERE a = :q OR b = :q",
            &p,
            DatabaseType::SQLite,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = ? OR b = ?");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_cast_not_a_placeholder() {
        let p = params(&[("id", BindValue::Int(1))]);
        let (sql, _) = bind_named(
            "SELECT created_at::text FROM t WHERE id = :id",
            &p,
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(sql, "SELECT created_at::text FROM t WHERE id = $1");
    }

    #[test]
    fn test_placeholder_inside_string_literal_ignored() {
        let (sql, values) = bind_named(
            "SELECT ':name' FROM t",
            &BindParams::new(),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert_eq!(sql, "SELECT ':name' FROM t");
        assert!(values.is_empty());
    }

    #[test]
    fn test_placeholder_in_comment_ignored() {
        let (sql, _) = bind_named(
            "SELECT 1 -- :hidden\nFROM t",
            &BindParams::new(),
            DatabaseType::Postgres,
        )
        .unwrap();
        assert!(sql.contains(":hidden"));
    }

    #[test]
    fn test_missing_parameters_all_reported() {
        let p = params(&[("found", "x".into())]);
        let err = bind_named(
            "SELECT * FROM t WHERE a = :found AND b = :one AND c = :two",
            &p,
            DatabaseType::Postgres,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("one"));
        assert!(msg.contains("two"));
        assert!(!msg.contains("found,"));
    }

    #[test]
    fn test_named_placeholders_ordered_dedup() {
        let names = named_placeholders("SELECT :b, :a, :b FROM t");
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let names = named_placeholders("SELECT 'it''s :not' , :real FROM t");
        assert_eq!(names, vec!["real"]);
    }
}
