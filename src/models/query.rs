//! Query result and parameter value models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value bound to a named SQL placeholder.
///
/// Untagged so that JSON emitted by an LLM (`{"name": "Alice", "min_age": 30}`)
/// deserializes directly into the natural variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Structured values (arrays, objects) are passed through as JSON.
    Json(Value),
}

impl BindValue {
    /// Convert a JSON value into a bind value, preserving integer-ness.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::Int(i)
                } else {
                    BindValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => BindValue::String(s),
            other => BindValue::Json(other),
        }
    }
}

impl From<&str> for BindValue {
    fn from(s: &str) -> Self {
        BindValue::String(s.to_string())
    }
}

impl From<String> for BindValue {
    fn from(s: String) -> Self {
        BindValue::String(s)
    }
}

impl From<i64> for BindValue {
    fn from(i: i64) -> Self {
        BindValue::Int(i)
    }
}

impl From<f64> for BindValue {
    fn from(f: f64) -> Self {
        BindValue::Float(f)
    }
}

impl From<bool> for BindValue {
    fn from(b: bool) -> Self {
        BindValue::Bool(b)
    }
}

/// Named parameters extracted for a generated query.
pub type BindParams = BTreeMap<String, BindValue>;

/// The outcome of a natural-language query, success or failure.
///
/// Failures carry the normalized error message and the original request text in
/// `query`; the public pipeline entry point never propagates an error past this
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result rows as column-name → JSON value maps.
    pub data: Vec<serde_json::Map<String, Value>>,
    /// Column names in select-list order. Empty for non-SELECT statements.
    pub columns: Vec<String>,
    pub row_count: usize,
    /// The executed SQL, or the original natural-language request on failure.
    pub query: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl QueryResult {
    /// A successful result.
    pub fn success(
        data: Vec<serde_json::Map<String, Value>>,
        columns: Vec<String>,
        query: String,
        execution_time_ms: u64,
    ) -> Self {
        let row_count = data.len();
        Self {
            data,
            columns,
            row_count,
            query,
            success: true,
            error: None,
            execution_time_ms: Some(execution_time_ms),
        }
    }

    /// A successful non-SELECT result reporting affected rows only.
    pub fn affected(rows_affected: u64, query: String, execution_time_ms: u64) -> Self {
        Self {
            data: Vec::new(),
            columns: Vec::new(),
            row_count: rows_affected as usize,
            query,
            success: true,
            error: None,
            execution_time_ms: Some(execution_time_ms),
        }
    }

    /// A failed result carrying the normalized error message.
    pub fn failure(error: String, query: String) -> Self {
        Self {
            data: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            query,
            success: false,
            error: Some(error),
            execution_time_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_value_from_json_preserves_integers() {
        assert_eq!(BindValue::from_json(json!(42)), BindValue::Int(42));
        assert_eq!(BindValue::from_json(json!(1.5)), BindValue::Float(1.5));
        assert_eq!(BindValue::from_json(json!(null)), BindValue::Null);
        assert_eq!(
            BindValue::from_json(json!("abc")),
            BindValue::String("abc".to_string())
        );
    }

    #[test]
    fn test_bind_value_json_passthrough() {
        let v = BindValue::from_json(json!([1, 2, 3]));
        assert_eq!(v, BindValue::Json(json!([1, 2, 3])));
    }

    #[test]
    fn test_bind_params_deserialize_from_llm_json() {
        let params: BindParams =
            serde_json::from_str(r#"{"name": "Alice", "min_age": 30, "active": true}"#).unwrap();
        assert_eq!(params["name"], BindValue::String("Alice".to_string()));
        assert_eq!(params["min_age"], BindValue::Int(30));
        assert_eq!(params["active"], BindValue::Bool(true));
    }

    #[test]
    fn test_query_result_success() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), json!(1));
        let result = QueryResult::success(vec![row], vec!["id".to_string()], "SELECT 1".into(), 5);
        assert!(result.success);
        assert_eq!(result.row_count, 1);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_query_result_failure_keeps_original_request() {
        let result = QueryResult::failure(
            "SQL validation failed: two statements".into(),
            "show me users".into(),
        );
        assert!(!result.success);
        assert_eq!(result.query, "show me users");
        assert_eq!(result.row_count, 0);
        assert!(result.execution_time_ms.is_none());
    }
}
