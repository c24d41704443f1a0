//! Fenced-block extraction from LLM completions.
//!
//! Completions are expected to carry their payload in a fenced block:
//! ```` ```sql ... ``` ```` for statements, ```` ```json ... ``` ```` for
//! structured answers. Extraction is pure text work; nothing here talks to a
//! provider or a database.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AgentError, AgentResult};

static SQL_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```sql\s*(.*?)\s*```").expect("valid regex"));

static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));

/// Extract the SQL payload from a completion. A missing or empty block is a
/// generation failure.
pub fn extract_sql(response: &str) -> AgentResult<String> {
    let sql = SQL_BLOCK
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| {
            AgentError::llm_generation("Response did not contain a fenced ```sql block")
        })?;

    if sql.is_empty() {
        return Err(AgentError::llm_generation("Generated SQL block was empty"));
    }
    Ok(sql)
}

/// Extract the first fenced ```json block, if any.
pub fn extract_json(response: &str) -> Option<String> {
    JSON_BLOCK
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
