//! Query-related data models.
//!
//! This module defines the SQL template with its key-list marker and the
//! tabular result assembled from chunk executions.

use crate::error::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Marker replaced by the quoted, comma-joined key chunk.
pub const DEFAULT_PLACEHOLDER: &str = "{}";

/// Oracle rejects IN-lists with more than 1000 literals (ORA-01795).
pub const MAX_CHUNK_SIZE: usize = 999;

/// Column of the uploaded sheet holding the keys.
pub const KEY_COLUMN: &str = "SERVICENAME";

/// A SQL statement with exactly one substitution marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
    placeholder: String,
}

impl QueryTemplate {
    /// Parse a template using the default `{}` marker.
    pub fn parse(sql: impl Into<String>) -> AppResult<Self> {
        Self::with_placeholder(sql, DEFAULT_PLACEHOLDER)
    }

    /// Parse a template with a custom marker.
    ///
    /// A template without the marker would run unfiltered, and one with
    /// several would repeat the list, so both are rejected up front.
    pub fn with_placeholder(
        sql: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> AppResult<Self> {
        let sql = sql.into();
        let placeholder = placeholder.into();

        if placeholder.is_empty() {
            return Err(AppError::input("The substitution marker cannot be empty"));
        }
        if sql.trim().is_empty() {
            return Err(AppError::input("Enter a SQL query"));
        }

        match sql.matches(placeholder.as_str()).count() {
            1 => Ok(Self { sql, placeholder }),
            0 => Err(AppError::input(format!(
                "The query must contain the marker {} where the service names go, e.g. WHERE SERVICENAME IN ({})",
                placeholder, placeholder
            ))),
            n => Err(AppError::input(format!(
                "The query contains the marker {} {} times; it must appear exactly once",
                placeholder, n
            ))),
        }
    }

    /// Substitute the already-quoted, comma-joined key list into the marker.
    pub fn render(&self, key_list: &str) -> String {
        self.sql.replacen(&self.placeholder, key_list, 1)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}

/// Rows accumulated from one or more chunk executions.
///
/// Each row holds one value per entry of `columns`, in the same order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl ResultSet {
    /// Create a result with a known schema and no rows.
    pub fn with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append the rows of a later chunk.
    ///
    /// The first chunk that reports columns fixes the schema. A chunk with
    /// no rows and no columns contributes nothing.
    pub fn append(&mut self, chunk: ResultSet) -> AppResult<()> {
        if chunk.columns.is_empty() && chunk.rows.is_empty() {
            return Ok(());
        }
        if self.columns.is_empty() {
            self.columns = chunk.columns;
        } else if self.columns != chunk.columns {
            return Err(AppError::execution(
                format!(
                    "Chunk returned columns [{}] but earlier chunks returned [{}]",
                    chunk.columns.join(", "),
                    self.columns.join(", ")
                ),
                None,
                "The query must return the same columns for every key batch",
            ));
        }
        self.rows.extend(chunk.rows);
        Ok(())
    }

    /// View a row as a column name to value map.
    pub fn record(&self, index: usize) -> Option<serde_json::Map<String, JsonValue>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_single_marker() {
        let template =
            QueryTemplate::parse("SELECT * FROM svc WHERE SERVICENAME IN ({})").unwrap();
        assert_eq!(
            template.render("'A','B','C'"),
            "SELECT * FROM svc WHERE SERVICENAME IN ('A','B','C')"
        );
    }

    #[test]
    fn test_template_missing_marker() {
        let err = QueryTemplate::parse("SELECT * FROM svc").unwrap_err();
        assert!(matches!(err, AppError::Input { .. }));
    }

    #[test]
    fn test_template_repeated_marker() {
        let err = QueryTemplate::parse("SELECT {} FROM svc WHERE x IN ({})").unwrap_err();
        assert!(err.to_string().contains("2 times"));
    }

    #[test]
    fn test_template_blank_sql() {
        assert!(QueryTemplate::parse("   ").is_err());
    }

    #[test]
    fn test_template_custom_placeholder() {
        let template =
            QueryTemplate::with_placeholder("SELECT * FROM t WHERE k IN (:keys)", ":keys")
                .unwrap();
        assert_eq!(template.render("'x'"), "SELECT * FROM t WHERE k IN ('x')");
        assert_eq!(template.placeholder(), ":keys");
    }

    #[test]
    fn test_render_does_not_rescan_keys() {
        let template = QueryTemplate::parse("SELECT * FROM t WHERE k IN ({})").unwrap();
        assert_eq!(
            template.render("'{}'"),
            "SELECT * FROM t WHERE k IN ('{}')"
        );
    }

    #[test]
    fn test_result_append_preserves_order() {
        let columns = vec!["ID".to_string(), "NAME".to_string()];
        let mut result = ResultSet::default();
        result
            .append(ResultSet {
                columns: columns.clone(),
                rows: vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
            })
            .unwrap();
        result
            .append(ResultSet {
                columns: columns.clone(),
                rows: vec![vec![json!(3), json!("c")]],
            })
            .unwrap();

        assert_eq!(result.columns, columns);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.rows[2], vec![json!(3), json!("c")]);
    }

    #[test]
    fn test_result_append_schema_mismatch() {
        let mut result = ResultSet::with_columns(vec!["ID".to_string()]);
        let err = result
            .append(ResultSet {
                columns: vec!["OTHER".to_string()],
                rows: vec![vec![json!(1)]],
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Execution { .. }));
    }

    #[test]
    fn test_result_append_empty_chunk() {
        let mut result = ResultSet::with_columns(vec!["ID".to_string()]);
        result.append(ResultSet::default()).unwrap();
        assert_eq!(result.columns, vec!["ID".to_string()]);
        assert!(result.is_empty());
    }

    #[test]
    fn test_record_view() {
        let result = ResultSet {
            columns: vec!["ID".to_string(), "NAME".to_string()],
            rows: vec![vec![json!(7), json!("svc")]],
        };
        let record = result.record(0).unwrap();
        assert_eq!(record["ID"], json!(7));
        assert_eq!(record["NAME"], json!("svc"));
        assert!(result.record(1).is_none());
    }
}
