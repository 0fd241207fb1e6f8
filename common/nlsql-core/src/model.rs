//! Request-scoped value types shared by every stage of the pipeline

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hard ceiling on the number of rows any request may return
pub const MAX_ROW_LIMIT: usize = 50;

/// Row limit applied to NL queries when the caller does not pass one
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Row limit applied to table samples when the caller does not pass one
pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

/// A single result row, keyed by column name in select-list order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Clamp a caller-supplied limit into `1..=ceiling`, where the ceiling itself
/// never exceeds [`MAX_ROW_LIMIT`]
pub fn effective_limit(requested: usize, ceiling: usize) -> usize {
    let ceiling = ceiling.clamp(1, MAX_ROW_LIMIT);
    requested.clamp(1, ceiling)
}

/// A base table visible to the configured connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub table_name: String,
    pub column_count: usize,
}

/// A column of a table, in ordinal position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    /// Normalized type name (`integer`, `text`, `timestamp`, ...)
    pub data_type: String,
    pub is_nullable: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            column_name: name.into(),
            data_type: data_type.into(),
            is_nullable,
        }
    }

    /// Whether values of this column compare as numbers
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "integer" | "real" | "numeric" | "boolean"
        )
    }

    /// Whether the column holds a point in time
    pub fn is_temporal(&self) -> bool {
        matches!(self.data_type.as_str(), "timestamp" | "date" | "time")
    }
}

/// The database structure at one point in time
///
/// Tables iterate in name order, which is also the order the synthesizer
/// uses when it has to pick a default table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, Vec<ColumnDescriptor>>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table
    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) {
        self.tables.insert(table.into(), columns);
    }

    /// Builder-style variant of [`SchemaSnapshot::insert`]
    pub fn with_table(mut self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.insert(table, columns);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnDescriptor> {
        self.columns(table)?
            .iter()
            .find(|c| c.column_name == column)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[ColumnDescriptor])> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// First table in snapshot order
    pub fn first_table(&self) -> Option<&str> {
        self.table_names().next()
    }
}

/// A natural-language question from the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NlQueryRequest {
    pub nl_query: String,
    #[serde(default = "default_query_limit")]
    pub limit: Option<usize>,
}

fn default_query_limit() -> Option<usize> {
    Some(DEFAULT_QUERY_LIMIT)
}

impl NlQueryRequest {
    pub fn new(nl_query: impl Into<String>) -> Self {
        Self {
            nl_query: nl_query.into(),
            limit: default_query_limit(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested limit, before clamping
    pub fn requested_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

/// Exactly one read-only SQL statement grounded in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedQuery {
    pub sql_text: String,
    /// Tables the statement reads from, all present in the source snapshot
    #[serde(skip)]
    pub tables: Vec<String>,
}

/// The statement the executor actually ran, plus its rows
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub sql: String,
    pub rows: Vec<Row>,
}

/// Response of an answered NL query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub sql_query: String,
    pub results: Vec<Row>,
    pub row_count: usize,
}

impl From<ExecutedQuery> for QueryResult {
    fn from(executed: ExecutedQuery) -> Self {
        Self {
            row_count: executed.rows.len(),
            sql_query: executed.sql,
            results: executed.rows,
        }
    }
}

/// Response of a table sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    pub table_name: String,
    pub sample_data: Vec<Row>,
    pub row_count: usize,
}

/// Column listing of a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_caps_at_fifty() {
        assert_eq!(effective_limit(10_000, MAX_ROW_LIMIT), 50);
        assert_eq!(effective_limit(10, MAX_ROW_LIMIT), 10);
        assert_eq!(effective_limit(0, MAX_ROW_LIMIT), 1);
    }

    #[test]
    fn test_effective_limit_ceiling_cannot_exceed_hard_cap() {
        assert_eq!(effective_limit(80, 100), 50);
        assert_eq!(effective_limit(80, 20), 20);
    }

    #[test]
    fn test_request_limit_defaults() {
        let req: NlQueryRequest = serde_json::from_str(r#"{"nl_query":"show orders"}"#).unwrap();
        assert_eq!(req.requested_limit(), 50);

        let req: NlQueryRequest =
            serde_json::from_str(r#"{"nl_query":"show orders","limit":null}"#).unwrap();
        assert_eq!(req.requested_limit(), 50);
    }

    #[test]
    fn test_snapshot_orders_tables_by_name() {
        let snapshot = SchemaSnapshot::new()
            .with_table("users", vec![])
            .with_table("accounts", vec![]);
        assert_eq!(snapshot.first_table(), Some("accounts"));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_query_result_row_count() {
        let mut row = Row::new();
        row.insert("id".into(), serde_json::json!(1));
        let result = QueryResult::from(ExecutedQuery {
            sql: "SELECT 1".into(),
            rows: vec![row],
        });
        assert_eq!(result.row_count, 1);
        assert_eq!(result.sql_query, "SELECT 1");
    }
}
