//! Schema introspector
//!
//! Turns the collaborator's catalog metadata into normalized table and column
//! descriptors. Read-only; nothing is retained between calls.

use std::sync::Arc;

use crate::database::{Database, RawColumn};
use crate::error::{sanitize_message, CoreError, CoreResult, DbError};
use crate::model::{ColumnDescriptor, SchemaSnapshot, TableDescriptor};

/// Reads table and column metadata from a [`Database`]
#[derive(Clone)]
pub struct SchemaIntrospector {
    db: Arc<dyn Database>,
}

impl SchemaIntrospector {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// All user-visible base tables with their column counts
    pub async fn list_tables(&self) -> CoreResult<Vec<TableDescriptor>> {
        let names = self.db.table_names().await.map_err(introspection_error)?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            // A table dropped between the two metadata calls is simply skipped
            let Some(columns) = self
                .db
                .table_columns(&name)
                .await
                .map_err(introspection_error)?
            else {
                continue;
            };
            tables.push(TableDescriptor {
                table_name: name,
                column_count: columns.len(),
            });
        }
        Ok(tables)
    }

    /// Columns of `table_name` in ordinal order
    pub async fn describe_table(&self, table_name: &str) -> CoreResult<Vec<ColumnDescriptor>> {
        let raw = self
            .db
            .table_columns(table_name)
            .await
            .map_err(introspection_error)?
            .ok_or_else(|| CoreError::TableNotFound(table_name.to_string()))?;
        Ok(raw.iter().map(normalize_column).collect())
    }

    /// Full snapshot of every table and its columns
    pub async fn snapshot(&self) -> CoreResult<SchemaSnapshot> {
        let names = self.db.table_names().await.map_err(introspection_error)?;
        let mut snapshot = SchemaSnapshot::new();
        for name in names {
            let Some(raw) = self
                .db
                .table_columns(&name)
                .await
                .map_err(introspection_error)?
            else {
                continue;
            };
            snapshot.insert(name, raw.iter().map(normalize_column).collect());
        }
        tracing::debug!(tables = snapshot.len(), "Schema snapshot built");
        Ok(snapshot)
    }

    /// Schema version marker, if the backend exposes one
    pub async fn schema_version(&self) -> CoreResult<Option<i64>> {
        self.db.schema_version().await.map_err(introspection_error)
    }
}

fn introspection_error(err: DbError) -> CoreError {
    CoreError::Introspection(sanitize_message(&err.to_string()))
}

fn normalize_column(raw: &RawColumn) -> ColumnDescriptor {
    ColumnDescriptor {
        column_name: raw.name.clone(),
        data_type: normalize_type(&raw.declared_type),
        is_nullable: !(raw.not_null || raw.primary_key),
    }
}

/// Map a declared column type onto the normalized vocabulary
pub fn normalize_type(declared: &str) -> String {
    let upper = declared.trim().to_ascii_uppercase();
    // Strip size/precision suffixes such as VARCHAR(255) or DECIMAL(10, 2)
    let base = upper.split('(').next().unwrap_or("").trim();

    if base.is_empty() || base == "BLOB" {
        return "blob".to_string();
    }
    if base.starts_with("BOOL") {
        return "boolean".to_string();
    }
    if base.contains("INT") {
        return "integer".to_string();
    }
    if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") {
        return "text".to_string();
    }
    if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") {
        return "real".to_string();
    }
    if base.contains("DECIMAL") || base.contains("NUMERIC") {
        return "numeric".to_string();
    }
    if base.contains("TIMESTAMP") || base.contains("DATETIME") {
        return "timestamp".to_string();
    }
    if base == "DATE" {
        return "date".to_string();
    }
    if base == "TIME" {
        return "time".to_string();
    }
    if base.contains("JSON") {
        return "json".to_string();
    }
    base.to_ascii_lowercase()
}
