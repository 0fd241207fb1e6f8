//! Database collaborator interface
//!
//! Connection acquisition, pooling and credentials live behind this trait.
//! The core only needs a raw query primitive and two metadata primitives.

use async_trait::async_trait;

use crate::error::DbError;
use crate::model::Row;

/// Column metadata as reported by the database, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    /// Declared type, verbatim
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// Query and metadata primitives supplied by the database collaborator
///
/// Implementations must be `Send + Sync`; the core calls them concurrently
/// from independent requests and holds no lock around them.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute `sql` verbatim and return at most `max_rows` rows
    async fn query(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>, DbError>;

    /// Names of all user-visible base tables, in a stable order
    async fn table_names(&self) -> Result<Vec<String>, DbError>;

    /// Columns of `table` in ordinal order, or `None` if it does not exist
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<RawColumn>>, DbError>;

    /// Marker that changes whenever the schema changes, if the backend has one
    async fn schema_version(&self) -> Result<Option<i64>, DbError> {
        Ok(None)
    }
}
