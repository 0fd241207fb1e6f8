//! SQLite collaborator backed by rusqlite
//!
//! Every call opens its own read-only connection on the blocking pool, so
//! concurrent requests never wait on each other for a lock.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;

use crate::database::{Database, RawColumn};
use crate::error::DbError;
use crate::model::Row;

/// Read-only SQLite database
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteDatabase {
    /// Point at an existing database file
    ///
    /// The file must already exist; read-only connections cannot create it.
    pub fn open(path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self, DbError> {
        let path = path.into();
        if !path.exists() {
            return Err(DbError::Connection(format!(
                "database file {} does not exist",
                path.display()
            )));
        }
        let db = Self { path, busy_timeout };
        // Fail fast on unreadable or corrupt files
        db.connect()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, DbError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(map_sqlite_error)?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(map_sqlite_error)?;
        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(map_sqlite_error)?;
        Ok(conn)
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DbError> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.connect()?;
            f(&conn)
        })
        .await
        .map_err(|e| DbError::Task(e.to_string()))?
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> DbError {
    match err.sqlite_error_code() {
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::NotADatabase) => {
            DbError::Connection(err.to_string())
        }
        Some(ErrorCode::PermissionDenied)
        | Some(ErrorCode::ReadOnly)
        | Some(ErrorCode::AuthorizationForStatementDenied) => DbError::Permission(err.to_string()),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => DbError::Timeout,
        _ => DbError::Query(err.to_string()),
    }
}

/// Parse failures are the caller's fault, not the database's
fn map_prepare_error(err: rusqlite::Error) -> DbError {
    let message = err.to_string();
    if message.contains("syntax error") || message.contains("incomplete input") {
        DbError::Syntax(message)
    } else {
        map_sqlite_error(err)
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

/// Key for a result column, suffixed when the select list repeats a name
fn unique_key(row: &Row, name: &str) -> String {
    if !row.contains_key(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{}:{}", name, n))
        .find(|candidate| !row.contains_key(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<Vec<Row>, DbError> {
    let mut stmt = conn.prepare(sql).map_err(map_prepare_error)?;
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = stmt.query([]).map_err(map_sqlite_error)?;
    let mut out = Vec::new();
    while out.len() < max_rows {
        let Some(row) = rows.next().map_err(map_sqlite_error)? else {
            break;
        };
        let mut mapped = Row::new();
        for (i, name) in columns.iter().enumerate() {
            let value = row.get_ref(i).map_err(map_sqlite_error)?;
            let key = unique_key(&mapped, name);
            mapped.insert(key, to_json(value));
        }
        out.push(mapped);
    }
    Ok(out)
}

fn list_table_names(conn: &Connection) -> Result<Vec<String>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .map_err(map_sqlite_error)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(map_sqlite_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite_error)?;
    Ok(names)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, DbError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .map_err(map_sqlite_error)?;
    Ok(count > 0)
}

fn list_columns(conn: &Connection, table: &str) -> Result<Option<Vec<RawColumn>>, DbError> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let mut stmt = conn
        .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(map_sqlite_error)?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(RawColumn {
                name: row.get(0)?,
                declared_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(2)? != 0,
                primary_key: row.get::<_, i64>(3)? != 0,
            })
        })
        .map_err(map_sqlite_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite_error)?;
    Ok(Some(columns))
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn query(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>, DbError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| run_query(conn, &sql, max_rows))
            .await
    }

    async fn table_names(&self) -> Result<Vec<String>, DbError> {
        self.with_connection(list_table_names).await
    }

    async fn table_columns(&self, table: &str) -> Result<Option<Vec<RawColumn>>, DbError> {
        let table = table.to_string();
        self.with_connection(move |conn| list_columns(conn, &table))
            .await
    }

    async fn schema_version(&self) -> Result<Option<i64>, DbError> {
        self.with_connection(|conn| {
            conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
                .map(Some)
                .map_err(map_sqlite_error)
        })
        .await
    }
}
