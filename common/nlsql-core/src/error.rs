//! Error taxonomy for the query core
//!
//! Every rejection is a distinct variant so transports can map them to their
//! own status codes. Messages that originate in the database pass through
//! [`sanitize_message`] before they are stored here.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Errors surfaced by the introspector, synthesizer, executor and service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The requested table does not exist in the current schema
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// Metadata could not be read (connectivity or permission failure)
    #[error("schema introspection failed: {0}")]
    Introspection(String),

    /// The schema snapshot contains no tables
    #[error("schema contains no tables")]
    EmptySchema,

    /// The synthesizer could not produce a safe statement
    #[error("query synthesis failed: {0}")]
    Synthesis(String),

    /// The request asks for a mutation the synthesizer will not express
    #[error("unsupported intent: {0} requests are not allowed, the server is read-only")]
    UnsupportedIntent(String),

    /// The statement contains a DDL/DML verb
    #[error("forbidden operation: {0}")]
    ForbiddenOperation(String),

    /// A caller-supplied identifier failed validation against the schema
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// The statement is malformed or violates the execution policy
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// The database failed while running an accepted statement
    #[error("query execution failed: {0}")]
    Execution(String),
}

impl CoreError {
    /// Stable machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::TableNotFound(_) => "table_not_found",
            CoreError::Introspection(_) => "introspection_error",
            CoreError::EmptySchema => "empty_schema",
            CoreError::Synthesis(_) => "synthesis_error",
            CoreError::UnsupportedIntent(_) => "unsupported_intent",
            CoreError::ForbiddenOperation(_) => "forbidden_operation",
            CoreError::InvalidIdentifier(_) => "invalid_identifier",
            CoreError::QueryRejected(_) => "query_rejected",
            CoreError::Execution(_) => "execution_error",
        }
    }

    /// True for failures caused by the request itself rather than the database
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            CoreError::Introspection(_) | CoreError::Execution(_) | CoreError::TableNotFound(_)
        )
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors reported by a [`crate::database::Database`] collaborator
#[derive(Error, Debug)]
pub enum DbError {
    /// The database could not be reached or opened
    #[error("connection failed: {0}")]
    Connection(String),

    /// The connection lacks the required privileges
    #[error("permission denied: {0}")]
    Permission(String),

    /// The database could not parse the statement
    #[error("{0}")]
    Syntax(String),

    /// The database rejected or failed the statement
    #[error("{0}")]
    Query(String),

    /// The database did not answer in time
    #[error("database timed out")]
    Timeout,

    /// The worker running the blocking call died
    #[error("database worker failed: {0}")]
    Task(String),
}

static DSN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b[a-z][a-z0-9+.\-]*://[^\s'"]+"#).expect("Invalid regex")
});

static SECRET_PAIR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(password|passwd|pwd|secret|token)\s*[=:]\s*[^\s;,'"]+"#)
        .expect("Invalid regex")
});

/// Strip connection strings and credential pairs from a database message
pub fn sanitize_message(message: &str) -> String {
    let redacted = DSN_REGEX.replace_all(message, "<redacted-dsn>");
    SECRET_PAIR_REGEX
        .replace_all(&redacted, "$1=<redacted>")
        .into_owned()
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        let message = sanitize_message(&err.to_string());
        match err {
            DbError::Syntax(_) => CoreError::QueryRejected(message),
            _ => CoreError::Execution(message),
        }
    }
}
