//! NLSQL Core - Safe natural-language query pipeline
//!
//! Turns a natural-language question into one read-only SQL statement and
//! runs it under a hard row cap:
//!
//! - **Introspection**: [`SchemaIntrospector`] lists tables and columns
//! - **Synthesis**: [`QuerySynthesizer`] grounds text in a [`SchemaSnapshot`]
//! - **Execution**: [`SafeExecutor`] re-validates and bounds every statement
//! - **Service**: [`QueryService`] chains the three for transports
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nlsql_core::{HeuristicSynthesizer, NlQueryRequest, QueryService, SqliteDatabase};
//!
//! let db = SqliteDatabase::open("shop.db", Duration::from_secs(30))?;
//! let service = QueryService::new(Arc::new(db))
//!     .with_synthesizer(Arc::new(HeuristicSynthesizer::new()));
//!
//! let answer = service
//!     .answer_nl_query(&NlQueryRequest::new("top 5 orders by total"))
//!     .await?;
//! println!("{} -> {} rows", answer.sql_query, answer.row_count);
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod model;
pub mod service;
pub mod sql;
pub mod sqlite;
pub mod synth;

pub use cache::SchemaCache;
pub use database::{Database, RawColumn};
pub use error::{CoreError, CoreResult, DbError};
pub use executor::SafeExecutor;
pub use introspect::SchemaIntrospector;
pub use model::{
    ColumnDescriptor, ExecutedQuery, NlQueryRequest, QueryResult, Row, SampleResult,
    SchemaSnapshot, SynthesizedQuery, TableDescriptor, TableSchema, DEFAULT_QUERY_LIMIT,
    DEFAULT_SAMPLE_LIMIT, MAX_ROW_LIMIT,
};
pub use service::{Capabilities, QueryService};
pub use sqlite::SqliteDatabase;
pub use synth::{HeuristicSynthesizer, MutationPolicy, QuerySynthesizer};
