//! The four operations exposed to transports
//!
//! `QueryService` wires the introspector, synthesizer and executor together.
//! It is immutable once built and shared by every request handler.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::SchemaCache;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::executor::SafeExecutor;
use crate::introspect::SchemaIntrospector;
use crate::model::{
    effective_limit, NlQueryRequest, QueryResult, SampleResult, SchemaSnapshot, TableDescriptor,
    TableSchema, DEFAULT_QUERY_LIMIT, DEFAULT_SAMPLE_LIMIT,
};
use crate::sql::quote_ident;
use crate::synth::QuerySynthesizer;

/// Optional features resolved once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// A synthesizer is configured, so `answer_nl_query` can be served
    pub nl_query: bool,
}

#[derive(Clone)]
pub struct QueryService {
    introspector: SchemaIntrospector,
    synthesizer: Option<Arc<dyn QuerySynthesizer>>,
    executor: SafeExecutor,
    cache: Option<Arc<SchemaCache>>,
    default_limit: usize,
}

impl QueryService {
    /// Service without NL querying; add a synthesizer to enable it
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            introspector: SchemaIntrospector::new(db.clone()),
            synthesizer: None,
            executor: SafeExecutor::new(db),
            cache: None,
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn QuerySynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Cache schema snapshots for `ttl`; zero disables caching
    pub fn with_schema_cache(mut self, ttl: Duration) -> Self {
        self.cache = (!ttl.is_zero()).then(|| Arc::new(SchemaCache::new(ttl)));
        self
    }

    /// Row limits for NL queries: the default when none is requested, and
    /// a ceiling that can only be lower than the hard cap
    pub fn with_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.executor = self.executor.with_max_limit(max_limit);
        self.default_limit = effective_limit(default_limit, self.executor.max_limit());
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            nl_query: self.synthesizer.is_some(),
        }
    }

    pub async fn list_tables(&self) -> CoreResult<Vec<TableDescriptor>> {
        self.introspector.list_tables().await
    }

    pub async fn describe_table(&self, table_name: &str) -> CoreResult<TableSchema> {
        let columns = self.introspector.describe_table(table_name).await?;
        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }

    /// Full snapshot for synthesis, from the cache when one is configured
    pub async fn schema_snapshot(&self) -> CoreResult<Arc<SchemaSnapshot>> {
        match &self.cache {
            Some(cache) => cache.snapshot(&self.introspector).await,
            None => self.introspector.snapshot().await.map(Arc::new),
        }
    }

    /// Introspect, synthesize, then execute under the row cap
    pub async fn answer_nl_query(&self, request: &NlQueryRequest) -> CoreResult<QueryResult> {
        let synthesizer = self.synthesizer.as_ref().ok_or_else(|| {
            CoreError::Synthesis("natural-language querying is not enabled".to_string())
        })?;

        let schema = self.schema_snapshot().await?;
        let synthesized = synthesizer.convert_to_sql(&request.nl_query, &schema)?;
        debug!(
            synthesizer = synthesizer.name(),
            sql = %synthesized.sql_text,
            "Answering NL query"
        );

        let limit = request.limit.unwrap_or(self.default_limit);
        let executed = self
            .executor
            .execute_safe_query(&synthesized.sql_text, limit)
            .await?;
        info!(rows = executed.rows.len(), "NL query answered");
        Ok(executed.into())
    }

    /// First rows of a table named by the caller
    ///
    /// The name is checked against the live table list before it is quoted
    /// into SQL.
    pub async fn sample_table(&self, table_name: &str, limit: Option<usize>) -> CoreResult<SampleResult> {
        let tables = self.introspector.list_tables().await?;
        if !tables.iter().any(|t| t.table_name == table_name) {
            warn!(table = %table_name, "Rejected sample identifier");
            return Err(CoreError::InvalidIdentifier(table_name.to_string()));
        }

        let limit = effective_limit(
            limit.unwrap_or(DEFAULT_SAMPLE_LIMIT),
            self.executor.max_limit(),
        );
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table_name), limit);
        let executed = self.executor.execute_safe_query(&sql, limit).await?;
        Ok(SampleResult {
            table_name: table_name.to_string(),
            row_count: executed.rows.len(),
            sample_data: executed.rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::testing::{row, RecordingDatabase};
    use crate::synth::HeuristicSynthesizer;

    fn orders_db(rows: usize) -> Arc<RecordingDatabase> {
        let data = (0..rows as i64)
            .map(|i| row(&[("id", json!(i)), ("total", json!(i * 10))]))
            .collect();
        Arc::new(
            RecordingDatabase::new()
                .with_table("orders", &[("id", "INTEGER", true), ("total", "NUMERIC", false)])
                .with_table("users", &[("id", "INTEGER", true), ("email", "TEXT", false)])
                .with_rows(data),
        )
    }

    fn service(db: &Arc<RecordingDatabase>) -> QueryService {
        QueryService::new(db.clone()).with_synthesizer(Arc::new(HeuristicSynthesizer::new()))
    }

    #[tokio::test]
    async fn test_list_and_describe() {
        let db = orders_db(0);
        let svc = service(&db);
        let tables = svc.list_tables().await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].table_name, "orders");
        assert_eq!(tables[0].column_count, 2);

        let schema = svc.describe_table("orders").await.unwrap();
        assert_eq!(schema.table_name, "orders");
        assert_eq!(schema.columns[1].column_name, "total");
        assert_eq!(schema.columns[1].data_type, "numeric");
        assert!(schema.columns[1].is_nullable);
    }

    #[tokio::test]
    async fn test_describe_unknown_table() {
        let db = orders_db(0);
        let err = service(&db).describe_table("ghost").await.unwrap_err();
        assert_eq!(err, CoreError::TableNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_answer_round_trip() {
        let db = orders_db(3);
        let result = service(&db)
            .answer_nl_query(&NlQueryRequest::new("show me all orders"))
            .await
            .unwrap();
        assert_eq!(result.sql_query, "SELECT * FROM orders LIMIT 50");
        assert_eq!(result.row_count, 3);
        let keys: Vec<_> = result.results[0].keys().cloned().collect();
        assert_eq!(keys, vec!["id", "total"]);
    }

    #[tokio::test]
    async fn test_answer_clamps_requested_limit() {
        let db = orders_db(120);
        let svc = service(&db);
        for requested in [1, 50, 51, 10_000] {
            let result = svc
                .answer_nl_query(&NlQueryRequest::new("list orders").with_limit(requested))
                .await
                .unwrap();
            assert!(result.row_count <= 50);
            assert_eq!(result.row_count, requested.min(50));
        }
    }

    #[tokio::test]
    async fn test_answer_is_idempotent() {
        let db = orders_db(3);
        let svc = service(&db);
        let request = NlQueryRequest::new("orders where total > 5 sorted by id desc");
        let first = svc.answer_nl_query(&request).await.unwrap();
        let second = svc.answer_nl_query(&request).await.unwrap();
        assert_eq!(first.sql_query, second.sql_query);
    }

    #[tokio::test]
    async fn test_declined_mutation_issues_no_query() {
        let db = orders_db(3);
        let err = service(&db)
            .answer_nl_query(&NlQueryRequest::new("delete every order"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedIntent(_)));
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_nl_query_without_synthesizer() {
        let db = orders_db(1);
        let svc = QueryService::new(db.clone());
        assert!(!svc.capabilities().nl_query);
        let err = svc
            .answer_nl_query(&NlQueryRequest::new("show orders"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Synthesis(_)));
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_schema() {
        let db = Arc::new(RecordingDatabase::new());
        let err = service(&db)
            .answer_nl_query(&NlQueryRequest::new("show me stuff"))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::EmptySchema);
    }

    #[tokio::test]
    async fn test_sample_table() {
        let db = orders_db(10);
        let sample = service(&db).sample_table("orders", None).await.unwrap();
        assert_eq!(sample.table_name, "orders");
        assert_eq!(sample.row_count, 5);
        assert_eq!(db.last_query().as_deref(), Some("SELECT * FROM orders LIMIT 5"));
    }

    #[tokio::test]
    async fn test_sample_limit_capped() {
        let db = orders_db(80);
        let sample = service(&db).sample_table("orders", Some(500)).await.unwrap();
        assert_eq!(sample.row_count, 50);
    }

    #[tokio::test]
    async fn test_sample_rejects_unknown_identifier_without_sql() {
        let db = orders_db(3);
        let err = service(&db)
            .sample_table("users; DROP TABLE users", Some(5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidIdentifier("users; DROP TABLE users".to_string())
        );
        assert_eq!(db.query_count(), 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sample_rejection_is_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let db = orders_db(1);
        let err = service(&db).sample_table("ghost", None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentifier(_)));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{}", output);
        assert!(output.contains("Rejected sample identifier"), "{}", output);
        assert!(output.contains("ghost"), "{}", output);
    }

    #[tokio::test]
    async fn test_introspection_failure_is_not_table_not_found() {
        let db = Arc::new(
            RecordingDatabase::new()
                .with_table("orders", &[("id", "INTEGER", true)])
                .failing("permission denied for schema public"),
        );
        let err = service(&db).describe_table("orders").await.unwrap_err();
        assert!(matches!(err, CoreError::Introspection(_)));
    }

    #[tokio::test]
    async fn test_limits_configuration() {
        let db = orders_db(80);
        let svc = service(&db).with_limits(20, 30);
        let mut request = NlQueryRequest::new("list orders");
        request.limit = None;
        assert_eq!(svc.answer_nl_query(&request).await.unwrap().row_count, 20);
        let request = NlQueryRequest::new("list orders").with_limit(45);
        assert_eq!(svc.answer_nl_query(&request).await.unwrap().row_count, 30);
    }
}
