//! Safe executor
//!
//! Second line of defense: every statement is re-inspected here no matter
//! where it came from, and nothing reaches the database until it passes.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::model::{effective_limit, ExecutedQuery, MAX_ROW_LIMIT};
use crate::sql;

/// Runs single read-only statements under a hard row cap
#[derive(Clone)]
pub struct SafeExecutor {
    db: Arc<dyn Database>,
    max_limit: usize,
}

impl SafeExecutor {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            max_limit: MAX_ROW_LIMIT,
        }
    }

    /// Lower the row ceiling; values above [`MAX_ROW_LIMIT`] are ignored
    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit.clamp(1, MAX_ROW_LIMIT);
        self
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    /// Validate, cap and run `sql`
    ///
    /// Returns the statement as it was actually sent together with at most
    /// `min(limit, max_limit)` rows.
    pub async fn execute_safe_query(&self, sql: &str, limit: usize) -> CoreResult<ExecutedQuery> {
        let limit = effective_limit(limit, self.max_limit);
        let bounded = sql::enforce_limit(sql, limit)?;
        debug!(sql = %bounded, limit, "Executing statement");

        let mut rows = self.db.query(&bounded, limit).await.map_err(|e| {
            let err = CoreError::from(e);
            warn!(error = %err, "Statement failed");
            err
        })?;
        rows.truncate(limit);

        Ok(ExecutedQuery { sql: bounded, rows })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::testing::{row, RecordingDatabase};

    fn rows(n: i64) -> Vec<crate::model::Row> {
        (0..n).map(|i| row(&[("id", json!(i))])).collect()
    }

    fn executor(db: &Arc<RecordingDatabase>) -> SafeExecutor {
        SafeExecutor::new(db.clone())
    }

    #[tokio::test]
    async fn test_appends_limit_and_returns_rows() {
        let db = Arc::new(RecordingDatabase::new().with_rows(rows(3)));
        let result = executor(&db)
            .execute_safe_query("SELECT * FROM orders", 10)
            .await
            .unwrap();
        assert_eq!(result.sql, "SELECT * FROM orders LIMIT 10");
        assert_eq!(result.rows.len(), 3);
        assert_eq!(db.last_query().as_deref(), Some("SELECT * FROM orders LIMIT 10"));
    }

    #[tokio::test]
    async fn test_row_cap_is_hard() {
        let db = Arc::new(RecordingDatabase::new().with_rows(rows(200)));
        let exec = executor(&db);
        for requested in [1, 49, 50, 51, 500, 10_000] {
            let result = exec
                .execute_safe_query("SELECT * FROM orders LIMIT 1000", requested)
                .await
                .unwrap();
            assert!(result.rows.len() <= 50);
            assert_eq!(result.rows.len(), requested.min(50));
        }
    }

    #[tokio::test]
    async fn test_zero_limit_returns_one_row() {
        let db = Arc::new(RecordingDatabase::new().with_rows(rows(5)));
        let result = executor(&db)
            .execute_safe_query("SELECT * FROM orders", 0)
            .await
            .unwrap();
        assert_eq!(result.sql, "SELECT * FROM orders LIMIT 1");
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_lowered_ceiling() {
        let db = Arc::new(RecordingDatabase::new().with_rows(rows(40)));
        let result = executor(&db)
            .with_max_limit(10)
            .execute_safe_query("SELECT * FROM orders", 50)
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 10);
        assert_eq!(SafeExecutor::new(db).with_max_limit(500).max_limit(), 50);
    }

    #[tokio::test]
    async fn test_forbidden_statements_never_reach_the_database() {
        let db = Arc::new(RecordingDatabase::new());
        let exec = executor(&db);
        for sql in [
            "DROP TABLE users",
            "DELETE FROM orders",
            "INSERT INTO orders VALUES (1)",
            "SELECT 1; DROP TABLE users",
            "WITH x AS (DELETE FROM t RETURNING *) SELECT * FROM x",
        ] {
            let err = exec.execute_safe_query(sql, 5).await.unwrap_err();
            assert!(matches!(err, CoreError::ForbiddenOperation(_)), "{}", sql);
        }
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_statements_never_reach_the_database() {
        let db = Arc::new(RecordingDatabase::new());
        let exec = executor(&db);
        for sql in [
            "SELECT 1; SELECT 2",
            "EXPLAIN SELECT 1",
            "SELECT * FROM t WHERE id = ?",
            "SELECT 'unterminated",
            "   ",
        ] {
            let err = exec.execute_safe_query(sql, 5).await.unwrap_err();
            assert!(matches!(err, CoreError::QueryRejected(_)), "{}", sql);
        }
        assert_eq!(db.query_count(), 0);
    }

    #[tokio::test]
    async fn test_database_failure_is_sanitized() {
        let db = Arc::new(
            RecordingDatabase::new().failing("lost connection to mysql://root:pw@10.0.0.1/db"),
        );
        let err = executor(&db)
            .execute_safe_query("SELECT 1", 5)
            .await
            .unwrap_err();
        match err {
            CoreError::Execution(msg) => {
                assert!(!msg.contains("root:pw"));
                assert!(msg.contains("<redacted-dsn>"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(db.query_count(), 1);
    }
}
