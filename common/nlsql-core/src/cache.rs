//! Time-bounded schema snapshot cache
//!
//! A snapshot is reused only while it is younger than the TTL and the
//! database still reports the schema version it was built under. Backends
//! without a version marker are never cached.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::CoreResult;
use crate::introspect::SchemaIntrospector;
use crate::model::SchemaSnapshot;

struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    version: i64,
    fetched_at: Instant,
}

pub struct SchemaCache {
    ttl: Duration,
    entry: Mutex<Option<CachedSnapshot>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Current snapshot, rebuilt through `introspector` when stale
    ///
    /// The lock is never held across a database call.
    pub async fn snapshot(&self, introspector: &SchemaIntrospector) -> CoreResult<Arc<SchemaSnapshot>> {
        if self.ttl.is_zero() {
            return introspector.snapshot().await.map(Arc::new);
        }
        let Some(version) = introspector.schema_version().await? else {
            return introspector.snapshot().await.map(Arc::new);
        };

        if let Some(hit) = self.lookup(version) {
            debug!(version, "Schema cache hit");
            return Ok(hit);
        }

        let snapshot = Arc::new(introspector.snapshot().await?);
        let mut entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        *entry = Some(CachedSnapshot {
            snapshot: snapshot.clone(),
            version,
            fetched_at: Instant::now(),
        });
        debug!(version, tables = snapshot.len(), "Schema cache refreshed");
        Ok(snapshot)
    }

    fn lookup(&self, version: i64) -> Option<Arc<SchemaSnapshot>> {
        let entry = self.entry.lock().unwrap_or_else(PoisonError::into_inner);
        entry
            .as_ref()
            .filter(|cached| cached.version == version && cached.fetched_at.elapsed() < self.ttl)
            .map(|cached| cached.snapshot.clone())
    }
}
