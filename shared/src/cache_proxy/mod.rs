// ============================================================================
// Cache Proxy
// ============================================================================
//
// Batch-oriented access to the record cache, independent of the backend.
//
// - `exists()` checks every key in one logical request. Missing keys are a
//   domain error (NotInCache); an unreachable backend is a transport error.
// - `get()` hydrates every key that exists with all of type/source/payload
//   set. Incomplete entries are logged and skipped, never an error.
//
// Callers may pass any number of keys; each backend splits requests larger
// than its own maximum. Every backend call is timed and calls at or above
// the slow request threshold are reported (log + metric + counter).
//
// Backends are chosen once at startup by `connect_cache_proxy()`.
//
// ============================================================================

pub mod memory;
pub mod postgres_cache;
pub mod redis_cache;

pub use memory::MemoryCacheProxy;
pub use postgres_cache::PostgresCacheProxy;
pub use redis_cache::RedisCacheProxy;

use async_trait::async_trait;
use bytes::Bytes;
use reprocess_config::{CacheBackendKind, CacheConfig};
use reprocess_error::ReprocessResult;
use reprocess_metrics::{
    CACHE_ENTRIES_DROPPED_TOTAL, CACHE_REQUEST_DURATION_SECONDS, CACHE_SLOW_REQUESTS_TOTAL,
};
use reprocess_types::{CacheEntry, Identifier, IdentifierShape, OutboundMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Number of keys checked per `exists()` call during manifest validation
pub const LOOKUP_BATCH_SIZE: usize = 200;

/// Number of keys hydrated per `get()` call by the cache lookup stage
pub const GET_BATCH_SIZE: usize = 100;

#[async_trait]
pub trait CacheProxy: Send + Sync {
    /// Short backend name used in logs and metric labels
    fn backend(&self) -> &'static str;

    /// Largest number of keys the backend takes in one request
    fn max_batch_size(&self) -> usize;

    /// Shape every identifier must have to be a key of this cache
    fn identifier_shape(&self) -> IdentifierShape {
        IdentifierShape::default()
    }

    /// Succeeds only when every key exists
    async fn exists(&self, keys: &[Identifier]) -> ReprocessResult<()>;

    /// Hydrate the complete entries for the given keys
    ///
    /// A key listed more than once yields at most one message, at its first
    /// position in the request.
    async fn get(&self, keys: &[Identifier]) -> ReprocessResult<Vec<OutboundMessage>>;

    /// Number of requests that reached the slow request threshold so far
    fn slow_requests(&self) -> u64;
}

/// Build the configured cache proxy and verify it is reachable
///
/// `pool_size` is the number of concurrent callers the backend connection
/// pool should serve.
pub async fn connect_cache_proxy(
    config: &CacheConfig,
    pool_size: usize,
) -> ReprocessResult<Arc<dyn CacheProxy>> {
    info!(
        backend = %config.backend,
        host = %config.host,
        port = config.port,
        "Connecting to cache"
    );

    let proxy: Arc<dyn CacheProxy> = match config.backend {
        CacheBackendKind::Redis => Arc::new(RedisCacheProxy::connect(config).await?),
        CacheBackendKind::Postgres => {
            Arc::new(PostgresCacheProxy::connect(config, pool_size).await?)
        }
    };

    info!(backend = proxy.backend(), "Connected to cache");
    Ok(proxy)
}

// ============================================================================
// Shared backend helpers
// ============================================================================

/// Times backend requests and reports the slow ones
pub struct SlowRequestMonitor {
    backend: &'static str,
    threshold: Duration,
    count: AtomicU64,
}

impl SlowRequestMonitor {
    pub fn new(backend: &'static str, threshold: Duration) -> Self {
        Self {
            backend,
            threshold,
            count: AtomicU64::new(0),
        }
    }

    pub fn record(&self, operation: &'static str, items: usize, elapsed: Duration) {
        CACHE_REQUEST_DURATION_SECONDS
            .with_label_values(&[self.backend, operation])
            .observe(elapsed.as_secs_f64());

        if elapsed >= self.threshold {
            self.count.fetch_add(1, Ordering::Relaxed);
            CACHE_SLOW_REQUESTS_TOTAL
                .with_label_values(&[self.backend, operation])
                .inc();
            warn!(
                backend = self.backend,
                operation = operation,
                items = items,
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow cache request"
            );
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Turn raw backend fields into an outbound message
///
/// Returns None (after logging) when any field is missing or empty.
pub(crate) fn hydrate(
    id: &str,
    record_type: Option<String>,
    source: Option<String>,
    payload: Option<Bytes>,
) -> Option<OutboundMessage> {
    match CacheEntry::from_fields(record_type, source, payload) {
        Ok(entry) => Some(OutboundMessage::update(id, entry)),
        Err(field) => {
            CACHE_ENTRIES_DROPPED_TOTAL
                .with_label_values(&[field.as_str()])
                .inc();
            warn!(
                record_id = %id,
                field = %field,
                "Cache entry is incomplete, ignoring lookup"
            );
            None
        }
    }
}

/// Keys in first-seen order with duplicates removed
pub(crate) fn distinct_keys(keys: &[Identifier]) -> Vec<&str> {
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    keys.iter()
        .map(Identifier::as_str)
        .filter(|k| seen.insert(*k))
        .collect()
}
