// ============================================================================
// In-Memory Cache Backend
// ============================================================================
//
// HashMap-backed cache for tests and local runs. Entries may be stored with
// missing fields to exercise the completeness check, and the backend can be
// switched "unreachable" to produce transport errors.
//
// ============================================================================

use super::{CacheProxy, SlowRequestMonitor, distinct_keys, hydrate};
use async_trait::async_trait;
use bytes::Bytes;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_types::{Identifier, IdentifierShape, OutboundMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const BACKEND: &str = "memory";
const DEFAULT_MAX_KEYS_PER_REQUEST: usize = 1000;

#[derive(Debug, Clone, Default)]
struct StoredEntry {
    record_type: Option<String>,
    source: Option<String>,
    payload: Option<Bytes>,
}

pub struct MemoryCacheProxy {
    entries: Mutex<HashMap<String, StoredEntry>>,
    max_batch_size: usize,
    shape: IdentifierShape,
    unavailable: AtomicBool,
    /// Key count of every backend request, in call order
    requests: Mutex<Vec<usize>>,
    monitor: SlowRequestMonitor,
}

impl Default for MemoryCacheProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheProxy {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_KEYS_PER_REQUEST)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_batch_size: max_batch_size.max(1),
            shape: IdentifierShape::default(),
            unavailable: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            monitor: SlowRequestMonitor::new(BACKEND, Duration::from_millis(100)),
        }
    }

    /// Store a complete entry
    pub fn insert(
        &self,
        id: &str,
        record_type: &str,
        source: &str,
        payload: impl Into<Bytes>,
    ) {
        self.insert_fields(
            id,
            Some(record_type.to_string()),
            Some(source.to_string()),
            Some(payload.into()),
        );
    }

    /// Store an entry whose fields may be missing
    pub fn insert_fields(
        &self,
        id: &str,
        record_type: Option<String>,
        source: Option<String>,
        payload: Option<Bytes>,
    ) {
        self.lock_entries().insert(
            id.to_string(),
            StoredEntry {
                record_type,
                source,
                payload,
            },
        );
    }

    /// Make every following request fail with a transport error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Key counts of the backend requests made so far
    pub fn requests(&self) -> Vec<usize> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_request(&self, keys: usize) -> ReprocessResult<Instant> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(keys);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReprocessError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory cache is unavailable",
            )));
        }
        Ok(Instant::now())
    }
}

#[async_trait]
impl CacheProxy for MemoryCacheProxy {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn identifier_shape(&self) -> IdentifierShape {
        self.shape
    }

    async fn exists(&self, keys: &[Identifier]) -> ReprocessResult<()> {
        let keys = distinct_keys(keys);
        let mut missing = Vec::new();

        for chunk in keys.chunks(self.max_batch_size) {
            let start = self.begin_request(chunk.len())?;
            let entries = self.lock_entries();
            missing.extend(
                chunk
                    .iter()
                    .filter(|k| !entries.contains_key(**k))
                    .map(|k| k.to_string()),
            );
            self.monitor.record("exists", chunk.len(), start.elapsed());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReprocessError::NotInCache { missing })
        }
    }

    async fn get(&self, keys: &[Identifier]) -> ReprocessResult<Vec<OutboundMessage>> {
        let keys = distinct_keys(keys);
        let mut messages = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(self.max_batch_size) {
            let start = self.begin_request(chunk.len())?;
            let found: Vec<(String, StoredEntry)> = {
                let entries = self.lock_entries();
                chunk
                    .iter()
                    .filter_map(|k| entries.get(*k).map(|e| (k.to_string(), e.clone())))
                    .collect()
            };
            self.monitor.record("get", chunk.len(), start.elapsed());

            messages.extend(found.into_iter().filter_map(|(id, e)| {
                hydrate(&id, e.record_type, e.source, e.payload)
            }));
        }

        Ok(messages)
    }

    fn slow_requests(&self) -> u64 {
        self.monitor.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<Identifier> {
        raw.iter()
            .map(|r| Identifier::parse(r, IdentifierShape::default()).unwrap())
            .collect()
    }

    fn seeded() -> MemoryCacheProxy {
        let cache = MemoryCacheProxy::new();
        cache.insert("u1", "marc", "sirsi", "one");
        cache.insert("u2", "marc", "sirsi", "two");
        cache.insert("u3", "marc", "hathi", "three");
        cache
    }

    #[tokio::test]
    async fn test_exists_all_present() {
        seeded().exists(&ids(&["u1", "u2", "u3"])).await.unwrap();
    }

    #[tokio::test]
    async fn test_exists_names_missing_keys() {
        let err = seeded()
            .exists(&ids(&["u1", "u9", "u2", "u8"]))
            .await
            .unwrap_err();

        match err {
            ReprocessError::NotInCache { missing } => assert_eq!(missing, vec!["u9", "u8"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_drops_incomplete_entries() {
        let cache = seeded();
        cache.insert_fields(
            "u4",
            Some("marc".to_string()),
            Some(String::new()),
            Some(Bytes::from("four")),
        );
        cache.insert_fields("u5", Some("marc".to_string()), Some("sirsi".to_string()), None);

        let messages = cache.get(&ids(&["u1", "u4", "u5", "u2", "u7"])).await.unwrap();
        let got: Vec<&str> = messages.iter().filter_map(|m| m.record_id()).collect();
        assert_eq!(got, vec!["u1", "u2"]);
        assert_eq!(messages[0].payload(), &Bytes::from("one"));
        assert_eq!(messages[0].attribute("source"), Some("sirsi"));
    }

    #[tokio::test]
    async fn test_requests_are_chunked_to_backend_maximum() {
        let cache = MemoryCacheProxy::with_max_batch_size(2);
        for i in 0..5 {
            cache.insert(&format!("u{i}"), "marc", "sirsi", "x");
        }

        let keys = ids(&["u0", "u1", "u2", "u3", "u4"]);
        cache.exists(&keys).await.unwrap();
        assert_eq!(cache.get(&keys).await.unwrap().len(), 5);
        assert_eq!(cache.requests(), vec![2, 2, 1, 2, 2, 1]);
    }

    #[tokio::test]
    async fn test_get_collapses_duplicate_keys() {
        let cache = MemoryCacheProxy::with_max_batch_size(2);
        cache.insert("u1", "marc", "sirsi", "one");
        cache.insert("u2", "marc", "sirsi", "two");

        let messages = cache.get(&ids(&["u2", "u1", "u2", "u1", "u2"])).await.unwrap();
        let got: Vec<&str> = messages.iter().filter_map(|m| m.record_id()).collect();
        assert_eq!(got, vec!["u2", "u1"]);
        assert_eq!(cache.requests(), vec![2]);
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_transport_error() {
        let cache = seeded();
        cache.set_unavailable(true);

        let err = cache.get(&ids(&["u1"])).await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(
            cache.exists(&ids(&["u1"])).await,
            Err(ReprocessError::Io(_))
        ));
    }
}
