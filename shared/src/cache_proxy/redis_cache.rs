// ============================================================================
// Redis Cache Backend
// ============================================================================
//
// One hash per record, keyed by the identifier itself:
//
//   HSET u1234 type marc source sirsi payload <bytes>
//
// exists(): one EXISTS over the whole chunk. Only when the count comes back
// short is a per-key EXISTS pipeline issued to name the missing keys.
// get():    one pipeline of HMGET type source payload, one per key.
//
// ============================================================================

use super::{CacheProxy, SlowRequestMonitor, distinct_keys, hydrate};
use async_trait::async_trait;
use bytes::Bytes;
use reprocess_config::CacheConfig;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_redis::{RedisClient, RedisEndpoint};
use reprocess_types::{CacheField, Identifier, OutboundMessage};
use std::time::Instant;
use tracing::{error, info};

const BACKEND: &str = "redis";

/// Keys per EXISTS / HMGET pipeline
const MAX_KEYS_PER_REQUEST: usize = 500;

pub struct RedisCacheProxy {
    client: RedisClient,
    monitor: SlowRequestMonitor,
}

impl RedisCacheProxy {
    /// Connect and PING the cache
    pub async fn connect(config: &CacheConfig) -> ReprocessResult<Self> {
        let db: i64 = config.database.parse().map_err(|_| {
            ReprocessError::config(format!(
                "redis database must be a number, got '{}'",
                config.database
            ))
        })?;

        let endpoint = RedisEndpoint {
            host: config.host.clone(),
            port: config.port,
            db,
            username: config.credentials.username.clone(),
            password: Some(config.credentials.password.expose().to_string())
                .filter(|p| !p.is_empty()),
            timeout: config.timeout,
        };

        let mut client = RedisClient::connect_with(&endpoint).await?;
        client.ping().await?;
        info!(host = %config.host, port = config.port, db = db, "Redis cache reachable");

        Ok(Self::from_client(client, config))
    }

    pub fn from_client(client: RedisClient, config: &CacheConfig) -> Self {
        Self {
            client,
            monitor: SlowRequestMonitor::new(BACKEND, config.slow_request_threshold),
        }
    }

    /// Missing keys of one chunk (empty when all exist)
    async fn missing_in_chunk(&self, keys: &[&str]) -> ReprocessResult<Vec<String>> {
        let mut client = self.client.clone();

        let start = Instant::now();
        let found = client.exists_count(keys).await?;
        self.monitor.record("exists", keys.len(), start.elapsed());

        if found >= keys.len() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let each = client.exists_each(keys).await?;
        self.monitor.record("exists_each", keys.len(), start.elapsed());

        Ok(keys
            .iter()
            .zip(each)
            .filter(|(_, present)| !present)
            .map(|(key, _)| key.to_string())
            .collect())
    }

    async fn get_chunk(&self, keys: &[&str]) -> ReprocessResult<Vec<OutboundMessage>> {
        let mut client = self.client.clone();
        let fields: Vec<&str> = CacheField::ALL.iter().map(CacheField::as_str).collect();

        let start = Instant::now();
        let rows = client.hmget_many(keys, &fields).await?;
        self.monitor.record("hmget", keys.len(), start.elapsed());

        let messages = keys
            .iter()
            .zip(rows)
            .filter_map(|(key, row)| {
                let mut values = row.into_iter();
                let record_type = values.next().flatten().map(lossy_string);
                let source = values.next().flatten().map(lossy_string);
                let payload = values.next().flatten().map(Bytes::from);
                hydrate(key, record_type, source, payload)
            })
            .collect();

        Ok(messages)
    }
}

fn lossy_string(raw: Vec<u8>) -> String {
    String::from_utf8_lossy(&raw).into_owned()
}

#[async_trait]
impl CacheProxy for RedisCacheProxy {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn max_batch_size(&self) -> usize {
        MAX_KEYS_PER_REQUEST
    }

    async fn exists(&self, keys: &[Identifier]) -> ReprocessResult<()> {
        let keys = distinct_keys(keys);
        let mut missing = Vec::new();

        for chunk in keys.chunks(MAX_KEYS_PER_REQUEST) {
            missing.extend(self.missing_in_chunk(chunk).await?);
        }

        if missing.is_empty() {
            return Ok(());
        }

        for key in &missing {
            error!(record_id = %key, "Key does not exist in the cache");
        }
        Err(ReprocessError::NotInCache { missing })
    }

    async fn get(&self, keys: &[Identifier]) -> ReprocessResult<Vec<OutboundMessage>> {
        let keys = distinct_keys(keys);
        let mut messages = Vec::with_capacity(keys.len());

        for chunk in keys.chunks(MAX_KEYS_PER_REQUEST) {
            messages.extend(self.get_chunk(chunk).await?);
        }

        Ok(messages)
    }

    fn slow_requests(&self) -> u64 {
        self.monitor.count()
    }
}
