// ============================================================================
// PostgreSQL Cache Backend
// ============================================================================
//
// One row per record in the configured table (id, "type", source, payload).
//
// exists(): SELECT DISTINCT id ... WHERE id = ANY($1). Every requested id
// must come back; the difference between the requested and returned sets is
// reported as missing.
// get():    SELECT id, "type", source, payload ... WHERE id = ANY($1). NULL
// or empty columns make the row incomplete, and it is dropped.
//
// ============================================================================

use super::{CacheProxy, SlowRequestMonitor, distinct_keys, hydrate};
use async_trait::async_trait;
use bytes::Bytes;
use reprocess_config::CacheConfig;
use reprocess_db::{CacheRow, DbConfig, DbPool};
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_types::{Identifier, OutboundMessage};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{error, info};

const BACKEND: &str = "postgres";

/// Ids bound into one ANY($1) array
const MAX_KEYS_PER_REQUEST: usize = 1000;

/// Role used when the credentials carry only a password
const DEFAULT_USERNAME: &str = "postgres";

pub struct PostgresCacheProxy {
    pool: DbPool,
    table: String,
    monitor: SlowRequestMonitor,
}

impl PostgresCacheProxy {
    pub async fn connect(config: &CacheConfig, pool_size: usize) -> ReprocessResult<Self> {
        let table = config
            .table
            .clone()
            .ok_or_else(|| ReprocessError::config("postgres cache backend needs a table name"))?;

        let db_config = DbConfig {
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config
                .credentials
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: config.credentials.password.expose().to_string(),
            max_connections: pool_size.max(1) as u32,
            acquire_timeout: config.timeout,
        };

        let pool = reprocess_db::create_pool(&db_config).await?;
        info!(
            host = %config.host,
            database = %config.database,
            table = %table,
            "PostgreSQL cache reachable"
        );

        Ok(Self {
            pool,
            table,
            monitor: SlowRequestMonitor::new(BACKEND, config.slow_request_threshold),
        })
    }

    /// Pool shared by every cache worker
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn missing_in_chunk(&self, keys: &[&str]) -> ReprocessResult<Vec<String>> {
        let ids: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        let start = Instant::now();
        let found = reprocess_db::existing_ids(&self.pool, &self.table, &ids).await?;
        self.monitor.record("exists", ids.len(), start.elapsed());

        if found.len() >= ids.len() {
            return Ok(Vec::new());
        }

        let found: HashSet<String> = found.into_iter().collect();
        Ok(ids.into_iter().filter(|id| !found.contains(id)).collect())
    }

    async fn get_chunk(&self, keys: &[&str]) -> ReprocessResult<Vec<OutboundMessage>> {
        let ids: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        let start = Instant::now();
        let rows = reprocess_db::fetch_rows(&self.pool, &self.table, &ids).await?;
        self.monitor.record("select", ids.len(), start.elapsed());

        let mut by_id: HashMap<String, CacheRow> =
            rows.into_iter().map(|row| (row.id.clone(), row)).collect();

        // Keep the caller's order
        let messages = keys
            .iter()
            .filter_map(|key| by_id.remove(*key))
            .filter_map(|row| {
                hydrate(
                    &row.id,
                    row.record_type,
                    row.source,
                    row.payload.map(Bytes::from),
                )
            })
            .collect();

        Ok(messages)
    }
}

#[async_trait]
impl CacheProxy for PostgresCacheProxy {
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

        error!(
            table = %self.table,
            requested = keys.len(),
            missing = missing.len(),
            "One or more ids are not in the cache table"
        );
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
