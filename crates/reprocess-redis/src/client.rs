//! Redis client implementation with connection management

use crate::Result;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::time::Duration;

/// Connection parameters given as discrete values instead of a URL
///
/// Credentials never pass through URL encoding this way.
#[derive(Clone, Debug)]
pub struct RedisEndpoint {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connect and response timeout
    pub timeout: Duration,
}

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Connect using discrete connection parameters
    pub async fn connect_with(endpoint: &RedisEndpoint) -> Result<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
            redis: RedisConnectionInfo {
                db: endpoint.db,
                username: endpoint.username.clone(),
                password: endpoint.password.clone(),
                ..Default::default()
            },
        };

        let client = redis::Client::open(info)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(endpoint.timeout)
            .set_response_timeout(endpoint.timeout);
        let conn = ConnectionManager::new_with_config(client, config).await?;
        Ok(Self { conn })
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    /// PING - round trip used as a startup health check
    pub async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    // ============================================================================
    // Key Operations
    // ============================================================================

    /// EXISTS - Count how many of the given keys exist
    ///
    /// A key listed twice is counted twice.
    pub async fn exists_count(&mut self, keys: &[&str]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        redis::cmd("EXISTS").arg(keys).query_async(&mut self.conn).await
    }

    /// EXISTS per key in a single pipeline, answers in input order
    pub async fn exists_each(&mut self, keys: &[&str]) -> Result<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("EXISTS").arg(*key);
        }
        pipe.query_async(&mut self.conn).await
    }

    /// DEL - Delete one or more keys
    pub async fn del(&mut self, keys: &[&str]) -> Result<i64> {
        self.conn.del(keys).await
    }

    // ============================================================================
    // Hash Operations
    // ============================================================================

    /// HMGET for many keys in a single pipeline
    ///
    /// Returns one row per key (input order), one slot per field. Missing
    /// keys and missing fields come back as None.
    pub async fn hmget_many(
        &mut self,
        keys: &[&str],
        fields: &[&str],
    ) -> Result<Vec<Vec<Option<Vec<u8>>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HMGET").arg(*key).arg(fields);
        }
        pipe.query_async(&mut self.conn).await
    }

    /// HSET with several field/value pairs
    pub async fn hset_multiple(&mut self, key: &str, items: &[(&str, &[u8])]) -> Result<()> {
        self.conn.hset_multiple(key, items).await
    }
}
