//! Redis Streams support

use crate::{RedisClient, Result};
use redis::{streams::StreamReadReply, AsyncCommands, Value};
use std::collections::HashMap;

/// Entry in a Redis Stream (binary values)
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, Vec<u8>>,
}

impl StreamEntry {
    /// Field value as UTF-8 text, if present and valid
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Options for XREADGROUP
#[derive(Debug, Clone, Default)]
pub struct StreamReadOptions {
    /// Block for N milliseconds (None = no blocking)
    pub block: Option<u64>,
    /// Maximum number of entries to return
    pub count: Option<u64>,
}

impl RedisClient {
    // ============================================================================
    // Stream Operations
    // ============================================================================

    /// XADD - Add entry with binary field values
    ///
    /// Returns the generated ID
    pub async fn xadd(&mut self, stream_key: &str, fields: &[(&str, &[u8])]) -> Result<String> {
        self.connection_mut().xadd(stream_key, "*", fields).await
    }

    /// XGROUP CREATE ... MKSTREAM, treating an existing group as success
    pub async fn xgroup_create_mkstream(
        &mut self,
        stream_key: &str,
        group: &str,
        start_id: &str,
    ) -> Result<()> {
        let created: Result<()> = self
            .connection_mut()
            .xgroup_create_mkstream(stream_key, group, start_id)
            .await;

        match created {
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            other => other,
        }
    }

    /// XREADGROUP - Read from one stream as a group consumer
    ///
    /// `id` is ">" for new entries or a concrete id to replay this
    /// consumer's pending entries after that id. A blocking read that times
    /// out returns no entries.
    pub async fn xreadgroup(
        &mut self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        id: &str,
        options: StreamReadOptions,
    ) -> Result<Vec<StreamEntry>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);

        if let Some(count) = options.count {
            cmd.arg("COUNT").arg(count);
        }
        if let Some(block_ms) = options.block {
            cmd.arg("BLOCK").arg(block_ms);
        }

        cmd.arg("STREAMS").arg(stream_key).arg(id);

        let reply: Option<StreamReadReply> = cmd.query_async(self.connection_mut()).await?;

        let mut entries = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            for stream_id in stream_key.ids {
                let mut fields = HashMap::new();

                for (key, value) in stream_id.map.iter() {
                    let value_bytes = match value {
                        Value::BulkString(bytes) => bytes.clone(),
                        Value::SimpleString(s) => s.as_bytes().to_vec(),
                        Value::Int(i) => i.to_string().into_bytes(),
                        _ => continue, // Skip unsupported types
                    };
                    fields.insert(key.clone(), value_bytes);
                }

                entries.push(StreamEntry {
                    id: stream_id.id,
                    fields,
                });
            }
        }

        Ok(entries)
    }

    /// XACK - Acknowledge stream entries
    pub async fn xack(&mut self, stream_key: &str, group: &str, ids: &[&str]) -> Result<i64> {
        self.connection_mut().xack(stream_key, group, ids).await
    }

    /// XDEL - Delete stream entries
    pub async fn xdel(&mut self, stream_key: &str, ids: &[&str]) -> Result<i64> {
        self.connection_mut().xdel(stream_key, ids).await
    }

    /// XLEN - Get stream length
    pub async fn xlen(&mut self, stream_key: &str) -> Result<i64> {
        self.connection_mut().xlen(stream_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_group_read_ack_delete() -> Result<()> {
        let mut client = RedisClient::connect("redis://localhost:6379").await?;
        let stream_key = "test_group_stream";
        client.del(&[stream_key]).await?;

        client
            .xgroup_create_mkstream(stream_key, "workers", "0")
            .await?;
        // Second create is a no-op
        client
            .xgroup_create_mkstream(stream_key, "workers", "0")
            .await?;

        let binary = [0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        let id = client
            .xadd(stream_key, &[("event", b"{}".as_slice()), ("data", &binary)])
            .await?;

        let entries = client
            .xreadgroup(
                stream_key,
                "workers",
                "w1",
                ">",
                StreamReadOptions {
                    block: Some(1000),
                    count: Some(1),
                },
            )
            .await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].field_str("event"), Some("{}"));
        assert_eq!(entries[0].fields.get("data"), Some(&binary.to_vec()));

        // Unacknowledged entries are replayed from "0"
        let pending = client
            .xreadgroup(stream_key, "workers", "w1", "0", StreamReadOptions::default())
            .await?;
        assert_eq!(pending.len(), 1);

        assert_eq!(client.xack(stream_key, "workers", &[&id]).await?, 1);
        assert_eq!(client.xdel(stream_key, &[&id]).await?, 1);
        assert_eq!(client.xlen(stream_key).await?, 0);

        client.del(&[stream_key]).await?;

        Ok(())
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_blocking_read_times_out_empty() -> Result<()> {
        let mut client = RedisClient::connect("redis://localhost:6379").await?;
        let stream_key = "test_empty_group_stream";
        client.del(&[stream_key]).await?;
        client
            .xgroup_create_mkstream(stream_key, "workers", "$")
            .await?;

        let entries = client
            .xreadgroup(
                stream_key,
                "workers",
                "w1",
                ">",
                StreamReadOptions {
                    block: Some(100),
                    count: Some(1),
                },
            )
            .await?;
        assert!(entries.is_empty());

        client.del(&[stream_key]).await?;

        Ok(())
    }
}
