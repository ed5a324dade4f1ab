// ============================================================================
// Redis Streams Queue Transport
// ============================================================================
//
// Inbound stream, read through a consumer group:
//   XREADGROUP GROUP <group> <consumer> COUNT 1 BLOCK <poll ms> STREAMS <in> >
// Each entry has an "event" field holding the object store event JSON.
// The entry id is the receipt handle; delete = XACK + XDEL.
//
// Entries this consumer read but never deleted (a crash between receive and
// delete, or a rejected notification) stay pending. They are replayed once,
// oldest first, before new entries are read.
//
// Outbound stream: one XADD per message, all messages of a batch issued
// concurrently over the multiplexed connection. Each XADD succeeds or fails
// on its own; only a batch where every XADD failed on the connection itself
// counts as a transport failure.
//
// ============================================================================

use super::{InboundBatch, InboundQueue, OutboundQueue, PayloadOffloader, PublishOutcome};
use async_trait::async_trait;
use futures_util::future::join_all;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_redis::{RedisClient, RedisError, StreamEntry, StreamReadOptions};
use reprocess_types::{Notification, OutboundMessage, ReceiptHandle};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Stream field carrying the event JSON
pub const EVENT_FIELD: &str = "event";
/// Stream field carrying the message body
pub const PAYLOAD_FIELD: &str = "payload";

/// Read position meaning "entries never delivered to this group"
const NEW_ENTRIES: &str = ">";

pub struct RedisInboundQueue {
    client: RedisClient,
    stream: String,
    group: String,
    consumer: String,
    /// Position inside this consumer's pending entries; None once replayed
    replay_cursor: Mutex<Option<String>>,
}

impl RedisInboundQueue {
    /// Connect and make sure the consumer group exists
    pub async fn connect(
        url: &str,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> ReprocessResult<Self> {
        let client = RedisClient::connect(url).await?;
        Self::with_client(client, stream, group, consumer).await
    }

    pub async fn with_client(
        mut client: RedisClient,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> ReprocessResult<Self> {
        let stream = stream.into();
        let group = group.into();
        let consumer = consumer.into();

        client.xgroup_create_mkstream(&stream, &group, "0").await?;
        info!(
            stream = %stream,
            group = %group,
            consumer = %consumer,
            "Inbound queue ready"
        );

        Ok(Self {
            client,
            stream,
            group,
            consumer,
            replay_cursor: Mutex::new(Some("0".to_string())),
        })
    }

    async fn read(&self, id: &str, block: Option<u64>) -> ReprocessResult<Option<StreamEntry>> {
        let mut client = self.client.clone();
        let entries = client
            .xreadgroup(
                &self.stream,
                &self.group,
                &self.consumer,
                id,
                StreamReadOptions {
                    block,
                    count: Some(1),
                },
            )
            .await?;
        Ok(entries.into_iter().next())
    }

    /// Next pending entry left over from an earlier run, if any
    async fn next_pending(&self) -> ReprocessResult<Option<StreamEntry>> {
        let mut cursor = self.replay_cursor.lock().await;
        let Some(after) = cursor.clone() else {
            return Ok(None);
        };

        match self.read(&after, None).await? {
            Some(entry) => {
                info!(entry_id = %entry.id, "Replaying pending inbound notification");
                *cursor = Some(entry.id.clone());
                Ok(Some(entry))
            }
            None => {
                *cursor = None;
                Ok(None)
            }
        }
    }

    /// Parse an entry; malformed entries are logged and left pending
    fn parse(&self, entry: StreamEntry) -> Option<InboundBatch> {
        let Some(body) = entry.field_str(EVENT_FIELD) else {
            warn!(
                stream = %self.stream,
                entry_id = %entry.id,
                "Inbound entry has no event field, leaving it pending"
            );
            return None;
        };

        match Notification::parse_event(body) {
            Ok(notifications) => Some(InboundBatch {
                notifications,
                receipt: ReceiptHandle(entry.id),
            }),
            Err(e) => {
                let err = ReprocessError::malformed_notification(e.to_string());
                warn!(
                    stream = %self.stream,
                    entry_id = %entry.id,
                    error = %err,
                    "Inbound entry is not a valid event, leaving it pending"
                );
                None
            }
        }
    }
}

/// BLOCK argument for a receive wait. BLOCK 0 waits forever, so a zero wait
/// is sent without BLOCK and a sub-millisecond one is rounded up.
fn block_millis(wait: Duration) -> Option<u64> {
    if wait.is_zero() {
        None
    } else {
        Some((wait.as_millis() as u64).max(1))
    }
}

#[async_trait]
impl InboundQueue for RedisInboundQueue {
    async fn receive(&self, wait: Duration) -> ReprocessResult<Option<InboundBatch>> {
        let entry = match self.next_pending().await? {
            Some(entry) => Some(entry),
            None => self.read(NEW_ENTRIES, block_millis(wait)).await?,
        };

        Ok(entry.and_then(|e| self.parse(e)))
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> ReprocessResult<()> {
        let mut client = self.client.clone();
        client
            .xack(&self.stream, &self.group, &[receipt.as_str()])
            .await?;
        client.xdel(&self.stream, &[receipt.as_str()]).await?;
        debug!(stream = %self.stream, receipt = %receipt, "Inbound notification deleted");
        Ok(())
    }
}

pub struct RedisOutboundQueue {
    client: RedisClient,
    stream: String,
    offloader: Option<PayloadOffloader>,
}

impl RedisOutboundQueue {
    /// Connect on a connection of its own
    pub async fn connect(url: &str, stream: impl Into<String>) -> ReprocessResult<Self> {
        let client = RedisClient::connect(url).await?;
        Ok(Self::new(client, stream))
    }

    pub fn new(client: RedisClient, stream: impl Into<String>) -> Self {
        Self {
            client,
            stream: stream.into(),
            offloader: None,
        }
    }

    /// Send payloads above the inline limit through the message bucket
    pub fn with_offloader(mut self, offloader: PayloadOffloader) -> Self {
        self.offloader = Some(offloader);
        self
    }

    async fn publish_one(&self, message: &OutboundMessage) -> Result<String, PublishError> {
        let message = match &self.offloader {
            Some(offloader) => offloader
                .prepare(message)
                .await
                .map_err(PublishError::Offload)?,
            None => message.clone(),
        };

        let mut fields: Vec<(&str, &[u8])> = message
            .attributes()
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_bytes()))
            .collect();
        fields.push((PAYLOAD_FIELD, message.payload().as_ref()));

        let mut client = self.client.clone();
        client
            .xadd(&self.stream, &fields)
            .await
            .map_err(PublishError::Redis)
    }
}

enum PublishError {
    Redis(RedisError),
    Offload(ReprocessError),
}

impl PublishError {
    fn is_connection_failure(&self) -> bool {
        match self {
            PublishError::Redis(e) => {
                e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
            }
            PublishError::Offload(_) => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            PublishError::Redis(e) => e.to_string(),
            PublishError::Offload(e) => e.to_string(),
        }
    }
}

/// Reason to report when every XADD of a non-empty batch failed on the
/// connection itself
fn connection_lost<T>(results: &[Result<T, PublishError>]) -> Option<String> {
    let mut reason = None;
    for result in results {
        match result {
            Err(e) if e.is_connection_failure() => {
                reason.get_or_insert_with(|| e.describe());
            }
            _ => return None,
        }
    }
    reason
}

#[async_trait]
impl OutboundQueue for RedisOutboundQueue {
    async fn publish(&self, batch: &[OutboundMessage]) -> ReprocessResult<PublishOutcome> {
        let results = join_all(batch.iter().map(|m| self.publish_one(m))).await;

        if let Some(reason) = connection_lost(&results) {
            return Err(ReprocessError::queue_transport(format!(
                "publish to {} failed: {}",
                self.stream, reason
            )));
        }

        let statuses = batch
            .iter()
            .zip(&results)
            .map(|(message, result)| match result {
                Ok(_) => true,
                Err(e) => {
                    warn!(
                        stream = %self.stream,
                        record_id = message.record_id().unwrap_or(""),
                        error = %e.describe(),
                        "Outbound message rejected"
                    );
                    false
                }
            })
            .collect();

        Ok(PublishOutcome { statuses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> PublishError {
        PublishError::Redis(RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    fn offload_failed() -> PublishError {
        PublishError::Offload(ReprocessError::config("bucket unavailable"))
    }

    #[test]
    fn test_all_connection_failures_lose_the_batch() {
        let results: Vec<Result<String, PublishError>> = vec![Err(refused()), Err(refused())];
        assert!(connection_lost(&results).is_some_and(|r| r.contains("refused")));
    }

    #[test]
    fn test_partial_failure_is_not_a_lost_connection() {
        let results = vec![Ok("1-0".to_string()), Err(refused())];
        assert_eq!(connection_lost(&results), None);

        let results: Vec<Result<String, PublishError>> = vec![Err(refused()), Err(offload_failed())];
        assert_eq!(connection_lost(&results), None);

        let results: Vec<Result<String, PublishError>> = Vec::new();
        assert_eq!(connection_lost(&results), None);
    }

    #[test]
    fn test_zero_wait_never_blocks_forever() {
        assert_eq!(block_millis(Duration::ZERO), None);
        assert_eq!(block_millis(Duration::from_micros(200)), Some(1));
        assert_eq!(block_millis(Duration::from_secs(20)), Some(20_000));
    }
}
