// ============================================================================
// Delivery Stage
// ============================================================================
//
// BatchHandler for the send pool: publishes a batch of hydrated messages to
// the outbound queue.
//
// Publish results:
// - every message accepted        -> done
// - some messages rejected        -> republish only the rejected ones, up to
//                                    `retries` more times
// - still rejected after retries  -> DeliveryExhausted (fatal)
// - the request itself failed     -> transport error (fatal, no retry)
//
// Nothing is dropped silently: a batch either lands completely or the
// worker stops with an error.
//
// ============================================================================

use crate::batching::BatchHandler;
use crate::queue::OutboundQueue;
use async_trait::async_trait;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_metrics::{MESSAGES_PUBLISHED_TOTAL, PUBLISH_RETRIES_TOTAL};
use reprocess_types::OutboundMessage;
use std::sync::Arc;
use tracing::{error, warn};

pub struct DeliveryHandler {
    queue: Arc<dyn OutboundQueue>,
    retries: u32,
}

impl DeliveryHandler {
    pub fn new(queue: Arc<dyn OutboundQueue>, retries: u32) -> Self {
        Self { queue, retries }
    }
}

#[async_trait]
impl BatchHandler<OutboundMessage> for DeliveryHandler {
    async fn handle(&self, batch: Vec<OutboundMessage>) -> ReprocessResult<()> {
        publish_with_retry(self.queue.as_ref(), batch, self.retries).await
    }
}

/// Publish a batch, retrying the rejected subset up to `retries` times
pub async fn publish_with_retry(
    queue: &dyn OutboundQueue,
    batch: Vec<OutboundMessage>,
    retries: u32,
) -> ReprocessResult<()> {
    let mut pending = batch;
    let mut attempt: u32 = 0;

    while !pending.is_empty() {
        let outcome = queue.publish(&pending).await?;

        if outcome.statuses.len() != pending.len() {
            return Err(ReprocessError::internal(format!(
                "publish returned {} statuses for {} messages",
                outcome.statuses.len(),
                pending.len()
            )));
        }

        MESSAGES_PUBLISHED_TOTAL.inc_by(outcome.accepted() as u64);
        if outcome.is_complete() {
            return Ok(());
        }

        let rejected: Vec<OutboundMessage> = pending
            .into_iter()
            .zip(outcome.statuses)
            .filter_map(|(message, ok)| (!ok).then_some(message))
            .collect();

        if attempt >= retries {
            error!(
                failed = rejected.len(),
                retries = retries,
                "Messages still rejected, giving up"
            );
            return Err(ReprocessError::DeliveryExhausted {
                failed: rejected.len(),
                retries,
            });
        }

        attempt += 1;
        PUBLISH_RETRIES_TOTAL.inc();
        warn!(
            failed = rejected.len(),
            retry = attempt,
            max_retries = retries,
            "Some messages were rejected, retrying them"
        );
        pending = rejected;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryOutboundQueue;
    use bytes::Bytes;
    use reprocess_types::CacheEntry;

    fn messages(n: usize) -> Vec<OutboundMessage> {
        (0..n)
            .map(|i| {
                OutboundMessage::update(
                    &format!("u{i}"),
                    CacheEntry {
                        record_type: "marc".to_string(),
                        source: "sirsi".to_string(),
                        payload: Bytes::from(format!("payload {i}")),
                    },
                )
            })
            .collect()
    }

    fn ids(batch: &[OutboundMessage]) -> Vec<String> {
        batch
            .iter()
            .map(|m| m.record_id().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_full_acceptance_publishes_once() {
        let queue = MemoryOutboundQueue::new();

        publish_with_retry(&queue, messages(10), 3).await.unwrap();

        assert_eq!(queue.requests().len(), 1);
        assert_eq!(queue.published().len(), 10);
    }

    #[tokio::test]
    async fn test_partial_failure_retries_only_rejected() {
        let queue = MemoryOutboundQueue::new();
        queue.reject_next(vec![3, 7]);

        publish_with_retry(&queue, messages(10), 3).await.unwrap();

        let requests = queue.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].len(), 10);
        assert_eq!(ids(&requests[1]), vec!["u3", "u7"]);
        assert_eq!(queue.published().len(), 10);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_fatal() {
        let queue = MemoryOutboundQueue::new();
        queue.reject_everything(true);

        let err = publish_with_retry(&queue, messages(4), 3).await.unwrap_err();

        assert!(matches!(
            err,
            ReprocessError::DeliveryExhausted {
                failed: 4,
                retries: 3
            }
        ));
        assert!(!err.is_recoverable());
        // First attempt plus three retries
        assert_eq!(queue.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_shrinking_rejections_recover() {
        let queue = MemoryOutboundQueue::new();
        queue.reject_next(vec![0, 1, 2]);
        queue.reject_next(vec![1]);

        publish_with_retry(&queue, messages(5), 3).await.unwrap();

        let requests = queue.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(ids(&requests[1]), vec!["u0", "u1", "u2"]);
        assert_eq!(ids(&requests[2]), vec!["u1"]);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let queue = MemoryOutboundQueue::new();
        queue.set_unavailable(true);

        let err = publish_with_retry(&queue, messages(3), 3).await.unwrap_err();

        assert!(matches!(err, ReprocessError::QueueTransport(_)));
        assert_eq!(queue.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_on_first_rejection() {
        let queue = MemoryOutboundQueue::new();
        queue.reject_next(vec![0]);

        let err = publish_with_retry(&queue, messages(2), 0).await.unwrap_err();

        assert!(matches!(
            err,
            ReprocessError::DeliveryExhausted { failed: 1, retries: 0 }
        ));
        assert_eq!(queue.requests().len(), 1);
    }
}
