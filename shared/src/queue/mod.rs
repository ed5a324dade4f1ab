// ============================================================================
// Queue Transport
// ============================================================================
//
// Inbound: notifications that manifest files were written to the object
// store. A received batch carries a receipt handle; the batch is deleted
// through that handle only after every referenced file passed validation.
// A batch that is never deleted is delivered again later.
//
// Outbound: hydrated records, published in batches of at most
// `max_batch_size()`. The result separates two failure modes:
// - Err(..)                 the whole request failed (transport error)
// - Ok(PublishOutcome)      per-message status; some may be rejected
//
// ============================================================================

pub mod memory;
pub mod oversize;
pub mod redis_streams;

pub use memory::{MemoryInboundQueue, MemoryOutboundQueue};
pub use oversize::PayloadOffloader;
pub use redis_streams::{RedisInboundQueue, RedisOutboundQueue};

use async_trait::async_trait;
use reprocess_error::ReprocessResult;
use reprocess_types::{Notification, OutboundMessage, ReceiptHandle};
use std::time::Duration;

/// Largest outbound batch accepted in one publish request
pub const OUTBOUND_MAX_BATCH_SIZE: usize = 10;

/// One inbound message: the files it references and its delete handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundBatch {
    pub notifications: Vec<Notification>,
    pub receipt: ReceiptHandle,
}

#[async_trait]
pub trait InboundQueue: Send + Sync {
    /// Wait up to `wait` for the next message; Ok(None) when none arrived
    async fn receive(&self, wait: Duration) -> ReprocessResult<Option<InboundBatch>>;

    /// Remove an accepted message for good
    async fn delete(&self, receipt: &ReceiptHandle) -> ReprocessResult<()>;
}

/// Per-message result of one publish request, in request order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub statuses: Vec<bool>,
}

impl PublishOutcome {
    pub fn accepted(&self) -> usize {
        self.statuses.iter().filter(|ok| **ok).count()
    }

    pub fn is_complete(&self) -> bool {
        self.statuses.iter().all(|ok| *ok)
    }
}

#[async_trait]
pub trait OutboundQueue: Send + Sync {
    fn max_batch_size(&self) -> usize {
        OUTBOUND_MAX_BATCH_SIZE
    }

    async fn publish(&self, batch: &[OutboundMessage]) -> ReprocessResult<PublishOutcome>;
}
