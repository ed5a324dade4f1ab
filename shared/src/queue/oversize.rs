// ============================================================================
// Oversize Payload Offload
// ============================================================================
//
// Queue entries are limited in size. A payload above the inline limit is
// written to the message bucket and the message travels with two extra
// attributes naming where the payload went, and an empty body.
//
// ============================================================================

use bytes::Bytes;
use object_store::ObjectStore;
use object_store::path::Path;
use reprocess_error::ReprocessResult;
use reprocess_metrics::OVERSIZE_PAYLOADS_TOTAL;
use reprocess_types::{Attribute, OutboundMessage};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Largest payload carried inline in a queue entry
pub const MAX_INLINE_PAYLOAD_BYTES: usize = 256 * 1024;

/// Attribute naming the bucket holding an offloaded payload
pub const ATTRIBUTE_PAYLOAD_BUCKET: &str = "payload-bucket";
/// Attribute naming the key of an offloaded payload
pub const ATTRIBUTE_PAYLOAD_KEY: &str = "payload-key";

pub struct PayloadOffloader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    limit: usize,
}

impl PayloadOffloader {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self::with_limit(store, bucket, MAX_INLINE_PAYLOAD_BYTES)
    }

    pub fn with_limit(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, limit: usize) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            limit,
        }
    }

    /// Return the message as it should be enqueued
    ///
    /// Small messages come back unchanged (cheap clone of the payload).
    pub async fn prepare(&self, message: &OutboundMessage) -> ReprocessResult<OutboundMessage> {
        if message.payload().len() <= self.limit {
            return Ok(message.clone());
        }

        let key = format!(
            "{}/{}",
            message.record_id().unwrap_or("unknown"),
            Uuid::new_v4()
        );
        self.store
            .put(&Path::from(key.as_str()), message.payload().clone().into())
            .await?;

        OVERSIZE_PAYLOADS_TOTAL.inc();
        debug!(
            bucket = %self.bucket,
            key = %key,
            size = message.payload().len(),
            "Payload offloaded to message bucket"
        );

        let mut attributes = message.attributes().to_vec();
        attributes.push(Attribute::new(ATTRIBUTE_PAYLOAD_BUCKET, self.bucket.as_str()));
        attributes.push(Attribute::new(ATTRIBUTE_PAYLOAD_KEY, key));
        Ok(OutboundMessage::new(attributes, Bytes::new()))
    }
}
