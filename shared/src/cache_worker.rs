// ============================================================================
// Cache-Lookup Stage
// ============================================================================
//
// BatchHandler for the cache pool: hydrates a batch of identifiers through
// the Cache Proxy and forwards each complete message to the delivery
// channel. Identifiers without a complete entry were already logged and
// dropped by the proxy.
//
// ============================================================================

use crate::batching::BatchHandler;
use crate::cache_proxy::CacheProxy;
use async_trait::async_trait;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_types::{Identifier, OutboundMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub struct CacheLookupHandler {
    cache: Arc<dyn CacheProxy>,
    outbound: mpsc::Sender<OutboundMessage>,
}

impl CacheLookupHandler {
    pub fn new(cache: Arc<dyn CacheProxy>, outbound: mpsc::Sender<OutboundMessage>) -> Self {
        Self { cache, outbound }
    }
}

#[async_trait]
impl BatchHandler<Identifier> for CacheLookupHandler {
    async fn handle(&self, batch: Vec<Identifier>) -> ReprocessResult<()> {
        let messages = self.cache.get(&batch).await?;

        debug!(
            requested = batch.len(),
            hydrated = messages.len(),
            "Cache batch hydrated"
        );

        for message in messages {
            self.outbound
                .send(message)
                .await
                .map_err(|_| ReprocessError::ChannelClosed("outbound"))?;
        }
        Ok(())
    }
}
