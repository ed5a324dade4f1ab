// ============================================================================
// Worker Pipeline
// ============================================================================
//
//   feeder ──> [inbound channel] ──> cache workers (get, N per batch)
//                                        │
//                                        v
//              [outbound channel] ──> send workers (publish, M per batch)
//
// Both channels are bounded: when delivery falls behind, the cache workers
// block on the outbound channel and the feeder blocks on the inbound one.
//
// Shutdown is a drain: dropping every feeder closes the inbound channel,
// the cache workers flush and exit, which drops the last outbound sender,
// and the send workers flush and exit in turn.
//
// ============================================================================

use crate::batching::{BatchingWorker, shared_receiver};
use crate::cache_proxy::{CacheProxy, GET_BATCH_SIZE};
use crate::cache_worker::CacheLookupHandler;
use crate::delivery::DeliveryHandler;
use crate::queue::OutboundQueue;
use reprocess_config::WorkerConfig;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_types::{Identifier, OutboundMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

pub struct Pipeline {
    feeder: mpsc::Sender<Identifier>,
    workers: PipelineWorkers,
}

impl Pipeline {
    /// Spawn both worker pools on the current runtime
    pub fn start(
        config: &WorkerConfig,
        cache: Arc<dyn CacheProxy>,
        queue: Arc<dyn OutboundQueue>,
    ) -> Self {
        let (feeder, inbound_rx) = mpsc::channel::<Identifier>(config.inbound_queue_size.max(1));
        let (outbound_tx, outbound_rx) =
            mpsc::channel::<OutboundMessage>(config.outbound_queue_size.max(1));

        let inbound = shared_receiver(inbound_rx);
        let outbound = shared_receiver(outbound_rx);

        let get_batch_size = GET_BATCH_SIZE.min(cache.max_batch_size());
        let send_batch_size = queue.max_batch_size();

        let lookup = Arc::new(CacheLookupHandler::new(cache, outbound_tx));
        let delivery = Arc::new(DeliveryHandler::new(queue, config.send_retries));

        let mut tasks = JoinSet::new();

        for id in 1..=config.cache_workers {
            let worker = BatchingWorker::new(
                "cache",
                id,
                get_batch_size,
                config.flush_timeout,
                inbound.clone(),
                lookup.clone(),
            );
            tasks.spawn(worker.run());
        }

        for id in 1..=config.send_workers {
            let worker = BatchingWorker::new(
                "send",
                id,
                send_batch_size,
                config.flush_timeout,
                outbound.clone(),
                delivery.clone(),
            );
            tasks.spawn(worker.run());
        }

        info!(
            cache_workers = config.cache_workers,
            cache_batch_size = get_batch_size,
            send_workers = config.send_workers,
            send_batch_size = send_batch_size,
            flush_timeout_secs = config.flush_timeout.as_secs(),
            "Worker pipeline started"
        );

        Self {
            feeder,
            workers: PipelineWorkers { tasks },
        }
    }

    pub fn into_parts(self) -> (mpsc::Sender<Identifier>, PipelineWorkers) {
        (self.feeder, self.workers)
    }
}

/// Handles of every spawned worker
pub struct PipelineWorkers {
    tasks: JoinSet<ReprocessResult<()>>,
}

impl PipelineWorkers {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the first worker error, or for every worker to finish
    ///
    /// Cancel safe: can be raced in a `select!` and awaited again.
    pub async fn wait(&mut self) -> ReprocessResult<()> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "Worker stopped with an error");
                    return Err(e);
                }
                Err(join_error) => {
                    return Err(ReprocessError::internal(format!(
                        "worker task failed: {join_error}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Abort every worker still running
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}
