// ============================================================================
// Batching Worker
// ============================================================================
//
// Drains a shared inbound channel into bounded batches and hands each batch
// to a BatchHandler. A batch is flushed when:
// - it reaches `max_batch_size` items (flushed exactly at N), or
// - the idle deadline expires while it holds at least one item.
//
// The idle deadline is armed when the batch was last flushed (or when the
// previous deadline expired on an empty batch). New arrivals do not push it
// back, so no item waits longer than `flush_timeout` before it is handed on.
//
// Several workers can drain the same channel: the receiver sits behind a
// mutex and whichever worker holds it takes the next item. A batch, once
// pulled off the channel, belongs to exactly one worker.
//
// Handler errors are returned from `run()` unchanged; the worker stops at the
// first one. When every sender is gone the worker flushes what it holds and
// returns Ok.
//
// ============================================================================

use async_trait::async_trait;
use reprocess_error::ReprocessResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

/// Items processed between two progress log lines
const PROGRESS_LOG_INTERVAL: u64 = 1000;

/// Receiver end shared by every worker of one pool
pub type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Wrap a receiver so a pool of workers can drain it
pub fn shared_receiver<T>(receiver: mpsc::Receiver<T>) -> SharedReceiver<T> {
    Arc::new(Mutex::new(receiver))
}

/// Processes one flushed batch
#[async_trait]
pub trait BatchHandler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, batch: Vec<T>) -> ReprocessResult<()>;
}

/// Size/idle-timeout batching loop over a shared channel
pub struct BatchingWorker<T, H: ?Sized> {
    pool: &'static str,
    id: usize,
    max_batch_size: usize,
    flush_timeout: Duration,
    inbound: SharedReceiver<T>,
    handler: Arc<H>,
}

impl<T, H> BatchingWorker<T, H>
where
    T: Send + 'static,
    H: BatchHandler<T> + ?Sized,
{
    /// `pool` and `id` only label log lines; `max_batch_size` is clamped to 1
    pub fn new(
        pool: &'static str,
        id: usize,
        max_batch_size: usize,
        flush_timeout: Duration,
        inbound: SharedReceiver<T>,
        handler: Arc<H>,
    ) -> Self {
        Self {
            pool,
            id,
            max_batch_size: max_batch_size.max(1),
            flush_timeout,
            inbound,
            handler,
        }
    }

    pub async fn run(self) -> ReprocessResult<()> {
        let mut batch: Vec<T> = Vec::with_capacity(self.max_batch_size);
        let mut processed: u64 = 0;
        let mut deadline = Instant::now() + self.flush_timeout;

        debug!(pool = self.pool, worker_id = self.id, "Batching worker started");

        loop {
            let next = tokio::select! {
                item = Self::receive(&self.inbound) => Some(item),
                _ = sleep_until(deadline) => None,
            };

            match next {
                // An item arrived
                Some(Some(item)) => {
                    batch.push(item);
                    processed += 1;

                    if batch.len() >= self.max_batch_size {
                        self.flush(&mut batch).await?;
                        deadline = Instant::now() + self.flush_timeout;
                    }

                    if processed % PROGRESS_LOG_INTERVAL == 0 {
                        info!(
                            pool = self.pool,
                            worker_id = self.id,
                            processed = processed,
                            "Worker processed records"
                        );
                    }
                }
                // Every sender dropped: flush the remainder and stop
                Some(None) => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await?;
                    }
                    info!(
                        pool = self.pool,
                        worker_id = self.id,
                        processed = processed,
                        "Inbound channel closed, worker stopping"
                    );
                    return Ok(());
                }
                // Idle deadline expired
                None => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await?;
                        info!(
                            pool = self.pool,
                            worker_id = self.id,
                            processed = processed,
                            "Worker processed records (flushing)"
                        );
                    }
                    processed = 0;
                    deadline = Instant::now() + self.flush_timeout;
                }
            }
        }
    }

    async fn receive(inbound: &SharedReceiver<T>) -> Option<T> {
        inbound.lock().await.recv().await
    }

    async fn flush(&self, batch: &mut Vec<T>) -> ReprocessResult<()> {
        let full = std::mem::replace(batch, Vec::with_capacity(self.max_batch_size));
        debug!(
            pool = self.pool,
            worker_id = self.id,
            batch_size = full.len(),
            "Flushing batch"
        );
        self.handler.handle(full).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reprocess_error::ReprocessError;
    use std::sync::Mutex as StdMutex;

    const FLUSH: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Recorder {
        batches: StdMutex<Vec<Vec<u32>>>,
        fail: bool,
    }

    impl Recorder {
        fn batches(&self) -> Vec<Vec<u32>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchHandler<u32> for Recorder {
        async fn handle(&self, batch: Vec<u32>) -> ReprocessResult<()> {
            self.batches.lock().unwrap().push(batch);
            if self.fail {
                return Err(ReprocessError::internal("handler failed"));
            }
            Ok(())
        }
    }

    fn worker(
        max: usize,
        rx: &SharedReceiver<u32>,
        handler: &Arc<Recorder>,
    ) -> BatchingWorker<u32, Recorder> {
        BatchingWorker::new("test", 1, max, FLUSH, rx.clone(), handler.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_exactly_at_batch_size() {
        let (tx, rx) = mpsc::channel(16);
        let rx = shared_receiver(rx);
        let handler = Arc::new(Recorder::default());

        for i in 1..=4 {
            tx.send(i).await.unwrap();
        }
        let task = tokio::spawn(worker(4, &rx, &handler).run());

        // Well inside the idle timeout
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handler.batches(), vec![vec![1, 2, 3, 4]]);

        drop(tx);
        task.await.unwrap().unwrap();
        assert_eq!(handler.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_flushes_partial_batch() {
        let (tx, rx) = mpsc::channel(16);
        let rx = shared_receiver(rx);
        let handler = Arc::new(Recorder::default());
        let task = tokio::spawn(worker(4, &rx, &handler).run());

        tx.send(7).await.unwrap();
        tokio::time::sleep(FLUSH / 2).await;
        assert!(handler.batches().is_empty());

        tokio::time::sleep(FLUSH).await;
        assert_eq!(handler.batches(), vec![vec![7]]);

        drop(tx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_without_items_is_noop() {
        let (tx, rx) = mpsc::channel::<u32>(16);
        let rx = shared_receiver(rx);
        let handler = Arc::new(Recorder::default());
        let task = tokio::spawn(worker(4, &rx, &handler).run());

        tokio::time::sleep(FLUSH * 5).await;
        assert!(handler.batches().is_empty());

        drop(tx);
        task.await.unwrap().unwrap();
        assert!(handler.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_arrival_order() {
        let (tx, rx) = mpsc::channel(16);
        let rx = shared_receiver(rx);
        let handler = Arc::new(Recorder::default());

        for i in 1..=7 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        worker(3, &rx, &handler).run().await.unwrap();
        assert_eq!(
            handler.batches(),
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_stops_worker() {
        let (tx, rx) = mpsc::channel(16);
        let rx = shared_receiver(rx);
        let handler = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });

        for i in 1..=4 {
            tx.send(i).await.unwrap();
        }

        let result = worker(2, &rx, &handler).run().await;
        assert!(matches!(result, Err(ReprocessError::Internal(_))));
        // Stopped after the first failing batch
        assert_eq!(handler.batches(), vec![vec![1, 2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_shares_one_channel() {
        let (tx, rx) = mpsc::channel(8);
        let rx = shared_receiver(rx);
        let handler = Arc::new(Recorder::default());

        let mut tasks = Vec::new();
        for id in 1..=3 {
            let w = BatchingWorker::new("test", id, 5, FLUSH, rx.clone(), handler.clone());
            tasks.push(tokio::spawn(w.run()));
        }

        for i in 0..100 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut seen: Vec<u32> = handler.batches().into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert!(handler.batches().iter().all(|b| b.len() <= 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_behind_trait_object() {
        let (tx, rx) = mpsc::channel(16);
        let rx = shared_receiver(rx);
        let recorder = Arc::new(Recorder::default());
        let handler: Arc<dyn BatchHandler<u32>> = recorder.clone();

        for i in 1..=3 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        BatchingWorker::new("test", 1, 2, FLUSH, rx, handler)
            .run()
            .await
            .unwrap();
        assert_eq!(recorder.batches(), vec![vec![1, 2], vec![3]]);
    }
}
