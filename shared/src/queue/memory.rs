// ============================================================================
// In-Memory Queues
// ============================================================================
//
// Queue doubles for tests and local runs.
//
// MemoryInboundQueue hands out pushed notifications in order and records
// which receipts were deleted. MemoryOutboundQueue records every publish
// request and can be scripted to reject given positions of upcoming
// requests, or to fail outright.
//
// ============================================================================

use super::{InboundBatch, InboundQueue, OutboundQueue, PublishOutcome};
use async_trait::async_trait;
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_types::{Notification, OutboundMessage, ReceiptHandle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryInboundQueue {
    pending: Mutex<VecDeque<InboundBatch>>,
    deleted: Mutex<Vec<ReceiptHandle>>,
    next_receipt: AtomicU64,
}

impl MemoryInboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one message referencing the given files
    pub fn push(&self, notifications: Vec<Notification>) -> ReceiptHandle {
        let n = self.next_receipt.fetch_add(1, Ordering::SeqCst);
        let receipt = ReceiptHandle(format!("receipt-{n}"));
        lock(&self.pending).push_back(InboundBatch {
            notifications,
            receipt: receipt.clone(),
        });
        receipt
    }

    pub fn deleted(&self) -> Vec<ReceiptHandle> {
        lock(&self.deleted).clone()
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[async_trait]
impl InboundQueue for MemoryInboundQueue {
    async fn receive(&self, wait: Duration) -> ReprocessResult<Option<InboundBatch>> {
        let next = lock(&self.pending).pop_front();
        if next.is_none() {
            tokio::time::sleep(wait).await;
        }
        Ok(next)
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> ReprocessResult<()> {
        lock(&self.deleted).push(receipt.clone());
        Ok(())
    }
}

pub struct MemoryOutboundQueue {
    max_batch_size: usize,
    /// Every publish request, in call order
    requests: Mutex<Vec<Vec<OutboundMessage>>>,
    /// Accepted messages
    published: Mutex<Vec<OutboundMessage>>,
    /// Positions to reject, one entry per upcoming request
    rejections: Mutex<VecDeque<Vec<usize>>>,
    reject_all: AtomicBool,
    unavailable: AtomicBool,
}

impl Default for MemoryOutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOutboundQueue {
    pub fn new() -> Self {
        Self::with_max_batch_size(super::OUTBOUND_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            requests: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            rejections: Mutex::new(VecDeque::new()),
            reject_all: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Reject these positions of the next not-yet-scripted request
    pub fn reject_next(&self, positions: Vec<usize>) {
        lock(&self.rejections).push_back(positions);
    }

    /// Reject every message of every request from now on
    pub fn reject_everything(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    /// Fail every request with a transport error from now on
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Vec<OutboundMessage>> {
        lock(&self.requests).clone()
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        lock(&self.published).clone()
    }
}

#[async_trait]
impl OutboundQueue for MemoryOutboundQueue {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn publish(&self, batch: &[OutboundMessage]) -> ReprocessResult<PublishOutcome> {
        lock(&self.requests).push(batch.to_vec());

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ReprocessError::queue_transport("memory queue is unavailable"));
        }

        let rejected = lock(&self.rejections).pop_front().unwrap_or_default();
        let reject_all = self.reject_all.load(Ordering::SeqCst);

        let statuses: Vec<bool> = (0..batch.len())
            .map(|ix| !reject_all && !rejected.contains(&ix))
            .collect();

        lock(&self.published).extend(
            batch
                .iter()
                .zip(&statuses)
                .filter(|(_, ok)| **ok)
                .map(|(m, _)| m.clone()),
        );

        Ok(PublishOutcome { statuses })
    }
}
