// ============================================================================
// Orchestrator
// ============================================================================
//
// Per inbound notification:
//
//   1. download every referenced manifest
//   2. validate every manifest against the cache (full read of each file)
//   3. any validation failure: discard all local files, leave the
//      notification undeleted, report Rejected and keep polling
//   4. otherwise delete the notification, then stream every identifier of
//      every file into the pipeline and remove each file once streamed
//
// All-or-nothing per notification: no record of a multi-file notification
// is streamed unless every file validated.
//
// Only validation failures are absorbed here. Transport errors, a closed
// pipeline, and any read failure during the streaming pass (the file was
// already validated, so that is a broken contract) are returned and stop
// the service.
//
// ============================================================================

use crate::cache_proxy::{CacheProxy, LOOKUP_BATCH_SIZE};
use crate::queue::{InboundBatch, InboundQueue};
use crate::record_stream::RecordStream;
use crate::storage::{self, ManifestDownloader};
use reprocess_error::{ReprocessError, ReprocessResult};
use reprocess_metrics::{NOTIFICATIONS_TOTAL, RECORDS_STREAMED_TOTAL};
use reprocess_types::{Identifier, Notification};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What happened to one poll of the inbound queue
#[derive(Debug)]
pub enum NotificationOutcome {
    /// Nothing arrived within the poll timeout
    Idle,
    /// Every file validated, the notification was deleted and streamed
    Accepted { files: usize, records: usize },
    /// A file failed validation; the notification stays on the queue
    Rejected(ReprocessError),
}

pub struct Orchestrator {
    inbound: Arc<dyn InboundQueue>,
    downloader: ManifestDownloader,
    cache: Arc<dyn CacheProxy>,
    feeder: mpsc::Sender<Identifier>,
    poll_timeout: Duration,
}

/// A downloaded manifest that passed validation
struct ValidatedFile {
    notification: Notification,
    stream: RecordStream,
    records: usize,
}

impl Orchestrator {
    pub fn new(
        inbound: Arc<dyn InboundQueue>,
        downloader: ManifestDownloader,
        cache: Arc<dyn CacheProxy>,
        feeder: mpsc::Sender<Identifier>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            inbound,
            downloader,
            cache,
            feeder,
            poll_timeout,
        }
    }

    /// Poll forever; returns only on a fatal error
    pub async fn run(&self) -> ReprocessResult<()> {
        info!(poll_timeout_secs = self.poll_timeout.as_secs(), "Orchestrator started");
        loop {
            self.poll_once().await?;
        }
    }

    /// Receive and process at most one notification
    pub async fn poll_once(&self) -> ReprocessResult<NotificationOutcome> {
        match self.inbound.receive(self.poll_timeout).await? {
            Some(batch) => self.process(batch).await,
            None => {
                debug!("No notifications, waiting");
                Ok(NotificationOutcome::Idle)
            }
        }
    }

    pub async fn process(&self, batch: InboundBatch) -> ReprocessResult<NotificationOutcome> {
        let start = Instant::now();
        info!(
            receipt = %batch.receipt,
            files = batch.notifications.len(),
            "Notification received"
        );

        let downloaded = self.download_all(&batch.notifications).await?;

        let validated = match self.validate_all(downloaded).await? {
            Ok(validated) => validated,
            Err(reason) => {
                NOTIFICATIONS_TOTAL.with_label_values(&["rejected"]).inc();
                warn!(
                    receipt = %batch.receipt,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Notification rejected, files discarded"
                );
                return Ok(NotificationOutcome::Rejected(reason));
            }
        };

        if let Err(e) = self.inbound.delete(&batch.receipt).await {
            discard(validated.into_iter().map(|f| f.stream.path().to_path_buf())).await;
            return Err(e);
        }

        let files = validated.len();
        let mut records = 0usize;
        let mut remaining = validated.into_iter();

        while let Some(file) = remaining.next() {
            match self.stream_file(file).await {
                Ok(count) => records += count,
                Err(e) => {
                    discard(remaining.map(|f| f.stream.path().to_path_buf())).await;
                    return Err(e);
                }
            }
        }

        NOTIFICATIONS_TOTAL.with_label_values(&["accepted"]).inc();
        info!(
            receipt = %batch.receipt,
            files = files,
            records = records,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Notification processed"
        );
        Ok(NotificationOutcome::Accepted { files, records })
    }

    async fn download_all(
        &self,
        notifications: &[Notification],
    ) -> ReprocessResult<Vec<(Notification, PathBuf)>> {
        let mut downloaded = Vec::with_capacity(notifications.len());

        for notification in notifications {
            match self.downloader.download(notification).await {
                Ok(path) => downloaded.push((notification.clone(), path)),
                Err(e) => {
                    discard(downloaded.into_iter().map(|(_, path)| path)).await;
                    return Err(e);
                }
            }
        }
        Ok(downloaded)
    }

    /// Outer error: fatal. Inner error: the validation failure that rejects
    /// the notification (local files already discarded).
    async fn validate_all(
        &self,
        downloaded: Vec<(Notification, PathBuf)>,
    ) -> ReprocessResult<Result<Vec<ValidatedFile>, ReprocessError>> {
        let shape = self.cache.identifier_shape();
        let mut validated: Vec<ValidatedFile> = Vec::with_capacity(downloaded.len());
        let mut pending = downloaded.into_iter();

        while let Some((notification, path)) = pending.next() {
            let outcome = match RecordStream::open(&path, shape).await {
                Ok(mut stream) => stream
                    .validate(self.cache.as_ref(), LOOKUP_BATCH_SIZE)
                    .await
                    .map(|records| (stream, records)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((stream, records)) => {
                    info!(
                        bucket = %notification.source_bucket,
                        key = %notification.source_key,
                        records = records,
                        "Manifest validated"
                    );
                    validated.push(ValidatedFile {
                        notification,
                        stream,
                        records,
                    });
                }
                Err(e) => {
                    let local = validated
                        .into_iter()
                        .map(|f| f.stream.path().to_path_buf())
                        .chain(std::iter::once(path))
                        .chain(pending.map(|(_, path)| path));
                    discard(local).await;

                    if !e.is_recoverable() {
                        return Err(e);
                    }

                    warn!(
                        bucket = %notification.source_bucket,
                        key = %notification.source_key,
                        error = %e,
                        error_code = e.error_code(),
                        "Manifest failed validation"
                    );
                    return Ok(Err(e));
                }
            }
        }

        Ok(Ok(validated))
    }

    /// Second pass over a validated file: push every identifier downstream
    async fn stream_file(&self, file: ValidatedFile) -> ReprocessResult<usize> {
        let ValidatedFile {
            notification,
            mut stream,
            records,
        } = file;
        let start = Instant::now();

        let sent = match self.feed(&mut stream).await {
            Ok(sent) => sent,
            Err(e) => {
                stream.close();
                storage::remove_file(stream.path()).await;
                return Err(e);
            }
        };
        stream.close();

        if sent != records {
            warn!(
                key = %notification.source_key,
                validated = records,
                streamed = sent,
                "Record count changed between passes"
            );
        }

        let elapsed = start.elapsed();
        let tps = if elapsed.as_secs_f64() > 0.0 {
            sent as f64 / elapsed.as_secs_f64()
        } else {
            sent as f64
        };
        info!(
            bucket = %notification.source_bucket,
            key = %notification.source_key,
            records = sent,
            elapsed_ms = elapsed.as_millis() as u64,
            tps = tps as u64,
            "Manifest streamed"
        );

        storage::remove_file(stream.path()).await;
        info!(local_file = %stream.path().display(), "Local file removed");
        Ok(sent)
    }

    async fn feed(&self, stream: &mut RecordStream) -> ReprocessResult<usize> {
        let mut sent = 0usize;
        let mut next = stream.first().await?;

        while let Some(id) = next {
            self.feeder
                .send(id)
                .await
                .map_err(|_| ReprocessError::ChannelClosed("inbound"))?;
            sent += 1;
            next = stream.next_record().await?;
        }

        RECORDS_STREAMED_TOTAL.inc_by(sent as u64);
        Ok(sent)
    }
}

async fn discard(paths: impl Iterator<Item = PathBuf>) {
    for path in paths {
        storage::remove_file(&path).await;
    }
}
