// ============================================================================
// Cache Reprocess - Pipeline Engine
// ============================================================================
//
// notification -> manifest file(s) -> RecordStream
//   -> validation pass (CacheProxy::exists, all-or-nothing per notification)
//   -> delete notification
//   -> streaming pass -> cache workers (CacheProxy::get)
//   -> send workers (OutboundQueue::publish with retry)
//
// ============================================================================

pub mod batching;
pub mod cache_proxy;
pub mod cache_worker;
pub mod delivery;
pub mod health;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod record_stream;
pub mod storage;
pub mod telemetry;

pub use batching::{BatchHandler, BatchingWorker, SharedReceiver, shared_receiver};
pub use cache_proxy::{CacheProxy, connect_cache_proxy};
pub use orchestrator::{NotificationOutcome, Orchestrator};
pub use pipeline::{Pipeline, PipelineWorkers};
pub use queue::{InboundQueue, OutboundQueue, PublishOutcome};
pub use record_stream::RecordStream;
pub use storage::{ManifestDownloader, ObjectStoreFactory, S3ObjectStoreFactory};
