// ============================================================================
// Worker Pool Configuration
// ============================================================================

use crate::constants::{DEFAULT_FLUSH_TIMEOUT_SECS, DEFAULT_SEND_RETRIES};
use crate::env::{ConfigError, EnvReader};
use std::time::Duration;

/// Sizing of the cache lookup and delivery pools
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Capacity of the channel feeding the cache workers
    pub inbound_queue_size: usize,
    /// Number of cache lookup workers
    pub cache_workers: usize,
    /// Capacity of the channel feeding the send workers
    pub outbound_queue_size: usize,
    /// Number of send workers
    pub send_workers: usize,
    /// A partial batch is flushed when this much time passes without a flush
    pub flush_timeout: Duration,
    /// Retries for the rejected part of a partially failed publish
    pub send_retries: u32,
}

impl WorkerConfig {
    pub(crate) fn from_reader(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            inbound_queue_size: env.required_count("INBOUND_WORK_QUEUE_SIZE")?,
            cache_workers: env.required_count("CACHE_WORKERS")?,
            outbound_queue_size: env.required_count("OUTBOUND_WORK_QUEUE_SIZE")?,
            send_workers: env.required_count("SEND_WORKERS")?,
            flush_timeout: env.optional_secs("FLUSH_TIMEOUT_SECS", DEFAULT_FLUSH_TIMEOUT_SECS)?,
            send_retries: env.optional_parse("SEND_RETRIES", DEFAULT_SEND_RETRIES)?,
        })
    }
}
