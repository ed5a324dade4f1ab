// ============================================================================
// Configuration Constants
// ============================================================================

// Prefix shared by every environment variable this service reads
pub(crate) const ENV_PREFIX: &str = "CACHE_REPROCESS_";

// Default time intervals
pub(crate) const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 5;
pub(crate) const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 5;
pub(crate) const DEFAULT_SLOW_REQUEST_MS: u64 = 100;

// Number of times a partially failed publish is retried before giving up
pub(crate) const DEFAULT_SEND_RETRIES: u32 = 3;

// Queue consumer identity
pub(crate) const DEFAULT_CONSUMER_GROUP: &str = "cache-reprocess";
pub(crate) const DEFAULT_CONSUMER_NAME: &str = "cache-reprocess-1";
