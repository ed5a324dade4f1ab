// ============================================================================
// Reprocess Config - Centralized configuration management
// ============================================================================
//
// Configuration is loaded once at startup from environment variables and then
// passed by value/reference into every component constructor. Nothing inside
// the pipeline reads the environment on its own.
//
// All service variables are required and must be non-empty; a missing or
// unparsable value is a fatal startup error.
//
// ============================================================================

mod cache;
mod constants;
mod env;
mod queue;
mod secret;
mod worker;

pub use cache::{CacheBackendKind, CacheConfig, CacheCredentials};
pub use env::ConfigError;
pub use queue::QueueConfig;
pub use secret::SecureString;
pub use worker::WorkerConfig;

use env::EnvReader;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Main configuration structure for the reprocess service
#[derive(Clone, Debug)]
pub struct Config {
    /// Inbound queue carrying object store notifications
    pub in_queue_name: String,
    /// Outbound queue receiving re-published records
    pub out_queue_name: String,
    /// How long one inbound receive blocks before polling again
    pub poll_timeout: Duration,
    /// Data sources covered by this deployment (informational)
    pub data_source_names: Vec<String>,
    /// Bucket receiving payloads too large to travel inline
    pub message_bucket_name: String,
    /// Local directory for downloaded manifests
    pub download_dir: PathBuf,
    /// Port for /health and /metrics (None = endpoint disabled)
    pub health_port: Option<u16>,

    // Sub-configurations
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(&lookup);

        let data_source_names = env
            .required("DATA_SOURCE")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            in_queue_name: env.required("IN_QUEUE")?,
            out_queue_name: env.required("OUT_QUEUE")?,
            poll_timeout: env.required_secs("QUEUE_POLL_TIMEOUT")?,
            data_source_names,
            message_bucket_name: env.required("MESSAGE_BUCKET")?,
            download_dir: PathBuf::from(env.required("DOWNLOAD_DIR")?),
            health_port: match env.optional("HEALTH_PORT") {
                Some(_) => Some(env.required_parse("HEALTH_PORT")?),
                None => None,
            },
            queue: QueueConfig::from_reader(&env)?,
            cache: CacheConfig::from_reader(&env)?,
            worker: WorkerConfig::from_reader(&env)?,
        })
    }

    /// Log every setting once at startup (credentials redacted)
    pub fn log_summary(&self) {
        info!("[CONFIG] InQueueName             = [{}]", self.in_queue_name);
        info!("[CONFIG] OutQueueName            = [{}]", self.out_queue_name);
        info!("[CONFIG] PollTimeout             = [{}s]", self.poll_timeout.as_secs());
        info!("[CONFIG] DataSourceNames         = [{}]", self.data_source_names.join(","));
        info!("[CONFIG] MessageBucketName       = [{}]", self.message_bucket_name);
        info!("[CONFIG] DownloadDir             = [{}]", self.download_dir.display());
        info!("[CONFIG] QueueUrl                = [{}]", self.queue.url);
        info!("[CONFIG] QueueConsumer           = [{}/{}]", self.queue.consumer_group, self.queue.consumer_name);
        info!("[CONFIG] CacheBackend            = [{}]", self.cache.backend);
        info!("[CONFIG] CacheHost               = [{}:{}]", self.cache.host, self.cache.port);
        info!("[CONFIG] CacheUser               = [{}]", self.cache.credentials.username.as_deref().unwrap_or(""));
        info!("[CONFIG] CachePassword           = [{}]", self.cache.credentials.password);
        info!("[CONFIG] CacheDatabase           = [{}]", self.cache.database);
        info!("[CONFIG] CacheTable              = [{}]", self.cache.table.as_deref().unwrap_or(""));
        info!("[CONFIG] SlowRequestThreshold    = [{}ms]", self.cache.slow_request_threshold.as_millis());
        info!("[CONFIG] InboundWorkerQueueSize  = [{}]", self.worker.inbound_queue_size);
        info!("[CONFIG] CacheWorkers            = [{}]", self.worker.cache_workers);
        info!("[CONFIG] OutboundWorkerQueueSize = [{}]", self.worker.outbound_queue_size);
        info!("[CONFIG] SendWorkers             = [{}]", self.worker.send_workers);
        info!("[CONFIG] FlushTimeout            = [{}s]", self.worker.flush_timeout.as_secs());
        info!("[CONFIG] SendRetries             = [{}]", self.worker.send_retries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<String, String> {
        [
            ("IN_QUEUE", "reprocess-in"),
            ("OUT_QUEUE", "ingest-out"),
            ("QUEUE_POLL_TIMEOUT", "20"),
            ("DATA_SOURCE", "sirsi, hathi"),
            ("MESSAGE_BUCKET", "oversize-messages"),
            ("DOWNLOAD_DIR", "/tmp/reprocess"),
            ("QUEUE_URL", "redis://queue:6379"),
            ("CACHE_HOST", "cache.internal"),
            ("CACHE_PORT", "6379"),
            ("CACHE_CREDENTIALS", "s3cret"),
            ("CACHE_DATABASE", "0"),
            ("INBOUND_WORK_QUEUE_SIZE", "1000"),
            ("CACHE_WORKERS", "4"),
            ("OUTBOUND_WORK_QUEUE_SIZE", "1000"),
            ("SEND_WORKERS", "2"),
        ]
        .into_iter()
        .map(|(k, v)| (format!("CACHE_REPROCESS_{}", k), v.to_string()))
        .collect()
    }

    fn load(env: &HashMap<String, String>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_complete_environment() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.in_queue_name, "reprocess-in");
        assert_eq!(config.poll_timeout, Duration::from_secs(20));
        assert_eq!(config.data_source_names, vec!["sirsi", "hathi"]);
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.port, 6379);
        assert_eq!(config.worker.cache_workers, 4);
        assert_eq!(config.worker.flush_timeout, Duration::from_secs(5));
        assert_eq!(config.worker.send_retries, 3);
        assert_eq!(config.cache.slow_request_threshold, Duration::from_millis(100));
        assert_eq!(config.health_port, None);
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let mut env = base_env();
        env.remove("CACHE_REPROCESS_SEND_WORKERS");

        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Missing {
                name: "CACHE_REPROCESS_SEND_WORKERS".to_string()
            }
        );
    }

    #[test]
    fn test_empty_variable_counts_as_missing() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_OUT_QUEUE".to_string(), String::new());

        assert!(matches!(load(&env), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_non_numeric_port_is_invalid() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_CACHE_PORT".to_string(), "sixty".to_string());

        assert!(matches!(load(&env), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_workers_is_invalid() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_CACHE_WORKERS".to_string(), "0".to_string());

        assert!(matches!(load(&env), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_poll_timeout_is_invalid() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_QUEUE_POLL_TIMEOUT".to_string(), "0".to_string());

        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Invalid {
                name: "CACHE_REPROCESS_QUEUE_POLL_TIMEOUT".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }
        );
    }

    #[test]
    fn test_zero_flush_timeout_is_invalid() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_FLUSH_TIMEOUT_SECS".to_string(), "0".to_string());

        match load(&env) {
            Err(ConfigError::Invalid { name, .. }) => {
                assert_eq!(name, "CACHE_REPROCESS_FLUSH_TIMEOUT_SECS")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_postgres_backend_requires_table() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_CACHE_BACKEND".to_string(), "postgres".to_string());
        env.insert("CACHE_REPROCESS_CACHE_DATABASE".to_string(), "virgo".to_string());

        assert_eq!(
            load(&env).unwrap_err(),
            ConfigError::Missing {
                name: "CACHE_REPROCESS_CACHE_TABLE".to_string()
            }
        );

        env.insert("CACHE_REPROCESS_CACHE_TABLE".to_string(), "source_cache".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.cache.backend, CacheBackendKind::Postgres);
        assert_eq!(config.cache.table.as_deref(), Some("source_cache"));
    }

    #[test]
    fn test_optional_overrides() {
        let mut env = base_env();
        env.insert("CACHE_REPROCESS_FLUSH_TIMEOUT_SECS".to_string(), "1".to_string());
        env.insert("CACHE_REPROCESS_SEND_RETRIES".to_string(), "5".to_string());
        env.insert("CACHE_REPROCESS_HEALTH_PORT".to_string(), "8081".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.worker.flush_timeout, Duration::from_secs(1));
        assert_eq!(config.worker.send_retries, 5);
        assert_eq!(config.health_port, Some(8081));
    }
}
