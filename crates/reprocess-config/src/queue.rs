// ============================================================================
// Queue Transport Configuration
// ============================================================================

use crate::constants::{DEFAULT_CONSUMER_GROUP, DEFAULT_CONSUMER_NAME};
use crate::env::{ConfigError, EnvReader};
use crate::secret::SecureString;

/// Connection and consumer identity for the inbound/outbound queues
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Queue service URL (may embed credentials)
    pub url: SecureString,
    /// Consumer group reading the inbound queue
    pub consumer_group: String,
    /// This process' consumer name inside the group
    pub consumer_name: String,
}

impl QueueConfig {
    pub(crate) fn from_reader(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: SecureString::new(env.required("QUEUE_URL")?),
            consumer_group: env
                .optional("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            consumer_name: env
                .optional("QUEUE_CONSUMER_NAME")
                .unwrap_or_else(|| DEFAULT_CONSUMER_NAME.to_string()),
        })
    }
}
