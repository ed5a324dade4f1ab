use thiserror::Error;

pub type ReprocessResult<T> = Result<T, ReprocessError>;

/// Broad class of an error, deciding how far it is allowed to propagate
///
/// - `Configuration`: fatal at startup
/// - `Transport`: cache, queue or object store unreachable; fatal inside workers
/// - `Validation`: rejects the current notification, the service keeps polling
/// - `Delivery`: publish retries exhausted; fatal
/// - `Internal`: broken invariants inside the process; fatal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Validation,
    Delivery,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Transport => "transport",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Delivery => "delivery",
            ErrorCategory::Internal => "internal",
        }
    }
}

/// Service error type
///
/// Covers every failure the reprocessing pipeline can report, grouped the
/// same way `category()` classifies them.
#[derive(Error, Debug)]
pub enum ReprocessError {
    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Transport Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "object-store")]
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Queue transport error: {0}")]
    QueueTransport(String),

    #[error("Object {location} is {actual} bytes, notification announced {expected}")]
    SizeMismatch {
        location: String,
        expected: u64,
        actual: u64,
    },

    // ===== Validation Errors =====
    #[error("bad record encountered at index {index}")]
    BadRecord { index: usize },

    #[error("bad record identifier at index {index} ({id})")]
    BadRecordId { index: usize, id: String },

    #[error("one or more records between index {first} and {last} are not in the cache")]
    RecordNotInCache { first: usize, last: usize },

    #[error("{} key(s) not in cache", missing.len())]
    NotInCache { missing: Vec<String> },

    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    // ===== Delivery Errors =====
    #[error("{failed} message(s) still rejected after {retries} retries")]
    DeliveryExhausted { failed: usize, retries: u32 },

    // ===== Internal Errors =====
    #[error("file is not open")]
    FileNotOpen,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl ReprocessError {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReprocessError::Config(_) => ErrorCategory::Configuration,
            ReprocessError::Io(_)
            | ReprocessError::QueueTransport(_)
            | ReprocessError::SizeMismatch { .. } => ErrorCategory::Transport,
            #[cfg(feature = "redis")]
            ReprocessError::Redis(_) => ErrorCategory::Transport,
            #[cfg(feature = "database")]
            ReprocessError::Database(_) => ErrorCategory::Transport,
            #[cfg(feature = "object-store")]
            ReprocessError::ObjectStore(_) => ErrorCategory::Transport,
            ReprocessError::BadRecord { .. }
            | ReprocessError::BadRecordId { .. }
            | ReprocessError::RecordNotInCache { .. }
            | ReprocessError::NotInCache { .. }
            | ReprocessError::MalformedNotification(_) => ErrorCategory::Validation,
            ReprocessError::DeliveryExhausted { .. } => ErrorCategory::Delivery,
            ReprocessError::FileNotOpen
            | ReprocessError::Json(_)
            | ReprocessError::ChannelClosed(_)
            | ReprocessError::Internal(_)
            | ReprocessError::Unknown(_) => ErrorCategory::Internal,
        }
    }

    /// Validation errors reject one notification; everything else ends the run
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ReprocessError::Config(_) => "CONFIG_ERROR",
            ReprocessError::Io(_) => "IO_ERROR",
            #[cfg(feature = "redis")]
            ReprocessError::Redis(_) => "REDIS_ERROR",
            #[cfg(feature = "database")]
            ReprocessError::Database(_) => "DATABASE_ERROR",
            #[cfg(feature = "object-store")]
            ReprocessError::ObjectStore(_) => "OBJECT_STORE_ERROR",
            ReprocessError::QueueTransport(_) => "QUEUE_TRANSPORT_ERROR",
            ReprocessError::SizeMismatch { .. } => "SIZE_MISMATCH",
            ReprocessError::BadRecord { .. } => "BAD_RECORD",
            ReprocessError::BadRecordId { .. } => "BAD_RECORD_ID",
            ReprocessError::RecordNotInCache { .. } => "RECORD_NOT_IN_CACHE",
            ReprocessError::NotInCache { .. } => "NOT_IN_CACHE",
            ReprocessError::MalformedNotification(_) => "MALFORMED_NOTIFICATION",
            ReprocessError::DeliveryExhausted { .. } => "DELIVERY_EXHAUSTED",
            ReprocessError::FileNotOpen => "FILE_NOT_OPEN",
            ReprocessError::Json(_) => "JSON_ERROR",
            ReprocessError::ChannelClosed(_) => "CHANNEL_CLOSED",
            ReprocessError::Internal(_) => "INTERNAL_ERROR",
            ReprocessError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with a level matching its category
    pub fn log(&self) {
        let category = self.category();
        let code = self.error_code();

        if self.is_recoverable() {
            tracing::warn!(
                error = %self,
                error_code = %code,
                category = category.as_str(),
                "Recoverable error, notification rejected"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = %code,
                category = category.as_str(),
                "Fatal error"
            );
        }
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl ReprocessError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ReprocessError::Config(msg.into())
    }

    /// Create a queue transport error
    pub fn queue_transport(msg: impl Into<String>) -> Self {
        ReprocessError::QueueTransport(msg.into())
    }

    /// Create a malformed notification error
    pub fn malformed_notification(msg: impl Into<String>) -> Self {
        ReprocessError::MalformedNotification(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ReprocessError::Internal(msg.into())
    }
}
