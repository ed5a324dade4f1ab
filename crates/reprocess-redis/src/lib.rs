//! # Reprocess Redis
//!
//! Low-level Redis client used by the cache reprocessing service.
//!
//! ## Design Principles
//!
//! - **No business logic** - Pure infrastructure layer
//! - **No dependencies** on other reprocess-* crates
//! - **Batch friendly** - multi-key lookups go out as one pipeline
//!
//! ## Features
//!
//! - Connection management with automatic reconnection
//! - Key existence checks and hash field lookups for the record cache
//! - Redis Streams with consumer groups for the work queues
//!
//! ## Example
//!
//! ```rust,no_run
//! use reprocess_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     let present = client.exists_count(&["u100", "u101"]).await?;
//!     let fields = client.hmget_many(&["u100"], &["type", "source", "payload"]).await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod streams;

pub use client::{RedisClient, RedisEndpoint};
pub use streams::{StreamEntry, StreamReadOptions};

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
