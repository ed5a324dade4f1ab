// ============================================================================
// Reprocess Types - Core Data Types
// ============================================================================
//
// Data structures shared by every stage of the cache reprocessing pipeline.
// This crate has NO dependencies on queues, caches or object stores.
//
// Contents:
// - Record identifiers and their shape constraint
// - Cache entries and the outbound messages hydrated from them
// - Inbound notifications (object store references) and receipt handles
//
// ============================================================================

pub mod identifier;
pub mod message;
pub mod notification;

pub use identifier::*;
pub use message::*;
pub use notification::*;
