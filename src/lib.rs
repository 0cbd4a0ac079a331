// ============================================================================
// writebehind Library
// ============================================================================
//
// Write-behind execution engine of a persistence session:
//
// - `queue`      buffers pending mutations and flushes them in a fixed,
//                foreign-key safe order
// - `statement`  owns every statement and result set the session opens,
//                including the single held batch statement
// - `connection` the database capabilities the engine relies on, a lazy
//                connection manager, and an in-memory recording database
// - `cache`      the update-timestamps region kept in step with flushes
//
// ============================================================================

pub mod action;
pub mod cache;
pub mod config;
pub mod connection;
pub mod core;
pub mod queue;
pub mod statement;

// Re-export main types for convenience
pub use action::{
    Action, ActionKind, ActionWork, BulkCleanup, CollectionAction, CompletionError, EntityAction,
    EntityInsert, Executable, PropertyType, PropertyValue, SqlWork,
};
pub use cache::{InMemoryTimestamps, UpdateTimestampsCache};
pub use config::EngineSettings;
pub use connection::{ConnectionManager, LazyConnectionManager, RecordingDatabase, ReleaseMode};
pub use core::{DriverError, EngineError, Identifier, InstanceKey, Result, TableSpace, Value};
pub use queue::{ActionQueue, CompletionReport, QueueSnapshot};
pub use statement::{Expectation, StatementManager};
