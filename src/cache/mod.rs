// ============================================================================
// Update Timestamps Cache
// ============================================================================
//
// The query cache remembers, per table space, when it was last modified.
// The action queue pre-invalidates the spaces an action touches before the
// action runs and invalidates them again once the transaction has ended.
//
// ============================================================================

mod timestamps;

pub use timestamps::InMemoryTimestamps;

use crate::core::{CacheError, TableSpace};

/// Invalidation surface of the update-timestamps cache region
pub trait UpdateTimestampsCache: Send + Sync {
    /// Mark `spaces` as being modified by an in-flight transaction
    fn pre_invalidate(&self, spaces: &[TableSpace]) -> Result<(), CacheError>;

    /// Record that `spaces` were modified now
    fn invalidate(&self, spaces: &[TableSpace]) -> Result<(), CacheError>;
}
