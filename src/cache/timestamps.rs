use super::UpdateTimestampsCache;
use crate::core::{CacheError, TableSpace};
use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// How long a pre-invalidation keeps a space "in the future"
const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 60;

/// In-process update-timestamps region.
///
/// A pre-invalidated space carries a timestamp in the future, so every
/// cached query result is stale until the transaction ends and
/// [`UpdateTimestampsCache::invalidate`] stamps the real modification time.
pub struct InMemoryTimestamps {
    stamps: Mutex<HashMap<TableSpace, DateTime<Utc>>>,
    lock_timeout: Duration,
}

impl InMemoryTimestamps {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            stamps: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    fn stamps(&self) -> Result<MutexGuard<'_, HashMap<TableSpace, DateTime<Utc>>>, CacheError> {
        self.stamps
            .lock()
            .map_err(|_| CacheError("update timestamps region is poisoned".to_string()))
    }

    /// Last recorded modification time of `space`
    pub fn timestamp(&self, space: &TableSpace) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.stamps()?.get(space).copied())
    }

    /// True when none of `spaces` changed at or after `since`
    pub fn is_up_to_date(
        &self,
        spaces: &[TableSpace],
        since: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let stamps = self.stamps()?;
        for space in spaces {
            if let Some(last_update) = stamps.get(space) {
                if *last_update >= since {
                    debug!(
                        "[{}] last update timestamp: {}, result set timestamp: {}",
                        space, last_update, since
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl Default for InMemoryTimestamps {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateTimestampsCache for InMemoryTimestamps {
    fn pre_invalidate(&self, spaces: &[TableSpace]) -> Result<(), CacheError> {
        let until = Utc::now() + self.lock_timeout;
        let mut stamps = self.stamps()?;
        for space in spaces {
            trace!("Pre-invalidating space [{}]", space);
            stamps.insert(space.clone(), until);
        }
        Ok(())
    }

    fn invalidate(&self, spaces: &[TableSpace]) -> Result<(), CacheError> {
        let now = Utc::now();
        let mut stamps = self.stamps()?;
        for space in spaces {
            trace!("Invalidating space [{}], timestamp: {}", space, now);
            stamps.insert(space.clone(), now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_space_is_up_to_date() {
        let cache = InMemoryTimestamps::new();
        assert!(cache.is_up_to_date(&["employee".into()], Utc::now()).unwrap());
    }

    #[test]
    fn test_pre_invalidation_makes_queries_stale() {
        let cache = InMemoryTimestamps::new();
        let queried_at = Utc::now();
        cache.pre_invalidate(&["employee".into()]).unwrap();

        assert!(!cache.is_up_to_date(&["employee".into()], queried_at).unwrap());
        assert!(cache.is_up_to_date(&["department".into()], queried_at).unwrap());
    }

    #[test]
    fn test_invalidate_replaces_future_mark() {
        let cache = InMemoryTimestamps::new();
        let space = TableSpace::new("employee");
        cache.pre_invalidate(std::slice::from_ref(&space)).unwrap();
        let locked_until = cache.timestamp(&space).unwrap().unwrap();

        cache.invalidate(std::slice::from_ref(&space)).unwrap();
        let stamped = cache.timestamp(&space).unwrap().unwrap();
        assert!(stamped < locked_until);

        let later = stamped + Duration::milliseconds(1);
        assert!(cache.is_up_to_date(std::slice::from_ref(&space), later).unwrap());
    }
}
