use super::ActionQueue;
use crate::action::CompletionError;
use crate::core::{EngineError, Result};
use log::error;
use serde::Serialize;
use tracing::{Level, event, info_span};

/// Outcome of the after-transaction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    /// Actions whose callback was invoked
    pub notified: usize,
    /// Cache failures that were logged and skipped
    pub cache_failures: usize,
}

impl ActionQueue {
    /// Notifies every registered action that the transaction ended and
    /// invalidates their table spaces in the query cache.
    ///
    /// Invalidation runs even when an action's callback fails. Cache
    /// failures are logged and counted; any other callback failure stops
    /// the pass and is returned as [`EngineError::UnexpectedCallback`].
    /// The registered list is empty afterwards in every case.
    pub fn after_transaction_completion(&mut self, success: bool) -> Result<CompletionReport> {
        let span = info_span!(
            "action_queue.after_completion",
            success,
            registered = self.executions.len()
        );
        let _enter = span.enter();

        let cache = self.query_cache();
        let executions = std::mem::take(&mut self.executions);
        let mut report = CompletionReport::default();

        for mut executable in executions {
            let callback = executable.after_transaction_completion(success);
            report.notified += 1;

            if let Some(cache) = cache.as_deref() {
                if let Err(err) = cache.invalidate(executable.table_spaces()) {
                    error!("could not release a cache lock: {}", err);
                    report.cache_failures += 1;
                }
            }

            match callback {
                Ok(()) => {}
                Err(CompletionError::Cache(err)) => {
                    error!("could not release a cache lock: {}", err);
                    report.cache_failures += 1;
                }
                Err(CompletionError::Unexpected(err)) => {
                    event!(Level::ERROR, error = %err, "after-transaction callback failed");
                    return Err(EngineError::UnexpectedCallback(err));
                }
            }
        }

        event!(Level::DEBUG, notified = report.notified, "after-transaction pass finished");
        Ok(report)
    }
}
