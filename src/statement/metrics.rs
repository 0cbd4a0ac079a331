use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Open-handle gauges and statement totals shared by every statement
/// manager that was handed the same `Arc<ResourceMetrics>`.
#[derive(Debug, Default)]
pub struct ResourceMetrics {
    open_statements: AtomicI64,
    open_result_sets: AtomicI64,
    statements_prepared: AtomicU64,
    statements_closed: AtomicU64,
}

/// Point-in-time copy of [`ResourceMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub open_statements: i64,
    pub open_result_sets: i64,
    pub statements_prepared: u64,
    pub statements_closed: u64,
}

impl ResourceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn statement_opened(&self) {
        self.open_statements.fetch_add(1, Ordering::SeqCst);
        self.statements_prepared.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn statement_closed(&self) {
        self.open_statements.fetch_sub(1, Ordering::SeqCst);
        self.statements_closed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn result_set_opened(&self) {
        self.open_result_sets.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn result_set_closed(&self) {
        self.open_result_sets.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn open_statements(&self) -> i64 {
        self.open_statements.load(Ordering::SeqCst)
    }

    pub fn open_result_sets(&self) -> i64 {
        self.open_result_sets.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            open_statements: self.open_statements(),
            open_result_sets: self.open_result_sets(),
            statements_prepared: self.statements_prepared.load(Ordering::SeqCst),
            statements_closed: self.statements_closed.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauges_and_totals() {
        let metrics = ResourceMetrics::new();
        metrics.statement_opened();
        metrics.statement_opened();
        metrics.statement_closed();
        metrics.result_set_opened();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.open_statements, 1);
        assert_eq!(snapshot.open_result_sets, 1);
        assert_eq!(snapshot.statements_prepared, 2);
        assert_eq!(snapshot.statements_closed, 1);
    }
}
