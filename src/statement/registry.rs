// ============================================================================
// Open-Handle Registry
// ============================================================================
//
// Owns every tracked query statement and every result set produced through
// the statement manager. Membership is the only record of "still open":
// a handle leaves its map exactly once, at close or teardown.
//
// ============================================================================

use crate::connection::{ResultSet, Statement};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STATEMENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_RESULT_SET_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a tracked query statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementId(u64);

impl StatementId {
    fn next() -> Self {
        StatementId(NEXT_STATEMENT_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt_{}", self.0)
    }
}

/// Handle to an open result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultSetId(u64);

impl ResultSetId {
    fn next() -> Self {
        ResultSetId(NEXT_RESULT_SET_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResultSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rs_{}", self.0)
    }
}

#[derive(Default)]
pub(crate) struct StatementRegistry {
    statements: BTreeMap<StatementId, Box<dyn Statement>>,
    result_sets: BTreeMap<ResultSetId, Box<dyn ResultSet>>,
    last_query: Option<StatementId>,
}

impl StatementRegistry {
    pub(crate) fn register_query(&mut self, statement: Box<dyn Statement>) -> StatementId {
        let id = StatementId::next();
        self.statements.insert(id, statement);
        self.last_query = Some(id);
        id
    }

    pub(crate) fn register_result_set(&mut self, result_set: Box<dyn ResultSet>) -> ResultSetId {
        let id = ResultSetId::next();
        self.result_sets.insert(id, result_set);
        id
    }

    pub(crate) fn statement_mut(&mut self, id: StatementId) -> Option<&mut dyn Statement> {
        match self.statements.get_mut(&id) {
            Some(statement) => Some(statement.as_mut()),
            None => None,
        }
    }

    pub(crate) fn result_set_mut(&mut self, id: ResultSetId) -> Option<&mut dyn ResultSet> {
        match self.result_sets.get_mut(&id) {
            Some(result_set) => Some(result_set.as_mut()),
            None => None,
        }
    }

    pub(crate) fn remove_statement(&mut self, id: StatementId) -> Option<Box<dyn Statement>> {
        self.statements.remove(&id)
    }

    pub(crate) fn remove_result_set(&mut self, id: ResultSetId) -> Option<Box<dyn ResultSet>> {
        self.result_sets.remove(&id)
    }

    pub(crate) fn drain_statements(&mut self) -> BTreeMap<StatementId, Box<dyn Statement>> {
        std::mem::take(&mut self.statements)
    }

    pub(crate) fn drain_result_sets(&mut self) -> BTreeMap<ResultSetId, Box<dyn ResultSet>> {
        std::mem::take(&mut self.result_sets)
    }

    pub(crate) fn last_query(&self) -> Option<StatementId> {
        self.last_query
    }

    pub(crate) fn forget_last_query(&mut self, id: StatementId) {
        if self.last_query == Some(id) {
            self.last_query = None;
        }
    }

    pub(crate) fn clear_last_query(&mut self) {
        self.last_query = None;
    }

    pub(crate) fn contains_statement(&self, id: StatementId) -> bool {
        self.statements.contains_key(&id)
    }

    pub(crate) fn contains_result_set(&self, id: ResultSetId) -> bool {
        self.result_sets.contains_key(&id)
    }

    pub(crate) fn statement_count(&self) -> usize {
        self.statements.len()
    }

    pub(crate) fn result_set_count(&self) -> usize {
        self.result_sets.len()
    }

    pub(crate) fn has_open_resources(&self) -> bool {
        !self.statements.is_empty() || !self.result_sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionProvider, PrepareOptions, RecordingDatabase};

    #[test]
    fn test_register_and_remove_once() {
        let db = RecordingDatabase::new();
        let mut conn = db.open_connection().unwrap();
        let mut registry = StatementRegistry::default();

        let stmt = conn.prepare("select 1", &PrepareOptions::default()).unwrap();
        let id = registry.register_query(stmt);
        assert!(registry.has_open_resources());
        assert_eq!(registry.last_query(), Some(id));

        assert!(registry.remove_statement(id).is_some());
        assert!(registry.remove_statement(id).is_none());
        assert!(!registry.has_open_resources());
    }

    #[test]
    fn test_forget_last_query_only_matches_same_id() {
        let db = RecordingDatabase::new();
        let mut conn = db.open_connection().unwrap();
        let mut registry = StatementRegistry::default();

        let options = PrepareOptions::default();
        let first = registry.register_query(conn.prepare("a", &options).unwrap());
        let second = registry.register_query(conn.prepare("b", &options).unwrap());

        registry.forget_last_query(first);
        assert_eq!(registry.last_query(), Some(second));
        registry.forget_last_query(second);
        assert_eq!(registry.last_query(), None);
    }
}
