use super::ActionKind;
use super::executable::{CompletionError, Executable, OrderingKey, PendingAction};
use crate::core::{Result, TableSpace};
use crate::statement::StatementManager;
use log::debug;

/// Cache cleanup after a bulk `update`/`delete` statement.
///
/// Runs no SQL of its own; it only exists so the affected table spaces are
/// invalidated when the transaction ends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkCleanup {
    spaces: Vec<TableSpace>,
}

impl BulkCleanup {
    pub fn new(spaces: impl IntoIterator<Item = impl Into<TableSpace>>) -> Self {
        Self {
            spaces: spaces.into_iter().map(Into::into).collect(),
        }
    }
}

impl Executable for BulkCleanup {
    fn table_spaces(&self) -> &[TableSpace] {
        &self.spaces
    }

    fn has_after_transaction_completion(&self) -> bool {
        true
    }

    fn before_executions(&mut self) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, _statements: &mut StatementManager) -> Result<()> {
        Ok(())
    }

    fn after_transaction_completion(
        &mut self,
        success: bool,
    ) -> std::result::Result<(), CompletionError> {
        debug!("bulk cleanup for {:?} after transaction (success: {})", self.spaces, success);
        Ok(())
    }

    fn ordering_key(&self) -> OrderingKey {
        OrderingKey {
            name: String::new(),
            id: None,
        }
    }

    fn describe(&self) -> PendingAction {
        PendingAction {
            kind: ActionKind::BulkCleanup,
            name: "bulk".to_string(),
            id: None,
            table_spaces: self.spaces.clone(),
        }
    }
}
