use super::ActionKind;
use crate::core::{CacheError, Identifier, Result, TableSpace};
use crate::statement::StatementManager;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure raised by an after-transaction callback.
///
/// Cache failures are logged and processing continues; anything else aborts
/// the remaining callbacks.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Sort key used when update ordering is enabled: entity name or collection
/// role first, then the identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderingKey {
    pub name: String,
    pub id: Option<Identifier>,
}

/// Read-only description of one queued action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub name: String,
    pub id: Option<Identifier>,
    pub table_spaces: Vec<TableSpace>,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}({}#{})", self.kind, self.name, id),
            None => write!(f, "{}({})", self.kind, self.name),
        }
    }
}

/// Something the action queue can run during flush and notify after the
/// transaction ends.
pub trait Executable {
    fn table_spaces(&self) -> &[TableSpace];

    /// Whether this action must stay registered until the transaction ends
    fn has_after_transaction_completion(&self) -> bool;

    /// Pre-flush hook run before any SQL for the flush is issued
    fn before_executions(&mut self) -> Result<()>;

    fn execute(&mut self, statements: &mut StatementManager) -> Result<()>;

    fn after_transaction_completion(
        &mut self,
        success: bool,
    ) -> std::result::Result<(), CompletionError>;

    fn ordering_key(&self) -> OrderingKey;

    fn describe(&self) -> PendingAction;
}
