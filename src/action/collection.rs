use super::ActionKind;
use super::executable::{CompletionError, Executable, OrderingKey, PendingAction};
use super::work::ActionWork;
use crate::core::{Identifier, Result, TableSpace};
use crate::statement::StatementManager;
use std::fmt;

/// Pending recreate, update or removal of one collection
pub struct CollectionAction {
    role: String,
    key: Option<Identifier>,
    spaces: Vec<TableSpace>,
    kind: ActionKind,
    work: Box<dyn ActionWork>,
}

impl CollectionAction {
    /// `role` names the collection (`"Department.employees"`), `key` is the
    /// owner's identifier.
    pub fn new(
        role: impl Into<String>,
        key: Option<Identifier>,
        work: impl ActionWork + 'static,
    ) -> Self {
        Self {
            role: role.into(),
            key,
            spaces: Vec::new(),
            kind: ActionKind::CollectionUpdate,
            work: Box::new(work),
        }
    }

    pub fn with_table_space(mut self, space: impl Into<TableSpace>) -> Self {
        self.spaces.push(space.into());
        self
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn key(&self) -> Option<&Identifier> {
        self.key.as_ref()
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: ActionKind) {
        self.kind = kind;
    }
}

impl fmt::Debug for CollectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionAction")
            .field("role", &self.role)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Executable for CollectionAction {
    fn table_spaces(&self) -> &[TableSpace] {
        &self.spaces
    }

    fn has_after_transaction_completion(&self) -> bool {
        self.work.has_after_transaction_completion()
    }

    fn before_executions(&mut self) -> Result<()> {
        self.work.before_executions()
    }

    fn execute(&mut self, statements: &mut StatementManager) -> Result<()> {
        self.work.execute(statements)
    }

    fn after_transaction_completion(
        &mut self,
        success: bool,
    ) -> std::result::Result<(), CompletionError> {
        self.work.after_transaction_completion(success)
    }

    fn ordering_key(&self) -> OrderingKey {
        OrderingKey {
            name: self.role.clone(),
            id: self.key.clone(),
        }
    }

    fn describe(&self) -> PendingAction {
        PendingAction {
            kind: self.kind,
            name: self.role.clone(),
            id: self.key.clone(),
            table_spaces: self.spaces.clone(),
        }
    }
}
