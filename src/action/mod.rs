// ============================================================================
// Actions
// ============================================================================
//
// An action is one buffered mutation. The session builds it from the entity
// descriptor (name, identifier, property snapshot, table spaces) and hands
// it to the action queue; the SQL it runs is supplied as an `ActionWork`.
//
// ============================================================================

mod cleanup;
mod collection;
mod entity;
mod executable;
mod work;

pub use cleanup::BulkCleanup;
pub use collection::CollectionAction;
pub use entity::{EntityAction, EntityInsert, PropertyType, PropertyValue};
pub use executable::{CompletionError, Executable, OrderingKey, PendingAction};
pub use work::{ActionWork, SqlWork};

use serde::Serialize;
use std::fmt;

/// Which buffer of the action queue an action belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Insert,
    IdentityInsert,
    Update,
    Delete,
    CollectionRecreate,
    CollectionUpdate,
    CollectionRemove,
    BulkCleanup,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "EntityInsertAction",
            Self::IdentityInsert => "EntityIdentityInsertAction",
            Self::Update => "EntityUpdateAction",
            Self::Delete => "EntityDeleteAction",
            Self::CollectionRecreate => "CollectionRecreateAction",
            Self::CollectionUpdate => "CollectionUpdateAction",
            Self::CollectionRemove => "CollectionRemoveAction",
            Self::BulkCleanup => "BulkOperationCleanupAction",
        };
        f.write_str(name)
    }
}

/// A mutation handed to [`crate::queue::ActionQueue::enqueue`]
#[derive(Debug)]
pub enum Action {
    Insert(EntityInsert),
    /// Insert whose identifier is generated by the database
    IdentityInsert(EntityInsert),
    Update(EntityAction),
    Delete(EntityAction),
    CollectionRecreate(CollectionAction),
    CollectionUpdate(CollectionAction),
    CollectionRemove(CollectionAction),
    BulkCleanup(BulkCleanup),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Insert(_) => ActionKind::Insert,
            Self::IdentityInsert(_) => ActionKind::IdentityInsert,
            Self::Update(_) => ActionKind::Update,
            Self::Delete(_) => ActionKind::Delete,
            Self::CollectionRecreate(_) => ActionKind::CollectionRecreate,
            Self::CollectionUpdate(_) => ActionKind::CollectionUpdate,
            Self::CollectionRemove(_) => ActionKind::CollectionRemove,
            Self::BulkCleanup(_) => ActionKind::BulkCleanup,
        }
    }

    /// The action as an executable, tagged with the kind it was created as
    pub fn into_executable(self) -> Box<dyn Executable> {
        match self {
            Self::Insert(insert) => Box::new(insert),
            Self::IdentityInsert(mut insert) => {
                insert.mark_identity();
                Box::new(insert)
            }
            Self::Update(update) => Box::new(update.routed(ActionKind::Update)),
            Self::Delete(delete) => Box::new(delete.routed(ActionKind::Delete)),
            Self::CollectionRecreate(action) => {
                Box::new(action.routed(ActionKind::CollectionRecreate))
            }
            Self::CollectionUpdate(action) => Box::new(action.routed(ActionKind::CollectionUpdate)),
            Self::CollectionRemove(action) => Box::new(action.routed(ActionKind::CollectionRemove)),
            Self::BulkCleanup(cleanup) => Box::new(cleanup),
        }
    }
}

impl EntityAction {
    pub(crate) fn routed(mut self, kind: ActionKind) -> Self {
        self.set_kind(kind);
        self
    }
}

impl CollectionAction {
    pub(crate) fn routed(mut self, kind: ActionKind) -> Self {
        self.set_kind(kind);
        self
    }
}
