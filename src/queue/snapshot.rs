use super::ActionQueue;
use crate::action::{Executable, PendingAction};
use serde::Serialize;
use std::fmt;

/// Serializable view of everything an [`ActionQueue`] holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub insertions: Vec<PendingAction>,
    pub updates: Vec<PendingAction>,
    pub deletions: Vec<PendingAction>,
    pub collection_creations: Vec<PendingAction>,
    pub collection_removals: Vec<PendingAction>,
    pub collection_updates: Vec<PendingAction>,
    pub after_transaction: Vec<PendingAction>,
}

fn describe_all<'a, A>(actions: impl IntoIterator<Item = &'a A>) -> Vec<PendingAction>
where
    A: Executable + ?Sized + 'a,
{
    actions.into_iter().map(Executable::describe).collect()
}

impl ActionQueue {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            insertions: describe_all(&self.insertions),
            updates: describe_all(&self.updates),
            deletions: describe_all(&self.deletions),
            collection_creations: describe_all(&self.collection_creations),
            collection_removals: describe_all(&self.collection_removals),
            collection_updates: describe_all(&self.collection_updates),
            after_transaction: describe_all(self.executions.iter().map(|e| e.as_ref())),
        }
    }
}

struct List<'a>(&'a [PendingAction]);

impl fmt::Display for List<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, action) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", action)?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActionQueue[insertions={} updates={} deletions={} collectionCreations={} \
             collectionRemovals={} collectionUpdates={}]",
            List(&self.insertions),
            List(&self.updates),
            List(&self.deletions),
            List(&self.collection_creations),
            List(&self.collection_removals),
            List(&self.collection_updates),
        )
    }
}

impl fmt::Display for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

#[cfg(test)]
mod tests {
    use crate::EngineSettings;
    use crate::action::{Action, CollectionAction, EntityAction, EntityInsert, SqlWork};
    use crate::core::{Identifier, InstanceKey};
    use crate::queue::ActionQueue;

    fn sample() -> ActionQueue {
        let mut queue = ActionQueue::new(EngineSettings::default(), None).unwrap();
        queue.enqueue(Action::Insert(
            EntityInsert::new("Department", InstanceKey::new(), SqlWork::new())
                .with_id(1)
                .with_table_space("department"),
        ));
        queue.enqueue(Action::Delete(
            EntityAction::new("Employee", 4, InstanceKey::new(), SqlWork::new())
                .with_table_space("employee"),
        ));
        queue.enqueue(Action::CollectionRemove(CollectionAction::new(
            "Department.employees",
            Some(Identifier::Integer(1)),
            SqlWork::new(),
        )));
        queue
    }

    #[test]
    fn test_display_lists_every_buffer() {
        assert_eq!(
            sample().to_string(),
            "ActionQueue[insertions=[EntityInsertAction(Department#1)] updates=[] \
             deletions=[EntityDeleteAction(Employee#4)] collectionCreations=[] \
             collectionRemovals=[CollectionRemoveAction(Department.employees#1)] \
             collectionUpdates=[]]"
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(sample().snapshot()).unwrap();
        assert_eq!(json["insertions"][0]["kind"], "insert");
        assert_eq!(json["insertions"][0]["table_spaces"][0], "department");
        assert_eq!(json["deletions"][0]["id"], 4);
        assert_eq!(json["collection_removals"][0]["name"], "Department.employees");
        assert!(json["after_transaction"].as_array().unwrap().is_empty());
    }
}
