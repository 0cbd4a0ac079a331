// ============================================================================
// Action Queue
// ============================================================================
//
// Six per-kind buffers filled by the session during the unit of work, plus
// the list of executed actions waiting for the end of the transaction.
//
// Flush order is fixed:
//   insert -> update -> collection remove -> collection update
//          -> collection recreate -> delete
// and the held batch is forced after every buffer.
//
// ============================================================================

mod completion;
mod snapshot;
mod sorter;

pub use completion::CompletionReport;
pub use snapshot::QueueSnapshot;

use crate::action::{Action, ActionKind, CollectionAction, EntityAction, EntityInsert, Executable};
use crate::cache::UpdateTimestampsCache;
use crate::config::EngineSettings;
use crate::core::{EngineError, Result, TableSpace};
use crate::statement::StatementManager;
use log::{debug, trace};
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// Write-behind buffer of one session
pub struct ActionQueue {
    settings: EngineSettings,
    timestamps: Option<Arc<dyn UpdateTimestampsCache>>,

    insertions: Vec<EntityInsert>,
    updates: Vec<EntityAction>,
    deletions: Vec<EntityAction>,
    collection_creations: Vec<CollectionAction>,
    collection_updates: Vec<CollectionAction>,
    collection_removals: Vec<CollectionAction>,

    executions: Vec<Box<dyn Executable>>,
}

impl ActionQueue {
    /// `timestamps` is required when the query cache is enabled
    pub fn new(
        settings: EngineSettings,
        timestamps: Option<Arc<dyn UpdateTimestampsCache>>,
    ) -> Result<Self> {
        settings.validate()?;
        if settings.query_cache_enabled && timestamps.is_none() {
            return Err(EngineError::Configuration(
                "query cache is enabled but no update timestamps cache was supplied".to_string(),
            ));
        }

        Ok(Self {
            settings,
            timestamps,
            insertions: Vec::new(),
            updates: Vec::new(),
            deletions: Vec::new(),
            collection_creations: Vec::new(),
            collection_updates: Vec::new(),
            collection_removals: Vec::new(),
            executions: Vec::new(),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn query_cache(&self) -> Option<Arc<dyn UpdateTimestampsCache>> {
        if self.settings.query_cache_enabled {
            self.timestamps.clone()
        } else {
            None
        }
    }

    /// Appends `action` to the buffer of its kind. No ordering, no
    /// duplicate detection.
    pub fn enqueue(&mut self, action: Action) {
        trace!("enqueue {}", action.kind());
        match action {
            Action::Insert(insert) => self.insertions.push(insert),
            Action::IdentityInsert(mut insert) => {
                insert.mark_identity();
                self.insertions.push(insert);
            }
            Action::Update(update) => self.updates.push(update.routed(ActionKind::Update)),
            Action::Delete(delete) => self.deletions.push(delete.routed(ActionKind::Delete)),
            Action::CollectionRecreate(action) => {
                self.collection_creations
                    .push(action.routed(ActionKind::CollectionRecreate));
            }
            Action::CollectionUpdate(action) => {
                self.collection_updates
                    .push(action.routed(ActionKind::CollectionUpdate));
            }
            Action::CollectionRemove(action) => {
                self.collection_removals
                    .push(action.routed(ActionKind::CollectionRemove));
            }
            Action::BulkCleanup(cleanup) => self.executions.push(Box::new(cleanup)),
        }
    }

    // ------------------------------------------------------------------
    // Ordering and preparation
    // ------------------------------------------------------------------

    /// Regroups pending inserts into dependency-safe batches when insert
    /// ordering is enabled.
    pub fn sort_inserts(&mut self) {
        if !self.settings.order_inserts {
            return;
        }
        let pending = std::mem::take(&mut self.insertions);
        self.insertions = sorter::sort_inserts(pending);
    }

    /// Stable sort of updates and collection actions by ordering key when
    /// update ordering is enabled.
    pub fn sort_updates_and_collections(&mut self) {
        if !self.settings.order_updates {
            return;
        }
        debug!("sorting updates and collection actions");
        self.updates.sort_by_key(|action| action.ordering_key());
        self.collection_removals.sort_by_key(|action| action.ordering_key());
        self.collection_updates.sort_by_key(|action| action.ordering_key());
        self.collection_creations.sort_by_key(|action| action.ordering_key());
    }

    /// Runs the pre-execution hook of every collection action, in enqueue order
    pub fn prepare_collection_actions(&mut self) -> Result<()> {
        let collections = self
            .collection_removals
            .iter_mut()
            .chain(self.collection_updates.iter_mut())
            .chain(self.collection_creations.iter_mut());
        for action in collections {
            action.before_executions()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Executes only the pending inserts
    pub fn execute_inserts(&mut self, statements: &mut StatementManager) -> Result<()> {
        let span = info_span!(
            "action_queue.execute",
            phase = "inserts",
            pending = self.insertions.len()
        );
        let _enter = span.enter();

        let cache = self.query_cache();
        run_buffer(
            "insertions",
            &mut self.insertions,
            &mut self.executions,
            cache.as_deref(),
            statements,
        )
    }

    /// Executes every buffer in flush order.
    ///
    /// On failure the failing buffer keeps the actions that had not run yet,
    /// later buffers are untouched, and the held batch is discarded.
    pub fn execute_actions(&mut self, statements: &mut StatementManager) -> Result<()> {
        let span = info_span!(
            "action_queue.execute",
            phase = "all",
            pending = self.pending_count()
        );
        let _enter = span.enter();

        let cache = self.query_cache();
        let cache = cache.as_deref();
        run_buffer("insertions", &mut self.insertions, &mut self.executions, cache, statements)?;
        run_buffer("updates", &mut self.updates, &mut self.executions, cache, statements)?;
        run_buffer(
            "collection_removals",
            &mut self.collection_removals,
            &mut self.executions,
            cache,
            statements,
        )?;
        run_buffer(
            "collection_updates",
            &mut self.collection_updates,
            &mut self.executions,
            cache,
            statements,
        )?;
        run_buffer(
            "collection_creations",
            &mut self.collection_creations,
            &mut self.executions,
            cache,
            statements,
        )?;
        run_buffer("deletions", &mut self.deletions, &mut self.executions, cache, statements)?;

        event!(Level::DEBUG, registered = self.executions.len(), "action queue flushed");
        Ok(())
    }

    /// Runs a single action outside the buffers, registering it for
    /// after-transaction processing when needed.
    pub fn execute(&mut self, action: Action, statements: &mut StatementManager) -> Result<()> {
        let cache = self.query_cache();
        let mut executable = action.into_executable();
        let outcome = execute_one(executable.as_mut(), cache.as_deref(), statements);
        if needs_completion(executable.as_ref(), cache.is_some()) {
            self.executions.push(executable);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// True when a pending action touches one of `spaces`; a query over
    /// those spaces must flush first.
    pub fn is_any_table_affected(&self, spaces: &[TableSpace]) -> bool {
        let affected = self.pending().find_map(|action| {
            action
                .table_spaces()
                .iter()
                .find(|space| spaces.contains(space))
        });
        match affected {
            Some(space) => {
                debug!("changes must be flushed to space: {}", space);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn has_inserts_or_deletes_pending(&self) -> bool {
        !self.insertions.is_empty() || !self.deletions.is_empty()
    }

    pub fn has_after_transaction_actions(&self) -> bool {
        !self.executions.is_empty()
    }

    pub fn number_of_insertions(&self) -> usize {
        self.insertions.len()
    }

    pub fn number_of_updates(&self) -> usize {
        self.updates.len()
    }

    pub fn number_of_deletions(&self) -> usize {
        self.deletions.len()
    }

    pub fn number_of_collection_creations(&self) -> usize {
        self.collection_creations.len()
    }

    pub fn number_of_collection_updates(&self) -> usize {
        self.collection_updates.len()
    }

    pub fn number_of_collection_removals(&self) -> usize {
        self.collection_removals.len()
    }

    pub fn number_of_after_transaction_actions(&self) -> usize {
        self.executions.len()
    }

    pub fn deletions(&self) -> &[EntityAction] {
        &self.deletions
    }

    pub fn insertions(&self) -> &[EntityInsert] {
        &self.insertions
    }

    fn pending_count(&self) -> usize {
        self.insertions.len()
            + self.updates.len()
            + self.deletions.len()
            + self.collection_creations.len()
            + self.collection_updates.len()
            + self.collection_removals.len()
    }

    /// Every buffered action, in flush order
    fn pending(&self) -> impl Iterator<Item = &dyn Executable> + '_ {
        let insertions = self.insertions.iter().map(|a| a as &dyn Executable);
        let updates = self.updates.iter().map(|a| a as &dyn Executable);
        let removals = self.collection_removals.iter().map(|a| a as &dyn Executable);
        let collection_updates = self.collection_updates.iter().map(|a| a as &dyn Executable);
        let creations = self.collection_creations.iter().map(|a| a as &dyn Executable);
        let deletions = self.deletions.iter().map(|a| a as &dyn Executable);

        insertions
            .chain(updates)
            .chain(removals)
            .chain(collection_updates)
            .chain(creations)
            .chain(deletions)
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Drops every buffered action. Actions waiting for the end of the
    /// transaction stay registered.
    pub fn clear(&mut self) {
        self.insertions.clear();
        self.updates.clear();
        self.deletions.clear();
        self.collection_creations.clear();
        self.collection_updates.clear();
        self.collection_removals.clear();
    }

    /// Undoes what a dry-run flush (used to decide whether a flush is
    /// needed) added: updates and collection creations/updates, plus
    /// collection removals beyond `previous_collection_removals`.
    pub fn clear_from_flush_needed_check(&mut self, previous_collection_removals: usize) {
        self.collection_creations.clear();
        self.collection_updates.clear();
        self.updates.clear();
        self.collection_removals.truncate(previous_collection_removals);
    }
}

fn needs_completion(action: &dyn Executable, query_cache: bool) -> bool {
    action.has_after_transaction_completion() || query_cache
}

fn execute_one(
    action: &mut dyn Executable,
    cache: Option<&dyn UpdateTimestampsCache>,
    statements: &mut StatementManager,
) -> Result<()> {
    if let Some(cache) = cache {
        cache.pre_invalidate(action.table_spaces())?;
    }
    action.execute(statements)
}

/// Executes `buffer` in order, then forces the held batch.
///
/// Executed actions that need after-transaction processing move to
/// `executions`. When an action fails, the held batch is aborted and the
/// actions after it are put back into `buffer`.
fn run_buffer<A>(
    phase: &'static str,
    buffer: &mut Vec<A>,
    executions: &mut Vec<Box<dyn Executable>>,
    cache: Option<&dyn UpdateTimestampsCache>,
    statements: &mut StatementManager,
) -> Result<()>
where
    A: Executable + 'static,
{
    event!(Level::DEBUG, phase, size = buffer.len(), "executing action buffer");

    let mut pending = std::mem::take(buffer).into_iter();
    while let Some(mut action) = pending.next() {
        let outcome = execute_one(&mut action, cache, statements);
        if needs_completion(&action, cache.is_some()) {
            executions.push(Box::new(action));
        }

        if let Err(err) = outcome {
            event!(Level::ERROR, phase, error = %err, "action execution failed");
            statements.abort_batch(&err);
            buffer.extend(pending);
            return Err(err);
        }
    }

    statements.execute_batch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{BulkCleanup, SqlWork};
    use crate::cache::InMemoryTimestamps;
    use crate::core::InstanceKey;

    fn queue(settings: EngineSettings) -> ActionQueue {
        ActionQueue::new(settings, None).unwrap()
    }

    fn entity_action(entity: &str, id: i64) -> EntityAction {
        EntityAction::new(entity, id, InstanceKey::new(), SqlWork::new())
            .with_table_space(entity.to_lowercase())
    }

    fn insert(entity: &str) -> EntityInsert {
        EntityInsert::new(entity, InstanceKey::new(), SqlWork::new())
    }

    fn collection(role: &str) -> CollectionAction {
        CollectionAction::new(role, None, SqlWork::new())
    }

    #[test]
    fn test_query_cache_requires_timestamps() {
        let err = ActionQueue::new(EngineSettings::new().query_cache(true), None).err().unwrap();
        assert!(err.is_configuration());

        let cache: Arc<dyn UpdateTimestampsCache> = Arc::new(InMemoryTimestamps::new());
        assert!(ActionQueue::new(EngineSettings::new().query_cache(true), Some(cache)).is_ok());
    }

    #[test]
    fn test_enqueue_routes_by_kind() {
        let mut queue = queue(EngineSettings::default());
        queue.enqueue(Action::Insert(insert("Employee")));
        queue.enqueue(Action::IdentityInsert(insert("Employee")));
        queue.enqueue(Action::Update(entity_action("Employee", 1)));
        queue.enqueue(Action::Delete(entity_action("Employee", 2)));
        queue.enqueue(Action::CollectionRemove(collection("Department.employees")));
        queue.enqueue(Action::BulkCleanup(BulkCleanup::new(["employee"])));

        assert_eq!(queue.number_of_insertions(), 2);
        assert!(queue.insertions()[1].is_identity());
        assert_eq!(queue.number_of_updates(), 1);
        assert_eq!(queue.number_of_deletions(), 1);
        assert_eq!(queue.deletions()[0].kind(), ActionKind::Delete);
        assert_eq!(queue.number_of_collection_removals(), 1);
        assert!(queue.has_after_transaction_actions());
        assert!(queue.has_pending_work());
        assert!(queue.has_inserts_or_deletes_pending());
    }

    #[test]
    fn test_affected_tables() {
        let mut queue = queue(EngineSettings::default());
        assert!(!queue.is_any_table_affected(&["employee".into()]));

        queue.enqueue(Action::Update(entity_action("Employee", 1)));
        assert!(queue.is_any_table_affected(&["employee".into(), "project".into()]));
        assert!(!queue.is_any_table_affected(&["department".into()]));
        assert!(!queue.has_inserts_or_deletes_pending());
    }

    #[test]
    fn test_sort_updates_only_when_enabled() {
        let mut unordered = queue(EngineSettings::default());
        let mut ordered = queue(EngineSettings::new().order_updates(true));
        for q in [&mut unordered, &mut ordered] {
            q.enqueue(Action::Update(entity_action("Employee", 2)));
            q.enqueue(Action::Update(entity_action("Department", 9)));
            q.enqueue(Action::Update(entity_action("Employee", 1)));
            q.sort_updates_and_collections();
        }

        let names = |q: &ActionQueue| -> Vec<String> {
            q.pending().map(|a| a.describe().to_string()).collect()
        };
        assert_eq!(
            names(&unordered),
            vec![
                "EntityUpdateAction(Employee#2)",
                "EntityUpdateAction(Department#9)",
                "EntityUpdateAction(Employee#1)"
            ]
        );
        assert_eq!(
            names(&ordered),
            vec![
                "EntityUpdateAction(Department#9)",
                "EntityUpdateAction(Employee#1)",
                "EntityUpdateAction(Employee#2)"
            ]
        );
    }

    #[test]
    fn test_clear_from_flush_needed_check() {
        let mut queue = queue(EngineSettings::default());
        queue.enqueue(Action::CollectionRemove(collection("A.items")));
        let before = queue.number_of_collection_removals();

        queue.enqueue(Action::Update(entity_action("Employee", 1)));
        queue.enqueue(Action::CollectionRecreate(collection("B.items")));
        queue.enqueue(Action::CollectionUpdate(collection("C.items")));
        queue.enqueue(Action::CollectionRemove(collection("D.items")));
        queue.enqueue(Action::Delete(entity_action("Employee", 3)));

        queue.clear_from_flush_needed_check(before);
        assert_eq!(queue.number_of_updates(), 0);
        assert_eq!(queue.number_of_collection_creations(), 0);
        assert_eq!(queue.number_of_collection_updates(), 0);
        assert_eq!(queue.number_of_collection_removals(), 1);
        assert_eq!(queue.number_of_deletions(), 1);

        queue.clear();
        assert!(!queue.has_pending_work());
    }

    #[test]
    fn test_prepare_collection_actions_runs_hooks_in_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Hooked {
            name: &'static str,
            seen: Rc<RefCell<Vec<&'static str>>>,
        }

        impl crate::action::ActionWork for Hooked {
            fn before_executions(&mut self) -> Result<()> {
                self.seen.borrow_mut().push(self.name);
                Ok(())
            }

            fn execute(&mut self, _statements: &mut StatementManager) -> Result<()> {
                Ok(())
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let hooked = |name| Hooked {
            name,
            seen: Rc::clone(&seen),
        };

        let mut queue = queue(EngineSettings::default());
        let recreate = CollectionAction::new("c", None, hooked("recreate"));
        queue.enqueue(Action::CollectionRecreate(recreate));
        queue.enqueue(Action::CollectionUpdate(CollectionAction::new("b", None, hooked("update"))));
        queue.enqueue(Action::CollectionRemove(CollectionAction::new("a", None, hooked("remove"))));
        queue.prepare_collection_actions().unwrap();

        assert_eq!(*seen.borrow(), vec!["remove", "update", "recreate"]);
    }
}
