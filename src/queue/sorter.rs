// ============================================================================
// Insert Dependency Sorter
// ============================================================================
//
// Single greedy pass over the pending inserts in enqueue order. Each entity
// name keeps reusing its latest batch until one of its inserts references
// an instance sitting in a later batch; that insert opens a new batch.
// Batches are then concatenated in ascending order.
//
// ============================================================================

use crate::action::EntityInsert;
use crate::core::InstanceKey;
use log::{debug, trace};
use std::collections::HashMap;

/// Transient state of one sort; dropped when the sort returns
struct InsertSorter {
    /// Highest batch number handed out per entity name
    latest_batches: HashMap<String, usize>,
    /// Final batch number of every instance seen so far
    entity_batch: HashMap<InstanceKey, usize>,
    /// Batch number -> inserts in first-assigned order
    batches: Vec<Vec<EntityInsert>>,
}

impl InsertSorter {
    fn with_capacity(inserts: usize) -> Self {
        Self {
            latest_batches: HashMap::new(),
            entity_batch: HashMap::with_capacity(inserts + 1),
            batches: Vec::new(),
        }
    }

    fn sort(mut self, insertions: Vec<EntityInsert>) -> Vec<EntityInsert> {
        for insert in insertions {
            let batch_number = match self.latest_batches.get(insert.entity_name()) {
                Some(&latest) => self.find_batch_number(&insert, latest),
                None => {
                    let fresh = self.batches.len();
                    self.latest_batches.insert(insert.entity_name().to_string(), fresh);
                    fresh
                }
            };

            trace!(
                "{} {} assigned to insert batch {}",
                insert.entity_name(),
                insert.instance(),
                batch_number
            );
            self.entity_batch.insert(insert.instance(), batch_number);
            self.add_to_batch(batch_number, insert);
        }

        debug!("sorted inserts into {} batches", self.batches.len());
        self.batches.into_iter().flatten().collect()
    }

    /// The entity's latest batch, or a new one if a referenced instance was
    /// placed in a later batch.
    fn find_batch_number(&mut self, insert: &EntityInsert, latest: usize) -> usize {
        for referenced in insert.entity_references() {
            let Some(&referenced_batch) = self.entity_batch.get(&referenced) else {
                continue;
            };
            if referenced_batch > latest {
                let fresh = self.batches.len();
                self.latest_batches.insert(insert.entity_name().to_string(), fresh);
                return fresh;
            }
        }
        latest
    }

    fn add_to_batch(&mut self, batch_number: usize, insert: EntityInsert) {
        match self.batches.get_mut(batch_number) {
            Some(batch) => batch.push(insert),
            None => self.batches.push(vec![insert]),
        }
    }
}

/// Reorders `insertions` so every insert follows the inserts of the pending
/// instances it references, keeping same-entity inserts adjacent where that
/// is safe.
pub(crate) fn sort_inserts(insertions: Vec<EntityInsert>) -> Vec<EntityInsert> {
    InsertSorter::with_capacity(insertions.len()).sort(insertions)
}
