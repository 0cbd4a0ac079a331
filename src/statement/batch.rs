// ============================================================================
// Batch Executor
// ============================================================================
//
// At most one batch statement is held at a time, keyed by its SQL text.
// Asking for the same SQL again reuses the held statement; asking for a
// different SQL first executes and closes the held one. Whatever happens
// during execution, the held statement is closed and the slot cleared.
//
// ============================================================================

use super::expectation::Expectation;
use super::inspector::{inspect, log_statement};
use super::manager::{CloseMode, StatementManager};
use crate::connection::{PrepareOptions, Statement};
use crate::core::{DriverError, EngineError, Result};
use log::{debug, warn};

pub(crate) struct HeldBatch {
    pub(crate) statement: Box<dyn Statement>,
    pub(crate) sql: String,
    pub(crate) expectations: Vec<Expectation>,
}

#[derive(Default)]
pub(crate) struct BatchSlot {
    held: Option<HeldBatch>,
}

impl BatchSlot {
    fn holds(&self, sql: &str) -> bool {
        self.held.as_ref().is_some_and(|held| held.sql == sql)
    }

    fn hold(&mut self, statement: Box<dyn Statement>, sql: String) {
        self.held = Some(HeldBatch {
            statement,
            sql,
            expectations: Vec::new(),
        });
    }

    pub(crate) fn take(&mut self) -> Option<HeldBatch> {
        self.held.take()
    }

    pub(crate) fn is_held(&self) -> bool {
        self.held.is_some()
    }
}

/// Sends every pending entry of `statement` and checks each row count
fn run_pending_batch(statement: &mut dyn Statement, expectations: Vec<Expectation>) -> Result<()> {
    if expectations.is_empty() {
        debug!("no batched statements to execute");
        return Ok(());
    }

    debug!("Executing batch size: {}", expectations.len());
    let counts = statement.execute_batch().map_err(|source| {
        EngineError::execution("Could not execute JDBC batch update", statement.sql(), source)
    })?;

    if counts.len() != expectations.len() {
        return Err(EngineError::execution(
            "Could not execute JDBC batch update",
            statement.sql(),
            DriverError::new(format!(
                "driver returned {} row counts for {} batch entries",
                counts.len(),
                expectations.len()
            )),
        ));
    }

    for (position, (expectation, count)) in expectations.iter().zip(counts).enumerate() {
        expectation.verify(count, position, statement.sql())?;
    }
    Ok(())
}

impl StatementManager {
    /// Returns the batch statement for `sql`, preparing it only when the
    /// held statement has different SQL text.
    ///
    /// Binding parameters and calling [`StatementManager::add_to_batch`] is
    /// the caller's job.
    pub fn prepare_batch_statement(&mut self, sql: &str) -> Result<&mut dyn Statement> {
        self.hold_batch_statement(sql, PrepareOptions::default())
    }

    pub fn prepare_batch_callable_statement(&mut self, sql: &str) -> Result<&mut dyn Statement> {
        self.hold_batch_statement(sql, PrepareOptions::callable())
    }

    fn hold_batch_statement(
        &mut self,
        sql: &str,
        options: PrepareOptions,
    ) -> Result<&mut dyn Statement> {
        let sql = inspect(self.inspector(), sql)?;

        if self.batch.holds(&sql) {
            debug!("reusing prepared statement");
            log_statement(&sql, self.settings().show_sql);
        } else {
            let statement = self.open_inspected(&sql, options, true)?;
            self.batch.hold(statement, sql);
        }

        match self.batch.held.as_mut() {
            Some(held) => Ok(held.statement.as_mut()),
            None => Err(EngineError::InvalidState(
                "batch statement missing after prepare".to_string(),
            )),
        }
    }

    /// Adds the current binds of the held batch statement to its batch.
    ///
    /// Reaching the configured batch size sends the batch early; the
    /// statement stays held for further entries.
    pub fn add_to_batch(&mut self, expectation: Expectation) -> Result<()> {
        let batch_size = self.settings().jdbc_batch_size;
        let Some(held) = self.batch.held.as_mut() else {
            return Err(EngineError::InvalidState(
                "add_to_batch called without a prepared batch statement".to_string(),
            ));
        };

        held.statement.add_batch().map_err(|source| {
            EngineError::execution("Could not add to JDBC batch", &held.sql, source)
        })?;
        held.expectations.push(expectation);

        if batch_size > 0 && held.expectations.len() >= batch_size {
            let expectations = std::mem::take(&mut held.expectations);
            run_pending_batch(held.statement.as_mut(), expectations)?;
        }
        Ok(())
    }

    /// Executes and releases the held batch statement, if any.
    pub fn execute_batch(&mut self) -> Result<()> {
        let Some(held) = self.batch.take() else {
            return Ok(());
        };
        let HeldBatch {
            mut statement,
            sql,
            expectations,
        } = held;

        debug!("executing batch for [{}]", sql);
        let executed = run_pending_batch(statement.as_mut(), expectations);
        let closed = self.close_prepared(statement.as_mut(), CloseMode::Normal);

        match (executed, closed) {
            (Err(err), closed) => {
                if let Err(close_err) = closed {
                    warn!("Could not close batch statement after failure: {}", close_err);
                }
                Err(err)
            }
            (Ok(()), Err(EngineError::ResourceClose { source, .. })) => Err(EngineError::execution(
                "Could not execute JDBC batch update",
                &sql,
                source,
            )),
            (Ok(()), closed) => closed,
        }
    }

    /// Drops the held batch statement after a failure that happened before
    /// [`StatementManager::execute_batch`] was reached.
    ///
    /// Close failures are logged so they do not mask `cause`.
    pub fn abort_batch(&mut self, cause: &dyn std::error::Error) {
        let Some(mut held) = self.batch.take() else {
            return;
        };

        debug!("aborting batch [{}] after: {}", held.sql, cause);
        if let Err(err) = self.close_prepared(held.statement.as_mut(), CloseMode::Normal) {
            warn!("{}", err);
        }
    }

    /// SQL text of the held batch statement
    pub fn batch_sql(&self) -> Option<&str> {
        self.batch.held.as_ref().map(|held| held.sql.as_str())
    }

    /// Entries added to the held batch and not yet sent
    pub fn pending_batch_entries(&self) -> usize {
        self.batch
            .held
            .as_ref()
            .map_or(0, |held| held.expectations.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::EngineSettings;
    use crate::connection::{Fault, JournalEvent, LazyConnectionManager, RecordingDatabase};
    use crate::core::{EngineError, Value};
    use crate::statement::{Expectation, StatementManager};

    fn manager(db: &RecordingDatabase, settings: EngineSettings) -> StatementManager {
        StatementManager::new(LazyConnectionManager::new(db.clone()), settings)
    }

    #[test]
    fn test_same_sql_reuses_held_statement() {
        let db = RecordingDatabase::new();
        let mut statements = manager(&db, EngineSettings::default());

        for id in 1..=3 {
            let stmt = statements
                .prepare_batch_statement("insert into employee (id) values (?)")
                .unwrap();
            stmt.bind(&[Value::Integer(id)]).unwrap();
            statements.add_to_batch(Expectation::RowCount(1)).unwrap();
        }

        assert_eq!(db.prepared_sql().len(), 1);
        assert_eq!(statements.pending_batch_entries(), 3);

        statements.execute_batch().unwrap();
        assert_eq!(
            db.executed_batches(),
            vec![("insert into employee (id) values (?)".to_string(), 3)]
        );
        assert!(statements.batch_sql().is_none());
        assert!(db.unclosed_statements().is_empty());
    }

    #[test]
    fn test_callable_batch_reuses_held_statement() {
        let db = RecordingDatabase::new();
        let mut statements = manager(&db, EngineSettings::default());

        for id in 1..=2 {
            statements
                .prepare_batch_callable_statement("{call archive_employee(?)}")
                .unwrap()
                .bind(&[Value::Integer(id)])
                .unwrap();
            statements.add_to_batch(Expectation::None).unwrap();
        }
        statements.execute_batch().unwrap();

        let callable_prepares = db
            .journal()
            .into_iter()
            .filter(|e| matches!(e, JournalEvent::Prepare { options, .. } if options.callable))
            .count();
        assert_eq!(callable_prepares, 1);
        assert_eq!(
            db.executed_batches(),
            vec![("{call archive_employee(?)}".to_string(), 2)]
        );
    }

    #[test]
    fn test_batch_size_sends_early_and_keeps_statement() {
        let db = RecordingDatabase::new();
        let mut statements = manager(&db, EngineSettings::new().jdbc_batch_size(2));

        for id in 1..=5 {
            statements
                .prepare_batch_statement("update t set v = ?")
                .unwrap()
                .bind(&[Value::Integer(id)])
                .unwrap();
            statements.add_to_batch(Expectation::None).unwrap();
        }
        assert_eq!(statements.pending_batch_entries(), 1);
        statements.execute_batch().unwrap();

        let sizes: Vec<usize> = db.executed_batches().into_iter().map(|(_, n)| n).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(db.prepared_sql().len(), 1);
    }

    #[test]
    fn test_add_to_batch_without_statement_fails() {
        let db = RecordingDatabase::new();
        let mut statements = manager(&db, EngineSettings::default());
        let err = statements.add_to_batch(Expectation::None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn test_execute_batch_failure_still_closes() {
        let db = RecordingDatabase::new();
        db.inject(Fault::ExecuteBatch {
            sql: "insert into t values (?)".into(),
        });
        let mut statements = manager(&db, EngineSettings::default());
        statements
            .prepare_batch_statement("insert into t values (?)")
            .unwrap()
            .bind(&[Value::Integer(1)])
            .unwrap();
        statements.add_to_batch(Expectation::None).unwrap();

        let err = statements.execute_batch().unwrap_err();
        assert_eq!(err.sql(), Some("insert into t values (?)"));
        assert!(statements.batch_sql().is_none());
        assert!(db.unclosed_statements().is_empty());
    }

    #[test]
    fn test_stale_row_count_reported() {
        let db = RecordingDatabase::new().with_row_count("update t set v = 1 where id = ?", 0);
        let mut statements = manager(&db, EngineSettings::default());
        statements
            .prepare_batch_statement("update t set v = 1 where id = ?")
            .unwrap()
            .bind(&[Value::Integer(9)])
            .unwrap();
        statements.add_to_batch(Expectation::RowCount(1)).unwrap();

        let err = statements.execute_batch().unwrap_err();
        assert!(matches!(err, EngineError::StaleState { actual: 0, expected: 1, .. }));
        assert!(db.unclosed_statements().is_empty());
    }

    #[test]
    fn test_abort_batch_swallows_close_failure() {
        let db = RecordingDatabase::new();
        db.inject(Fault::CloseStatement { nth: 1 });
        let mut statements = manager(&db, EngineSettings::default());
        statements.prepare_batch_statement("delete from t where id = ?").unwrap();

        let cause = EngineError::InvalidState("binding failed".into());
        statements.abort_batch(&cause);

        assert!(statements.batch_sql().is_none());
        assert!(db.executed_batches().is_empty());
    }
}
