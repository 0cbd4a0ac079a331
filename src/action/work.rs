use super::executable::CompletionError;
use crate::core::{EngineError, Result, Value};
use crate::statement::{Expectation, StatementManager};
use log::trace;

/// The body of an action: the SQL it issues and what it does once the
/// transaction has ended.
///
/// Supplied by whoever builds the action. Closures taking the statement
/// manager work for the simple case.
pub trait ActionWork {
    fn before_executions(&mut self) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, statements: &mut StatementManager) -> Result<()>;

    fn has_after_transaction_completion(&self) -> bool {
        false
    }

    fn after_transaction_completion(
        &mut self,
        _success: bool,
    ) -> std::result::Result<(), CompletionError> {
        Ok(())
    }
}

impl<F> ActionWork for F
where
    F: FnMut(&mut StatementManager) -> Result<()>,
{
    fn execute(&mut self, statements: &mut StatementManager) -> Result<()> {
        self(statements)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SqlStep {
    sql: String,
    params: Vec<Value>,
    expectation: Expectation,
    batchable: bool,
}

/// Runs a fixed list of parameterised statements.
///
/// Batchable steps go through the held batch statement, so consecutive
/// steps with the same SQL across actions end up in one round-trip.
/// The others run through a plain statement that is closed right away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlWork {
    steps: Vec<SqlStep>,
    after_completion: bool,
}

impl SqlWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batched(
        mut self,
        sql: impl Into<String>,
        params: Vec<Value>,
        expectation: Expectation,
    ) -> Self {
        self.steps.push(SqlStep {
            sql: sql.into(),
            params,
            expectation,
            batchable: true,
        });
        self
    }

    pub fn single(
        mut self,
        sql: impl Into<String>,
        params: Vec<Value>,
        expectation: Expectation,
    ) -> Self {
        self.steps.push(SqlStep {
            sql: sql.into(),
            params,
            expectation,
            batchable: false,
        });
        self
    }

    /// Keep the owning action registered until the transaction ends
    pub fn with_after_completion(mut self) -> Self {
        self.after_completion = true;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ActionWork for SqlWork {
    fn execute(&mut self, statements: &mut StatementManager) -> Result<()> {
        for step in &self.steps {
            if step.batchable {
                let statement = statements.prepare_batch_statement(&step.sql)?;
                statement.bind(&step.params).map_err(|source| {
                    EngineError::execution("could not bind parameters", &step.sql, source)
                })?;
                statements.add_to_batch(step.expectation)?;
                continue;
            }

            trace!("executing unbatched statement");
            let mut statement = statements.prepare_statement(&step.sql)?;
            let executed = statement
                .bind(&step.params)
                .and_then(|()| statement.execute_update())
                .map_err(|source| {
                    EngineError::execution("could not execute statement", &step.sql, source)
                })
                .and_then(|count| {
                    let count = i64::try_from(count).unwrap_or(i64::MAX);
                    step.expectation.verify(count, 0, &step.sql)
                });
            let closed = statements.close_statement(statement);
            executed?;
            closed?;
        }
        Ok(())
    }

    fn has_after_transaction_completion(&self) -> bool {
        self.after_completion
    }
}
