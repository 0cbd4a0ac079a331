use crate::core::{DriverError, EngineError, Result};
use log::debug;

/// Driver row count meaning "succeeded, count unknown"
pub const SUCCESS_NO_INFO: i64 = -2;
/// Driver row count meaning "this batch entry failed"
pub const EXECUTE_FAILED: i64 = -3;

/// What a mutation expects the database to report for its batch entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expectation {
    /// Any outcome is accepted
    #[default]
    None,
    /// Exactly this many rows must be affected
    RowCount(i64),
}

impl Expectation {
    pub fn verify(&self, row_count: i64, batch_position: usize, sql: &str) -> Result<()> {
        match row_count {
            SUCCESS_NO_INFO => {
                debug!(
                    "success of batch update unknown: {} [{}]",
                    batch_position, sql
                );
                Ok(())
            }
            EXECUTE_FAILED => Err(EngineError::execution(
                format!("Batch update failed: {}", batch_position),
                sql,
                DriverError::new("driver reported EXECUTE_FAILED"),
            )),
            actual => match self {
                Self::None => Ok(()),
                Self::RowCount(expected) if *expected == actual => Ok(()),
                Self::RowCount(expected) => Err(EngineError::StaleState {
                    expected: *expected,
                    actual,
                    batch_position,
                    sql: sql.to_string(),
                }),
            },
        }
    }
}
