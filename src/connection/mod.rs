// ============================================================================
// Database Handle Capabilities
// ============================================================================
//
// The engine never talks to a wire protocol. Everything it needs from the
// database is expressed by the traits below: a connection that prepares
// statements, statements that bind/execute/batch/close, and result sets
// that yield rows and close.
//
// ============================================================================

pub mod manager;
pub mod recording;

use crate::core::{DriverResult, Result, Row, Value};
use serde::{Deserialize, Serialize};

pub use manager::{LazyConnectionManager, ReleaseMode};
pub use recording::{Fault, JournalEvent, RecordingDatabase};

/// Cursor behaviour requested for a query statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScrollMode {
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Generated-key retrieval requested for a statement
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeneratedKeys {
    #[default]
    None,
    /// Let the driver return every generated key
    Auto,
    /// Return the named generated columns
    Columns(Vec<String>),
}

/// Options passed through to [`DatabaseConnection::prepare`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrepareOptions {
    pub callable: bool,
    pub scroll: Option<ScrollMode>,
    pub generated_keys: GeneratedKeys,
}

impl PrepareOptions {
    pub fn callable() -> Self {
        Self {
            callable: true,
            ..Self::default()
        }
    }

    pub fn scroll(mut self, scroll: Option<ScrollMode>) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn generated_keys(mut self, keys: GeneratedKeys) -> Self {
        self.generated_keys = keys;
        self
    }
}

/// Rows produced by an executed query
pub trait ResultSet {
    fn next_row(&mut self) -> DriverResult<Option<Row>>;

    fn close(&mut self) -> DriverResult<()>;
}

/// A prepared statement owned by the engine or by its caller
pub trait Statement {
    fn sql(&self) -> &str;

    /// Replace the current parameter binds
    fn bind(&mut self, params: &[Value]) -> DriverResult<()>;

    /// Queue the current binds as one entry of the pending batch
    fn add_batch(&mut self) -> DriverResult<()>;

    /// Send every queued batch entry; returns one row count per entry.
    ///
    /// `-2` means "succeeded, row count unknown" and `-3` means "failed",
    /// following the usual driver conventions.
    fn execute_batch(&mut self) -> DriverResult<Vec<i64>>;

    fn execute_update(&mut self) -> DriverResult<u64>;

    fn execute_query(&mut self) -> DriverResult<Box<dyn ResultSet>>;

    fn set_fetch_size(&mut self, rows: u32) -> DriverResult<()>;

    fn query_timeout(&self) -> DriverResult<u64>;

    fn set_query_timeout(&mut self, seconds: u64) -> DriverResult<()>;

    fn max_rows(&self) -> DriverResult<u64>;

    fn set_max_rows(&mut self, rows: u64) -> DriverResult<()>;

    fn cancel(&mut self) -> DriverResult<()>;

    fn close(&mut self) -> DriverResult<()>;
}

/// A live physical connection
pub trait DatabaseConnection {
    fn prepare(&mut self, sql: &str, options: &PrepareOptions) -> DriverResult<Box<dyn Statement>>;

    fn is_closed(&self) -> bool;

    /// Closes the physical connection; statements prepared on it stop working
    fn close(&mut self) -> DriverResult<()>;
}

/// Source of physical connections
pub trait ConnectionProvider {
    fn open_connection(&self) -> DriverResult<Box<dyn DatabaseConnection>>;

    fn close_connection(&self, connection: Box<dyn DatabaseConnection>) -> DriverResult<()>;
}

/// Session-side owner of the (lazily acquired) connection
pub trait ConnectionManager {
    /// The connection to prepare statements on, opened on first use
    fn connection(&mut self) -> Result<&mut dyn DatabaseConnection>;

    /// Hook run after a statement has been closed outside of teardown
    fn after_statement(&mut self, open_resources: bool);

    /// Give the connection back to the provider
    fn release(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_options_builders() {
        let options = PrepareOptions::callable()
            .scroll(Some(ScrollMode::ScrollInsensitive))
            .generated_keys(GeneratedKeys::Columns(vec!["id".into()]));

        assert!(options.callable);
        assert_eq!(options.scroll, Some(ScrollMode::ScrollInsensitive));
        assert_eq!(
            options.generated_keys,
            GeneratedKeys::Columns(vec!["id".to_string()])
        );
        assert_eq!(PrepareOptions::default().generated_keys, GeneratedKeys::None);
    }
}
