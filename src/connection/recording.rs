// ============================================================================
// Recording Database
// ============================================================================
//
// In-memory implementation of the database handle traits. Every call is
// appended to a shared journal so callers can assert on exactly which
// statements were prepared, batched, executed and closed. Faults can be
// injected to make one specific call fail.
//
// ============================================================================

use super::{ConnectionProvider, DatabaseConnection, PrepareOptions, ResultSet, Statement};
use crate::core::{DriverError, DriverResult, Row, Value};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One observed call against the recording database
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    OpenConnection,
    CloseConnection,
    Prepare {
        handle: u64,
        sql: String,
        options: PrepareOptions,
    },
    Bind {
        handle: u64,
        params: Vec<Value>,
    },
    AddBatch {
        handle: u64,
    },
    ExecuteBatch {
        handle: u64,
        sql: String,
        size: usize,
    },
    ExecuteUpdate {
        handle: u64,
        sql: String,
    },
    ExecuteQuery {
        handle: u64,
        sql: String,
        result_set: u64,
    },
    SetFetchSize {
        handle: u64,
        rows: u32,
    },
    SetQueryTimeout {
        handle: u64,
        seconds: u64,
    },
    SetMaxRows {
        handle: u64,
        rows: u64,
    },
    Cancel {
        handle: u64,
    },
    CloseStatement {
        handle: u64,
        sql: String,
    },
    CloseStatementFailed {
        handle: u64,
    },
    CloseResultSet {
        result_set: u64,
    },
    CloseResultSetFailed {
        result_set: u64,
    },
}

/// A one-shot failure armed on the recording database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    OpenConnection,
    Prepare { sql: String },
    ExecuteBatch { sql: String },
    ExecuteUpdate { sql: String },
    ExecuteQuery { sql: String },
    /// Fail the n-th statement close (1-based, counted across all statements)
    CloseStatement { nth: usize },
    /// Fail the n-th result set close (1-based)
    CloseResultSet { nth: usize },
    Cancel,
    /// Fail resetting a non-zero query timeout back to zero
    ClearQueryTimeout,
}

#[derive(Default)]
struct RecordingState {
    journal: Vec<JournalEvent>,
    faults: Vec<Fault>,
    rows: HashMap<String, Vec<Row>>,
    row_counts: HashMap<String, i64>,
    next_handle: u64,
    statement_closes: usize,
    result_set_closes: usize,
    open_connections: usize,
}

impl RecordingState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn take_fault(&mut self, matches: impl Fn(&Fault) -> bool) -> bool {
        match self.faults.iter().position(matches) {
            Some(pos) => {
                self.faults.remove(pos);
                true
            }
            None => false,
        }
    }

    fn row_count(&self, sql: &str) -> i64 {
        self.row_counts.get(sql).copied().unwrap_or(1)
    }
}

type SharedState = Arc<Mutex<RecordingState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, RecordingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to one in-memory recording database
#[derive(Clone, Default)]
pub struct RecordingDatabase {
    state: SharedState,
}

impl RecordingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by every query whose SQL text equals `sql`
    pub fn with_rows(self, sql: &str, rows: Vec<Row>) -> Self {
        lock(&self.state).rows.insert(sql.to_string(), rows);
        self
    }

    /// Row count reported for each execution of `sql` (default 1)
    pub fn with_row_count(self, sql: &str, count: i64) -> Self {
        lock(&self.state).row_counts.insert(sql.to_string(), count);
        self
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.state).faults.push(fault);
    }

    pub fn journal(&self) -> Vec<JournalEvent> {
        lock(&self.state).journal.clone()
    }

    pub fn clear_journal(&self) {
        lock(&self.state).journal.clear();
    }

    pub fn open_connections(&self) -> usize {
        lock(&self.state).open_connections
    }

    /// SQL text of every prepare call, in order
    pub fn prepared_sql(&self) -> Vec<String> {
        lock(&self.state)
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Prepare { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(sql, entries)` for every batch execution, in order
    pub fn executed_batches(&self) -> Vec<(String, usize)> {
        lock(&self.state)
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::ExecuteBatch { sql, size, .. } => Some((sql.clone(), *size)),
                _ => None,
            })
            .collect()
    }

    /// Handles of statements that were prepared but never successfully closed
    pub fn unclosed_statements(&self) -> Vec<u64> {
        let state = lock(&self.state);
        let closed: HashSet<u64> = state
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::CloseStatement { handle, .. } => Some(*handle),
                _ => None,
            })
            .collect();

        state
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Prepare { handle, .. } if !closed.contains(handle) => Some(*handle),
                _ => None,
            })
            .collect()
    }

    /// Result sets that were opened but never successfully closed
    pub fn unclosed_result_sets(&self) -> Vec<u64> {
        let state = lock(&self.state);
        let closed: HashSet<u64> = state
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::CloseResultSet { result_set } => Some(*result_set),
                _ => None,
            })
            .collect();

        state
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::ExecuteQuery { result_set, .. } if !closed.contains(result_set) => {
                    Some(*result_set)
                }
                _ => None,
            })
            .collect()
    }
}

impl ConnectionProvider for RecordingDatabase {
    fn open_connection(&self) -> DriverResult<Box<dyn DatabaseConnection>> {
        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, Fault::OpenConnection)) {
            return Err(DriverError::new("connection refused").with_sql_state("08001"));
        }
        state.open_connections += 1;
        state.journal.push(JournalEvent::OpenConnection);

        Ok(Box::new(RecordingConnection {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }

    fn close_connection(&self, mut connection: Box<dyn DatabaseConnection>) -> DriverResult<()> {
        connection.close()
    }
}

struct RecordingConnection {
    state: SharedState,
    /// Shared with every statement prepared on this connection
    closed: Arc<AtomicBool>,
}

impl DatabaseConnection for RecordingConnection {
    fn prepare(&mut self, sql: &str, options: &PrepareOptions) -> DriverResult<Box<dyn Statement>> {
        if self.is_closed() {
            return Err(connection_closed());
        }

        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, Fault::Prepare { sql: s } if s == sql)) {
            let message = format!("syntax error near '{}'", sql);
            return Err(DriverError::new(message).with_sql_state("42000"));
        }

        let handle = state.next_handle();
        state.journal.push(JournalEvent::Prepare {
            handle,
            sql: sql.to_string(),
            options: options.clone(),
        });

        Ok(Box::new(RecordingStatement {
            handle,
            sql: sql.to_string(),
            state: Arc::clone(&self.state),
            connection_closed: Arc::clone(&self.closed),
            params: Vec::new(),
            batch: Vec::new(),
            query_timeout: 0,
            max_rows: 0,
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut state = lock(&self.state);
        state.open_connections = state.open_connections.saturating_sub(1);
        state.journal.push(JournalEvent::CloseConnection);
        Ok(())
    }
}

fn connection_closed() -> DriverError {
    DriverError::new("connection is closed").with_sql_state("08003")
}

struct RecordingStatement {
    handle: u64,
    sql: String,
    state: SharedState,
    connection_closed: Arc<AtomicBool>,
    params: Vec<Value>,
    batch: Vec<Vec<Value>>,
    query_timeout: u64,
    max_rows: u64,
}

impl RecordingStatement {
    fn ensure_connected(&self) -> DriverResult<()> {
        if self.connection_closed.load(Ordering::SeqCst) {
            return Err(connection_closed());
        }
        Ok(())
    }
}

impl Statement for RecordingStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, params: &[Value]) -> DriverResult<()> {
        self.ensure_connected()?;
        self.params = params.to_vec();
        lock(&self.state).journal.push(JournalEvent::Bind {
            handle: self.handle,
            params: self.params.clone(),
        });
        Ok(())
    }

    fn add_batch(&mut self) -> DriverResult<()> {
        self.ensure_connected()?;
        self.batch.push(std::mem::take(&mut self.params));
        lock(&self.state)
            .journal
            .push(JournalEvent::AddBatch { handle: self.handle });
        Ok(())
    }

    fn execute_batch(&mut self) -> DriverResult<Vec<i64>> {
        self.ensure_connected()?;
        let entries = std::mem::take(&mut self.batch);
        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, Fault::ExecuteBatch { sql } if *sql == self.sql)) {
            return Err(DriverError::new("batch entry 0 was aborted").with_sql_state("23505"));
        }

        state.journal.push(JournalEvent::ExecuteBatch {
            handle: self.handle,
            sql: self.sql.clone(),
            size: entries.len(),
        });
        let count = state.row_count(&self.sql);
        Ok(vec![count; entries.len()])
    }

    fn execute_update(&mut self) -> DriverResult<u64> {
        self.ensure_connected()?;
        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, Fault::ExecuteUpdate { sql } if *sql == self.sql)) {
            return Err(DriverError::new("update failed").with_sql_state("23000"));
        }

        state.journal.push(JournalEvent::ExecuteUpdate {
            handle: self.handle,
            sql: self.sql.clone(),
        });
        Ok(state.row_count(&self.sql).max(0) as u64)
    }

    fn execute_query(&mut self) -> DriverResult<Box<dyn ResultSet>> {
        self.ensure_connected()?;
        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, Fault::ExecuteQuery { sql } if *sql == self.sql)) {
            return Err(DriverError::new("query failed").with_sql_state("42P01"));
        }

        let result_set = state.next_handle();
        state.journal.push(JournalEvent::ExecuteQuery {
            handle: self.handle,
            sql: self.sql.clone(),
            result_set,
        });
        let rows = state.rows.get(&self.sql).cloned().unwrap_or_default();

        Ok(Box::new(RecordingResultSet {
            handle: result_set,
            rows: rows.into(),
            state: Arc::clone(&self.state),
        }))
    }

    fn set_fetch_size(&mut self, rows: u32) -> DriverResult<()> {
        lock(&self.state).journal.push(JournalEvent::SetFetchSize {
            handle: self.handle,
            rows,
        });
        Ok(())
    }

    fn query_timeout(&self) -> DriverResult<u64> {
        Ok(self.query_timeout)
    }

    fn set_query_timeout(&mut self, seconds: u64) -> DriverResult<()> {
        let mut state = lock(&self.state);
        if seconds == 0 && state.take_fault(|f| matches!(f, Fault::ClearQueryTimeout)) {
            return Err(DriverError::new("statement is in an invalid state"));
        }
        self.query_timeout = seconds;
        state.journal.push(JournalEvent::SetQueryTimeout {
            handle: self.handle,
            seconds,
        });
        Ok(())
    }

    fn max_rows(&self) -> DriverResult<u64> {
        Ok(self.max_rows)
    }

    fn set_max_rows(&mut self, rows: u64) -> DriverResult<()> {
        self.max_rows = rows;
        lock(&self.state).journal.push(JournalEvent::SetMaxRows {
            handle: self.handle,
            rows,
        });
        Ok(())
    }

    fn cancel(&mut self) -> DriverResult<()> {
        let mut state = lock(&self.state);
        if state.take_fault(|f| matches!(f, Fault::Cancel)) {
            return Err(DriverError::new("cancel not supported in current state"));
        }
        state.journal.push(JournalEvent::Cancel { handle: self.handle });
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.statement_closes += 1;
        let nth = state.statement_closes;
        if state.take_fault(|f| matches!(f, Fault::CloseStatement { nth: n } if *n == nth)) {
            state
                .journal
                .push(JournalEvent::CloseStatementFailed { handle: self.handle });
            return Err(DriverError::new("I/O error while closing statement"));
        }

        state.journal.push(JournalEvent::CloseStatement {
            handle: self.handle,
            sql: self.sql.clone(),
        });
        Ok(())
    }
}

struct RecordingResultSet {
    handle: u64,
    rows: VecDeque<Row>,
    state: SharedState,
}

impl ResultSet for RecordingResultSet {
    fn next_row(&mut self) -> DriverResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut state = lock(&self.state);
        state.result_set_closes += 1;
        let nth = state.result_set_closes;
        if state.take_fault(|f| matches!(f, Fault::CloseResultSet { nth: n } if *n == nth)) {
            state.journal.push(JournalEvent::CloseResultSetFailed {
                result_set: self.handle,
            });
            return Err(DriverError::new("I/O error while closing result set"));
        }

        state.journal.push(JournalEvent::CloseResultSet {
            result_set: self.handle,
        });
        Ok(())
    }
}
