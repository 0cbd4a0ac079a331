use super::batch::{BatchSlot, HeldBatch};
use super::inspector::{IdentityInspector, StatementInspector, inspect, log_statement};
use super::metrics::ResourceMetrics;
use super::registry::{ResultSetId, StatementId, StatementRegistry};
use crate::config::EngineSettings;
use crate::connection::{
    ConnectionManager, GeneratedKeys, PrepareOptions, ResultSet, ScrollMode, Statement,
};
use crate::core::{DriverResult, EngineError, Result};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Whether closing a statement runs the connection manager's
/// after-statement hook. Full teardown skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseMode {
    Normal,
    Teardown,
}

/// Owns every live statement and result set of one session.
///
/// Plain statements (`prepare_statement` and friends) are handed to the
/// caller, who gives them back through [`StatementManager::close_statement`].
/// Query statements and result sets stay in the manager's registry and are
/// addressed by [`StatementId`] / [`ResultSetId`] until closed.
///
/// Not meant to be shared between threads: every operation takes `&mut self`.
pub struct StatementManager {
    connections: Box<dyn ConnectionManager>,
    settings: EngineSettings,
    inspector: Box<dyn StatementInspector>,
    metrics: Arc<ResourceMetrics>,
    pub(crate) registry: StatementRegistry,
    pub(crate) batch: BatchSlot,
    transaction_deadline: Option<Instant>,
    open_statement_count: usize,
    open_result_set_count: usize,
}

impl StatementManager {
    pub fn new(connections: impl ConnectionManager + 'static, settings: EngineSettings) -> Self {
        Self {
            connections: Box::new(connections),
            settings,
            inspector: Box::new(IdentityInspector),
            metrics: Arc::new(ResourceMetrics::new()),
            registry: StatementRegistry::default(),
            batch: BatchSlot::default(),
            transaction_deadline: None,
            open_statement_count: 0,
            open_result_set_count: 0,
        }
    }

    /// Share open-handle gauges with other managers
    pub fn with_metrics(mut self, metrics: Arc<ResourceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_inspector(mut self, inspector: impl StatementInspector + 'static) -> Self {
        self.inspector = Box::new(inspector);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<ResourceMetrics> {
        &self.metrics
    }

    pub fn connection_manager(&mut self) -> &mut dyn ConnectionManager {
        self.connections.as_mut()
    }

    pub(crate) fn inspector(&self) -> &dyn StatementInspector {
        self.inspector.as_ref()
    }

    // ------------------------------------------------------------------
    // Transaction timeout
    // ------------------------------------------------------------------

    /// Every statement prepared from now on gets the time left until
    /// `now + timeout` as its query timeout.
    pub fn set_transaction_timeout(&mut self, timeout: Duration) {
        self.transaction_deadline = Some(Instant::now() + timeout);
    }

    pub fn unset_transaction_timeout(&mut self) {
        self.transaction_deadline = None;
    }

    fn statement_timeout(&self) -> Result<Option<u64>> {
        let Some(deadline) = self.transaction_deadline else {
            return Ok(None);
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EngineError::TransactionTimeout);
        }
        let seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Ok(Some(seconds))
    }

    // ------------------------------------------------------------------
    // Caller-owned statements
    // ------------------------------------------------------------------

    pub fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn Statement>> {
        self.open_statement(sql, PrepareOptions::default(), true)
    }

    /// Prepare with generated-key retrieval, by flag or by column names
    pub fn prepare_statement_with_keys(
        &mut self,
        sql: &str,
        keys: GeneratedKeys,
    ) -> Result<Box<dyn Statement>> {
        self.open_statement(sql, PrepareOptions::default().generated_keys(keys), true)
    }

    pub fn prepare_callable_statement(&mut self, sql: &str) -> Result<Box<dyn Statement>> {
        self.open_statement(sql, PrepareOptions::callable(), true)
    }

    /// Read statement that leaves the held batch alone
    pub fn prepare_select_statement(&mut self, sql: &str) -> Result<Box<dyn Statement>> {
        self.open_statement(sql, PrepareOptions::default(), false)
    }

    pub fn close_statement(&mut self, mut statement: Box<dyn Statement>) -> Result<()> {
        self.close_prepared(statement.as_mut(), CloseMode::Normal)
    }

    // ------------------------------------------------------------------
    // Tracked query statements and result sets
    // ------------------------------------------------------------------

    pub fn prepare_query_statement(
        &mut self,
        sql: &str,
        scroll: Option<ScrollMode>,
    ) -> Result<StatementId> {
        self.open_query(sql, PrepareOptions::default().scroll(scroll))
    }

    pub fn prepare_callable_query_statement(
        &mut self,
        sql: &str,
        scroll: Option<ScrollMode>,
    ) -> Result<StatementId> {
        self.open_query(sql, PrepareOptions::callable().scroll(scroll))
    }

    fn open_query(&mut self, sql: &str, options: PrepareOptions) -> Result<StatementId> {
        let mut statement = self.open_statement(sql, options, true)?;

        if let Some(rows) = self.settings.fetch_size {
            if let Err(source) = statement.set_fetch_size(rows) {
                let sql = statement.sql().to_string();
                if let Err(close_err) = self.close_prepared(statement.as_mut(), CloseMode::Normal) {
                    warn!("{}", close_err);
                }
                return Err(EngineError::execution("could not set fetch size", &sql, source));
            }
        }

        Ok(self.registry.register_query(statement))
    }

    /// Tracked statement for binding parameters before [`StatementManager::get_result_set`]
    pub fn query_statement(&mut self, id: StatementId) -> Option<&mut dyn Statement> {
        self.registry.statement_mut(id)
    }

    pub fn get_result_set(&mut self, id: StatementId) -> Result<ResultSetId> {
        let Some(statement) = self.registry.statement_mut(id) else {
            return Err(EngineError::InvalidState(format!(
                "{} is not an open query statement",
                id
            )));
        };

        let result_set = statement.execute_query().map_err(|source| {
            EngineError::execution("could not execute query", statement.sql(), source)
        })?;

        let result_set_id = self.registry.register_result_set(result_set);
        self.open_result_set_count += 1;
        self.metrics.result_set_opened();
        debug!("about to open ResultSet{}", self.result_set_counts());
        Ok(result_set_id)
    }

    pub fn result_set(&mut self, id: ResultSetId) -> Option<&mut dyn ResultSet> {
        self.registry.result_set_mut(id)
    }

    /// Closes `result_set` (when still registered) and then `statement`
    /// (when still registered).
    ///
    /// The statement close is attempted even if the result set close fails;
    /// the first failure is returned.
    pub fn close_query_statement(
        &mut self,
        statement: StatementId,
        result_set: Option<ResultSetId>,
    ) -> Result<()> {
        let still_there = self.registry.remove_statement(statement);
        let tracked_result_set = result_set.and_then(|id| self.registry.remove_result_set(id));

        let result_set_closed = match tracked_result_set {
            Some(mut rs) => self.close_result_set(rs.as_mut()),
            None => Ok(()),
        };

        let statement_closed = match still_there {
            Some(mut stmt) => self.close_tracked_query(stmt.as_mut(), statement, CloseMode::Normal),
            None => Ok(()),
        };

        match (result_set_closed, statement_closed) {
            (Err(first), Err(second)) => {
                warn!("{}", second);
                Err(first)
            }
            (Err(first), Ok(())) => Err(first),
            (Ok(()), statement_closed) => statement_closed,
        }
    }

    /// Releases everything this manager holds: the batch statement, every
    /// result set, every query statement.
    ///
    /// Best effort: a failing close is logged and the remaining handles are
    /// still closed. The connection manager's after-statement hook is not
    /// run for any of them.
    pub fn close_statements(&mut self) {
        if let Some(HeldBatch { mut statement, sql, .. }) = self.batch.take() {
            debug!("closing held batch statement [{}]", sql);
            if let Err(err) = self.close_prepared(statement.as_mut(), CloseMode::Teardown) {
                warn!("{}", err);
            }
        }

        for (_, mut result_set) in self.registry.drain_result_sets() {
            if let Err(err) = self.close_result_set(result_set.as_mut()) {
                warn!("{}", err);
            }
        }

        for (id, mut statement) in self.registry.drain_statements() {
            let closed = self.close_tracked_query(statement.as_mut(), id, CloseMode::Teardown);
            if let Err(err) = closed {
                warn!("{}", err);
            }
        }

        self.registry.clear_last_query();
    }

    /// Cancels the most recently prepared query statement if it is still open
    pub fn cancel_last_query(&mut self) -> Result<()> {
        let Some(id) = self.registry.last_query() else {
            return Ok(());
        };

        match self.registry.statement_mut(id) {
            Some(statement) => statement.cancel().map_err(EngineError::CannotCancel),
            None => Ok(()),
        }
    }

    pub fn has_open_resources(&self) -> bool {
        self.registry.has_open_resources()
    }

    pub fn is_statement_open(&self, id: StatementId) -> bool {
        self.registry.contains_statement(id)
    }

    pub fn is_result_set_open(&self, id: ResultSetId) -> bool {
        self.registry.contains_result_set(id)
    }

    pub fn tracked_statement_count(&self) -> usize {
        self.registry.statement_count()
    }

    pub fn tracked_result_set_count(&self) -> usize {
        self.registry.result_set_count()
    }

    /// Statements opened through this manager and not yet closed, tracked or not
    pub fn open_statement_count(&self) -> usize {
        self.open_statement_count
    }

    pub fn open_result_set_count(&self) -> usize {
        self.open_result_set_count
    }

    pub fn open_resource_stats(&self) -> String {
        format!("{}{}", self.statement_counts(), self.result_set_counts())
    }

    fn statement_counts(&self) -> String {
        format!(
            " (open PreparedStatements: {}, globally: {})",
            self.open_statement_count,
            self.metrics.open_statements()
        )
    }

    fn result_set_counts(&self) -> String {
        format!(
            " (open ResultSets: {}, globally: {})",
            self.open_result_set_count,
            self.metrics.open_result_sets()
        )
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn open_statement(
        &mut self,
        sql: &str,
        options: PrepareOptions,
        force_batch: bool,
    ) -> Result<Box<dyn Statement>> {
        let sql = inspect(self.inspector(), sql)?;
        self.open_inspected(&sql, options, force_batch)
    }

    fn check_options(&self, options: &PrepareOptions) -> Result<()> {
        if options.scroll.is_some() && !self.settings.scrollable_result_sets_enabled {
            return Err(EngineError::Configuration(
                "scrollable result sets are not enabled".to_string(),
            ));
        }
        if options.generated_keys == GeneratedKeys::Auto && !self.settings.generated_keys_enabled {
            return Err(EngineError::Configuration(
                "getGeneratedKeys() support is not enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Prepares already-inspected SQL on the session connection
    pub(crate) fn open_inspected(
        &mut self,
        sql: &str,
        options: PrepareOptions,
        force_batch: bool,
    ) -> Result<Box<dyn Statement>> {
        self.check_options(&options)?;
        if force_batch {
            self.execute_batch()?;
        }
        let timeout = self.statement_timeout()?;

        log_statement(sql, self.settings.show_sql);
        trace!("preparing statement");
        let connection = self.connections.connection()?;
        let mut statement = connection
            .prepare(sql, &options)
            .map_err(|source| EngineError::execution("could not prepare statement", sql, source))?;

        self.open_statement_count += 1;
        self.metrics.statement_opened();
        debug!("about to open PreparedStatement{}", self.statement_counts());

        if let Some(seconds) = timeout {
            if let Err(source) = statement.set_query_timeout(seconds) {
                if let Err(close_err) = self.close_prepared(statement.as_mut(), CloseMode::Normal) {
                    warn!("{}", close_err);
                }
                return Err(EngineError::execution("could not apply query timeout", sql, source));
            }
        }

        Ok(statement)
    }

    pub(crate) fn close_prepared(
        &mut self,
        statement: &mut dyn Statement,
        mode: CloseMode,
    ) -> Result<()> {
        self.open_statement_count = self.open_statement_count.saturating_sub(1);
        self.metrics.statement_closed();
        debug!("about to close PreparedStatement{}", self.statement_counts());

        trace!("closing statement");
        let closed = statement.close().map_err(|source| EngineError::ResourceClose {
            resource: "JDBC statement",
            source,
        });

        if mode == CloseMode::Normal {
            let open_resources = self.registry.has_open_resources() || self.batch.is_held();
            self.connections.after_statement(open_resources);
        }
        closed
    }

    fn close_tracked_query(
        &mut self,
        statement: &mut dyn Statement,
        id: StatementId,
        mode: CloseMode,
    ) -> Result<()> {
        if let Err(err) = reset_query_limits(statement) {
            warn!("exception clearing maxRows/queryTimeout: {}", err);
        }
        let closed = self.close_prepared(statement, mode);
        self.registry.forget_last_query(id);
        closed
    }

    fn close_result_set(&mut self, result_set: &mut dyn ResultSet) -> Result<()> {
        self.open_result_set_count = self.open_result_set_count.saturating_sub(1);
        self.metrics.result_set_closed();
        debug!("about to close ResultSet{}", self.result_set_counts());

        result_set.close().map_err(|source| EngineError::ResourceClose {
            resource: "JDBC result set",
            source,
        })
    }
}

fn reset_query_limits(statement: &mut dyn Statement) -> DriverResult<()> {
    if statement.max_rows()? != 0 {
        statement.set_max_rows(0)?;
    }
    if statement.query_timeout()? != 0 {
        statement.set_query_timeout(0)?;
    }
    Ok(())
}

impl Drop for StatementManager {
    fn drop(&mut self) {
        if self.batch.is_held() || self.has_open_resources() {
            debug!("releasing open statements on drop{}", self.open_resource_stats());
            self.close_statements();
        }
    }
}
