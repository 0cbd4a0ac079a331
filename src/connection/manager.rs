use super::{ConnectionManager, ConnectionProvider, DatabaseConnection};
use crate::core::{EngineError, Result};
use log::{debug, warn};

/// When the managed connection goes back to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseMode {
    /// Keep the connection until [`ConnectionManager::release`] is called
    #[default]
    AfterTransaction,
    /// Give the connection back as soon as no statement or result set is open
    AfterStatement,
}

/// Connection manager that opens its connection on first use
pub struct LazyConnectionManager<P: ConnectionProvider> {
    provider: P,
    release_mode: ReleaseMode,
    current: Option<Box<dyn DatabaseConnection>>,
    opened: u64,
}

impl<P: ConnectionProvider> LazyConnectionManager<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            release_mode: ReleaseMode::default(),
            current: None,
            opened: 0,
        }
    }

    pub fn with_release_mode(mut self, mode: ReleaseMode) -> Self {
        self.release_mode = mode;
        self
    }

    pub fn release_mode(&self) -> ReleaseMode {
        self.release_mode
    }

    /// Number of physical connections opened over this manager's lifetime
    pub fn connections_opened(&self) -> u64 {
        self.opened
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: ConnectionProvider> ConnectionManager for LazyConnectionManager<P> {
    fn connection(&mut self) -> Result<&mut dyn DatabaseConnection> {
        if self.current.as_ref().is_some_and(|conn| conn.is_closed()) {
            debug!("discarding closed connection");
            self.current = None;
        }

        if self.current.is_none() {
            debug!("opening JDBC connection");
            let connection = self
                .provider
                .open_connection()
                .map_err(|source| EngineError::Driver {
                    context: "Cannot open connection".to_string(),
                    source,
                })?;
            self.current = Some(connection);
            self.opened += 1;
        }

        match self.current.as_deref_mut() {
            Some(connection) => Ok(connection),
            None => Err(EngineError::InvalidState(
                "connection unavailable after open".to_string(),
            )),
        }
    }

    fn after_statement(&mut self, open_resources: bool) {
        if self.release_mode != ReleaseMode::AfterStatement {
            return;
        }

        if open_resources {
            debug!("skipping aggressive release due to open resources on batcher");
            return;
        }

        if let Err(err) = self.release() {
            warn!("could not release connection after statement: {}", err);
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(connection) = self.current.take() else {
            debug!("found null connection on release");
            return Ok(());
        };

        debug!("closing JDBC connection");
        self.provider
            .close_connection(connection)
            .map_err(|source| EngineError::Driver {
                context: "Cannot close connection".to_string(),
                source,
            })
    }

    fn is_connected(&self) -> bool {
        self.current.is_some()
    }
}

impl<P: ConnectionProvider> Drop for LazyConnectionManager<P> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Fault, PrepareOptions, RecordingDatabase};

    #[test]
    fn test_connection_opened_lazily_once() {
        let db = RecordingDatabase::new();
        let mut manager = LazyConnectionManager::new(db.clone());
        assert!(!manager.is_connected());
        assert_eq!(db.open_connections(), 0);

        manager.connection().unwrap();
        manager.connection().unwrap();

        assert!(manager.is_connected());
        assert_eq!(manager.connections_opened(), 1);
        assert_eq!(db.open_connections(), 1);
    }

    #[test]
    fn test_after_statement_release_mode() {
        let db = RecordingDatabase::new();
        let mut manager =
            LazyConnectionManager::new(db.clone()).with_release_mode(ReleaseMode::AfterStatement);

        manager.connection().unwrap();
        manager.after_statement(true);
        assert!(manager.is_connected());

        manager.after_statement(false);
        assert!(!manager.is_connected());
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn test_after_transaction_mode_keeps_connection() {
        let db = RecordingDatabase::new();
        let mut manager = LazyConnectionManager::new(db.clone());

        let conn = manager.connection().unwrap();
        conn.prepare("select 1", &PrepareOptions::default()).unwrap();
        manager.after_statement(false);
        assert!(manager.is_connected());

        manager.release().unwrap();
        assert!(!manager.is_connected());
    }

    #[test]
    fn test_open_failure_is_driver_error() {
        let db = RecordingDatabase::new();
        db.inject(Fault::OpenConnection);
        let mut manager = LazyConnectionManager::new(db);

        let err = manager.connection().err().unwrap();
        assert!(matches!(err, EngineError::Driver { .. }));
        assert!(err.to_string().contains("Cannot open connection"));
    }
}
