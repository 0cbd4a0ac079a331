use thiserror::Error;

/// Failure reported by the underlying database handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub sql_state: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
        }
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }
}

/// Failure reported by a timestamp cache region.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cache error: {0}")]
pub struct CacheError(pub String);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("transaction timeout expired")]
    TransactionTimeout,

    #[error("{context} [{sql}]: {source}")]
    Execution {
        context: String,
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: DriverError,
    },

    #[error("Could not close a {resource}: {source}")]
    ResourceClose {
        resource: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("Cannot cancel query: {0}")]
    CannotCancel(#[source] DriverError),

    #[error("Exception releasing cache locks: {0}")]
    UnexpectedCallback(#[source] anyhow::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(
        "Batch update returned unexpected row count from update [{batch_position}]; \
         actual row count: {actual}; expected: {expected} [{sql}]"
    )]
    StaleState {
        expected: i64,
        actual: i64,
        batch_position: usize,
        sql: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl EngineError {
    pub(crate) fn execution(context: impl Into<String>, sql: &str, source: DriverError) -> Self {
        Self::Execution {
            context: context.into(),
            sql: sql.to_string(),
            source,
        }
    }

    /// The SQL text attached to this error, if the failure was tied to one statement.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } | Self::StaleState { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_carries_sql() {
        let err = EngineError::execution(
            "Could not execute JDBC batch update",
            "insert into employee (id) values (?)",
            DriverError::new("unique constraint violated").with_sql_state("23505"),
        );

        assert_eq!(err.sql(), Some("insert into employee (id) values (?)"));
        let message = err.to_string();
        assert!(message.contains("Could not execute JDBC batch update"));
        assert!(message.contains("unique constraint violated"));
    }

    #[test]
    fn test_cache_error_converts() {
        let err: EngineError = CacheError("region locked".into()).into();
        assert!(matches!(err, EngineError::Cache(_)));
        assert!(err.sql().is_none());
    }
}
