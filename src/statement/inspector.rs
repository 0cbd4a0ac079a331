use crate::core::{EngineError, Result};
use log::{debug, info};

/// Hook allowed to rewrite SQL right before it is prepared
pub trait StatementInspector {
    fn on_prepare_statement(&self, sql: &str) -> String;
}

/// Leaves SQL untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityInspector;

impl StatementInspector for IdentityInspector {
    fn on_prepare_statement(&self, sql: &str) -> String {
        sql.to_string()
    }
}

impl<F> StatementInspector for F
where
    F: Fn(&str) -> String,
{
    fn on_prepare_statement(&self, sql: &str) -> String {
        self(sql)
    }
}

pub(crate) fn inspect(inspector: &dyn StatementInspector, sql: &str) -> Result<String> {
    let sql = inspector.on_prepare_statement(sql);
    if sql.trim().is_empty() {
        return Err(EngineError::Configuration(
            "StatementInspector::on_prepare_statement() returned an empty string".to_string(),
        ));
    }
    Ok(sql)
}

pub(crate) fn log_statement(sql: &str, show_sql: bool) {
    if show_sql {
        info!(target: "writebehind::sql", "{}", sql);
    } else {
        debug!(target: "writebehind::sql", "{}", sql);
    }
}
