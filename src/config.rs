use crate::core::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Settings read by the action queue and the statement manager at their
/// decision points.
///
/// Built the same way as a connection configuration: start from
/// [`EngineSettings::default`] and chain builder calls, or load from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Reorder pending inserts into dependency-safe batches before flushing
    pub order_inserts: bool,

    /// Sort updates and collection actions by their ordering key
    pub order_updates: bool,

    /// Maintain the update-timestamps cache region around every flush
    pub query_cache_enabled: bool,

    /// Fetch size hint applied to query statements
    pub fetch_size: Option<u32>,

    /// Allow scrollable result sets
    pub scrollable_result_sets_enabled: bool,

    /// Allow generated-key retrieval on prepared statements
    pub generated_keys_enabled: bool,

    /// Number of binds after which a batch is sent early (0 = only on flush)
    pub jdbc_batch_size: usize,

    /// Log SQL at info level instead of debug
    pub show_sql: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            order_inserts: false,
            order_updates: false,
            query_cache_enabled: false,
            fetch_size: None,
            scrollable_result_sets_enabled: true,
            generated_keys_enabled: true,
            jdbc_batch_size: 0,
            show_sql: false,
        }
    }
}

impl EngineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_inserts(mut self, enabled: bool) -> Self {
        self.order_inserts = enabled;
        self
    }

    pub fn order_updates(mut self, enabled: bool) -> Self {
        self.order_updates = enabled;
        self
    }

    pub fn query_cache(mut self, enabled: bool) -> Self {
        self.query_cache_enabled = enabled;
        self
    }

    pub fn fetch_size(mut self, rows: u32) -> Self {
        self.fetch_size = Some(rows);
        self
    }

    pub fn scrollable_result_sets(mut self, enabled: bool) -> Self {
        self.scrollable_result_sets_enabled = enabled;
        self
    }

    pub fn generated_keys(mut self, enabled: bool) -> Self {
        self.generated_keys_enabled = enabled;
        self
    }

    pub fn jdbc_batch_size(mut self, size: usize) -> Self {
        self.jdbc_batch_size = size;
        self
    }

    pub fn show_sql(mut self, enabled: bool) -> Self {
        self.show_sql = enabled;
        self
    }

    /// Parse settings from a JSON document. Missing keys keep their defaults.
    ///
    /// ```
    /// use writebehind::EngineSettings;
    ///
    /// let json = r#"{ "order_inserts": true, "fetch_size": 50 }"#;
    /// let settings = EngineSettings::from_json(json).unwrap();
    /// assert!(settings.order_inserts);
    /// assert_eq!(settings.fetch_size, Some(50));
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::Configuration(format!("invalid settings document: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_size == Some(0) {
            return Err(EngineError::Configuration(
                "fetch_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert!(!settings.order_inserts);
        assert!(!settings.order_updates);
        assert!(!settings.query_cache_enabled);
        assert!(settings.scrollable_result_sets_enabled);
        assert_eq!(settings.jdbc_batch_size, 0);
    }

    #[test]
    fn test_builder_pattern() {
        let settings = EngineSettings::new()
            .order_inserts(true)
            .order_updates(true)
            .fetch_size(100)
            .jdbc_batch_size(20);

        assert!(settings.order_inserts);
        assert!(settings.order_updates);
        assert_eq!(settings.fetch_size, Some(100));
        assert_eq!(settings.jdbc_batch_size, 20);
    }

    #[test]
    fn test_from_json_keeps_defaults() {
        let settings = EngineSettings::from_json(r#"{ "query_cache_enabled": true }"#).unwrap();
        assert!(settings.query_cache_enabled);
        assert!(settings.generated_keys_enabled);
        assert_eq!(settings.fetch_size, None);
    }

    #[test]
    fn test_validate_rejects_zero_fetch_size() {
        let settings = EngineSettings::new().fetch_size(0);
        assert!(settings.validate().unwrap_err().is_configuration());
        assert!(EngineSettings::from_json(r#"{ "fetch_size": 0 }"#).is_err());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = EngineSettings::from_json("not json").unwrap_err();
        assert!(err.is_configuration());
    }
}
