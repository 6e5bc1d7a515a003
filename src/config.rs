use crate::error::SqlXmlError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one interpreter. Loadable from JSON, e.g.
/// `{"systemId": "report.xml", "defaultDatasource": "main"}`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InterpreterConfig {
    /// Identifier reported in error locations.
    pub system_id: String,
    /// Undeclared `$variables` in path expressions are errors.
    pub strict: bool,
    /// Session opened when a statement runs before any `datasource` directive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_datasource: Option<String>,
    /// Log every executed statement and its bound values at `info` level.
    pub log_statements: bool,
    /// Cursor limit for `result-set` elements without a `result-sets`
    /// attribute. `None` means one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_result_sets: Option<usize>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            system_id: "template".to_string(),
            strict: false,
            default_datasource: None,
            log_statements: false,
            max_result_sets: None,
        }
    }
}

impl InterpreterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, SqlXmlError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SqlXmlError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlXmlError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = system_id.into();
        self
    }

    pub fn with_default_datasource(mut self, name: impl Into<String>) -> Self {
        self.default_datasource = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = InterpreterConfig::from_json_str(r#"{"strict": true}"#).unwrap();
        assert!(config.strict);
        assert_eq!(config.system_id, "template");
        assert_eq!(config.max_result_sets, None);
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"systemId": "orders.xml", "defaultDatasource": "main", "maxResultSets": 3}}"#
        )
        .unwrap();
        let config = InterpreterConfig::from_path(file.path()).unwrap();
        assert_eq!(config.system_id, "orders.xml");
        assert_eq!(config.default_datasource.as_deref(), Some("main"));
        assert_eq!(config.max_result_sets, Some(3));
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let err = InterpreterConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, SqlXmlError::Config(_)));
    }
}
