//! Connection and registry configuration

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Document database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdmConfig {
    /// Connection string of the database server
    pub uri: String,
    /// Database used by models that do not name one
    pub database_name: Option<String>,
    /// Application name reported to the server
    pub app_name: Option<String>,
    /// Create declared indexes when the registry starts
    pub ensure_indexes_on_startup: bool,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OdmConfig {
    pub const DEFAULT_URI: &'static str = "mongodb://localhost:27017";

    pub fn new() -> Self {
        Self {
            uri: Self::DEFAULT_URI.to_string(),
            database_name: None,
            app_name: None,
            ensure_indexes_on_startup: false,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn ensure_indexes_on_startup(mut self, enabled: bool) -> Self {
        self.ensure_indexes_on_startup = enabled;
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(uri) = lookup("MONGODB_URI") {
            config.uri = uri;
        }

        config.database_name = lookup("MONGODB_DATABASE").filter(|name| !name.is_empty());
        config.app_name = lookup("ODM_APP_NAME").filter(|name| !name.is_empty());

        if let Some(flag) = lookup("ODM_ENSURE_INDEXES") {
            config.ensure_indexes_on_startup = parse_bool("ensure_indexes_on_startup", &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML document
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uri.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "uri".to_string(),
                hint: "MONGODB_URI must not be empty".to_string(),
            });
        }

        if !self.uri.starts_with("mongodb://") && !self.uri.starts_with("mongodb+srv://") {
            return Err(ConfigError::InvalidValue {
                field: "uri".to_string(),
                value: self.uri.clone(),
                expected: "mongodb:// or mongodb+srv:// connection string".to_string(),
            });
        }

        if let Some(name) = &self.database_name {
            if name.contains(&['/', '\\', '.', ' ', '"', '$'][..]) {
                return Err(ConfigError::InvalidValue {
                    field: "database_name".to_string(),
                    value: name.clone(),
                    expected: "database name without / \\ . space \" or $".to_string(),
                });
            }
        }

        if self.ensure_indexes_on_startup && self.database_name.is_none() {
            return Err(ConfigError::ValidationFailed {
                message: "ensure_indexes_on_startup requires a database name".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OdmConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.database_name, None);
        assert!(!config.ensure_indexes_on_startup);
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let config = OdmConfig::from_lookup(lookup(&[
            ("MONGODB_URI", "mongodb://db:27017"),
            ("MONGODB_DATABASE", "blog"),
            ("ODM_APP_NAME", "writer"),
            ("ODM_ENSURE_INDEXES", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.uri, "mongodb://db:27017");
        assert_eq!(config.database_name.as_deref(), Some("blog"));
        assert_eq!(config.app_name.as_deref(), Some("writer"));
        assert!(config.ensure_indexes_on_startup);
    }

    #[test]
    fn test_invalid_flag() {
        let err = OdmConfig::from_lookup(lookup(&[("ODM_ENSURE_INDEXES", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "ensure_indexes_on_startup"));
    }

    #[test]
    fn test_validation() {
        assert!(OdmConfig::new().with_uri("postgres://x").validate().is_err());
        assert!(OdmConfig::new().with_database_name("a.b").validate().is_err());
        assert!(matches!(
            OdmConfig::new().ensure_indexes_on_startup(true).validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
        assert!(OdmConfig::new()
            .with_database_name("blog")
            .ensure_indexes_on_startup(true)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = OdmConfig::from_yaml("uri: mongodb+srv://cluster\ndatabase_name: shop\n").unwrap();
        assert_eq!(config.uri, "mongodb+srv://cluster");
        assert_eq!(config.database_name.as_deref(), Some("shop"));
        assert!(config.app_name.is_none());
    }
}
