use crate::config::RolloverConfig;
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Where log files go and how they are named
///
/// All three path fields are templates; see [`crate::types::PathTemplate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    /// Base directory of the log files
    pub directory: String,

    /// Bucketing directory under `directory` (empty = none)
    ///
    /// Default: `{app_type}/{time:%Y%m%d}` (one directory per day)
    #[serde(default = "default_subdirectory")]
    pub subdirectory: String,

    /// File name of each log file
    ///
    /// Default: `{app_type}_audit_{hostname}.log`
    #[serde(default = "default_file_name_template")]
    pub file_name_template: String,

    /// Value substituted for `{app_type}` (default: "audit")
    #[serde(default = "default_app_type")]
    pub app_type: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            directory: "./data/audit".to_string(),
            subdirectory: default_subdirectory(),
            file_name_template: default_file_name_template(),
            app_type: default_app_type(),
        }
    }
}

fn default_subdirectory() -> String {
    "{app_type}/{time:%Y%m%d}".to_string()
}

fn default_file_name_template() -> String {
    "{app_type}_audit_{hostname}.log".to_string()
}

fn default_app_type() -> String {
    "audit".to_string()
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Backend URI: `file:///` for local disk, `memory://` for the in-memory backend
    #[serde(default = "default_backend_uri")]
    pub backend_uri: String,

    /// Backend-specific options (credentials etc.), passed through verbatim
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend_uri: default_backend_uri(),
            options: BTreeMap::new(),
        }
    }
}

impl StorageConfig {
    /// URI scheme of `backend_uri` (the part before `://`)
    pub fn scheme(&self) -> Option<&str> {
        self.backend_uri.split_once("://").map(|(scheme, _)| scheme)
    }
}

fn default_backend_uri() -> String {
    "file:///".to_string()
}

/// Complete writer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterConfig {
    pub destination: DestinationConfig,

    #[serde(default)]
    pub rollover: RolloverConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl WriterConfig {
    /// Create a configuration writing under `directory` with default settings
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            destination: DestinationConfig {
                directory: directory.into(),
                ..DestinationConfig::default()
            },
            ..Self::default()
        }
    }

    /// Set the rollover configuration
    pub fn with_rollover(mut self, rollover: RolloverConfig) -> Self {
        self.rollover = rollover;
        self
    }

    /// Set the file name template
    pub fn with_file_name_template(mut self, template: impl Into<String>) -> Self {
        self.destination.file_name_template = template.into();
        self
    }

    /// Set the bucketing subdirectory template
    pub fn with_subdirectory(mut self, template: impl Into<String>) -> Self {
        self.destination.subdirectory = template.into();
        self
    }

    /// Set the storage backend URI
    pub fn with_backend_uri(mut self, uri: impl Into<String>) -> Self {
        self.storage.backend_uri = uri.into();
        self
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuditError::Config(format!("Failed to parse writer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a flat property map
    ///
    /// Keys are matched after stripping `prefix` (and a following `.`), e.g.
    /// with prefix `"xasecure.audit.hdfs"` the key
    /// `"xasecure.audit.hdfs.rollover.enabled"` sets `rollover.enabled`.
    /// Unrecognized keys are ignored.
    pub fn from_properties(prefix: &str, props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let mut directory = None;

        for (raw_key, value) in props {
            let Some(key) = raw_key.strip_prefix(prefix) else {
                continue;
            };
            let key = key.strip_prefix('.').unwrap_or(key);
            let value = value.trim();

            match key {
                "destination.directory" => directory = Some(value.to_string()),
                "destination.subdirectory" => config.destination.subdirectory = value.to_string(),
                "destination.fileNameTemplate" => {
                    config.destination.file_name_template = value.to_string()
                }
                "destination.appType" => config.destination.app_type = value.to_string(),
                "rollover.enabled" => config.rollover.enabled = parse_bool(raw_key, value)?,
                "rollover.intervalSeconds" => {
                    config.rollover.interval_seconds = parse_int(raw_key, value)?
                }
                "rollover.checkPeriodSeconds" => {
                    config.rollover.check_period_seconds = parse_int(raw_key, value)?
                }
                "storage.backendUri" => config.storage.backend_uri = value.to_string(),
                _ => {
                    if let Some(option) = key.strip_prefix("storage.") {
                        config
                            .storage
                            .options
                            .insert(option.to_string(), value.to_string());
                    }
                }
            }
        }

        config.destination.directory = directory.ok_or_else(|| {
            AuditError::Config(format!(
                "missing required property {}",
                join_key(prefix, "destination.directory")
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.destination.directory.trim().is_empty() {
            return Err(AuditError::Config(
                "destination.directory must not be empty".into(),
            ));
        }
        if self.destination.file_name_template.trim().is_empty() {
            return Err(AuditError::Config(
                "destination.fileNameTemplate must not be empty".into(),
            ));
        }
        if self.storage.scheme().is_none() {
            return Err(AuditError::Config(format!(
                "storage.backendUri '{}' has no scheme",
                self.storage.backend_uri
            )));
        }
        self.rollover.validate()
    }
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix.trim_end_matches('.'), key)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(AuditError::Config(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|e| AuditError::Config(format!("{} must be an integer: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties_with_prefix() {
        let config = WriterConfig::from_properties(
            "test",
            &props(&[
                ("test.destination.directory", "/tmp/audit"),
                ("test.destination.fileNameTemplate", "{app_type}_{pid}.log"),
                ("test.rollover.enabled", "TRUE"),
                ("test.rollover.intervalSeconds", "5"),
                ("test.rollover.checkPeriodSeconds", "2"),
                ("test.storage.backendUri", "memory://"),
                ("test.storage.user", "audit"),
                ("other.rollover.enabled", "false"),
                ("test.unknown.key", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(config.destination.directory, "/tmp/audit");
        assert_eq!(config.destination.file_name_template, "{app_type}_{pid}.log");
        assert!(config.rollover.enabled);
        assert_eq!(config.rollover.interval_seconds, 5);
        assert_eq!(config.rollover.check_period_seconds, 2);
        assert_eq!(config.storage.scheme(), Some("memory"));
        assert_eq!(config.storage.options.get("user").map(String::as_str), Some("audit"));
    }

    #[test]
    fn test_from_properties_requires_directory() {
        let err = WriterConfig::from_properties("", &props(&[("rollover.enabled", "true")]))
            .unwrap_err();
        assert!(err.to_string().contains("destination.directory"));
    }

    #[test]
    fn test_from_properties_rejects_bad_values() {
        let result = WriterConfig::from_properties(
            "",
            &props(&[
                ("destination.directory", "/tmp/audit"),
                ("rollover.enabled", "yes"),
            ]),
        );
        assert!(matches!(result, Err(AuditError::Config(_))));

        let result = WriterConfig::from_properties(
            "",
            &props(&[
                ("destination.directory", "/tmp/audit"),
                ("rollover.intervalSeconds", "five"),
            ]),
        );
        assert!(matches!(result, Err(AuditError::Config(_))));
    }

    #[test]
    fn test_from_json_defaults() {
        let config = WriterConfig::from_json(r#"{"destination": {"directory": "/var/log/audit"}}"#)
            .unwrap();
        assert_eq!(config.destination.subdirectory, "{app_type}/{time:%Y%m%d}");
        assert_eq!(config.destination.app_type, "audit");
        assert!(!config.rollover.enabled);
        assert_eq!(config.rollover.interval_seconds, 86400);
        assert_eq!(config.storage.backend_uri, "file:///");
    }

    #[test]
    fn test_validate_rejects_empty_directory() {
        let config = WriterConfig::new("  ");
        assert!(config.validate().is_err());
    }
}
