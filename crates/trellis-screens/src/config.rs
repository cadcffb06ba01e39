//! Screen framework configuration (`trellis.toml`) parsing and validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::services::NotificationType;

/// Errors that can occur when loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

/// The complete screen framework configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ScreensConfig {
    /// Editor behavior.
    #[serde(default)]
    pub editor: EditorConfig,

    /// Validation feedback.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Pessimistic lock feedback.
    #[serde(default)]
    pub locks: LocksConfig,

    /// Message template overrides, keyed by message id.
    #[serde(default)]
    pub messages: BTreeMap<String, String>,
}

/// `[editor]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct EditorConfig {
    /// Ask Save/Discard/Cancel instead of Discard/Cancel when closing with
    /// unsaved changes.
    #[serde(default)]
    pub use_save_confirmation: bool,

    /// Run whole-entity validation rules before committing.
    #[serde(default = "default_true")]
    pub cross_field_validation: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            use_save_confirmation: false,
            cross_field_validation: true,
        }
    }
}

/// `[validation]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ValidationConfig {
    /// Notification type used to report validation failures.
    #[serde(default)]
    pub notification_type: NotificationType,
}

/// `[locks]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct LocksConfig {
    /// `strftime` pattern for lock acquisition times.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            timestamp_format: default_timestamp_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timestamp_format() -> String {
    String::from("%Y-%m-%d %H:%M")
}

impl ScreensConfig {
    /// Load a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.locks.timestamp_format.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "locks.timestamp-format",
                reason: "format cannot be empty",
            });
        }
        if self.messages.keys().any(|key| key.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                key: "messages",
                reason: "message ids cannot be empty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ScreensConfig::parse("").unwrap();
        assert_eq!(config, ScreensConfig::default());
        assert!(!config.editor.use_save_confirmation);
        assert!(config.editor.cross_field_validation);
        assert_eq!(config.validation.notification_type, NotificationType::Tray);
        assert_eq!(config.locks.timestamp_format, "%Y-%m-%d %H:%M");
    }

    #[test]
    fn parse_full_config() {
        let config = ScreensConfig::parse(
            r#"
            [editor]
            use-save-confirmation = true
            cross-field-validation = false

            [validation]
            notification-type = "warning"

            [locks]
            timestamp-format = "%H:%M"

            [messages]
            "entity-locked.caption" = "Busy"
            "#,
        )
        .unwrap();

        assert!(config.editor.use_save_confirmation);
        assert!(!config.editor.cross_field_validation);
        assert_eq!(config.validation.notification_type, NotificationType::Warning);
        assert_eq!(config.locks.timestamp_format, "%H:%M");
        assert_eq!(config.messages["entity-locked.caption"], "Busy");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ScreensConfig::parse("[editor]\nautosave = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn empty_timestamp_format_is_invalid() {
        let err = ScreensConfig::parse("[locks]\ntimestamp-format = \" \"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "locks.timestamp-format",
                ..
            }
        ));
    }

    #[test]
    fn load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[editor]\nuse-save-confirmation = true").unwrap();
        let config = ScreensConfig::from_path(file.path()).unwrap();
        assert!(config.editor.use_save_confirmation);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScreensConfig::from_path(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
