use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Tracker settings, read from a JSON file. Missing keys take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    pub db_path: PathBuf,
    /// Prefix of human-readable incident numbers (`INC` -> `INC-000001`).
    pub number_prefix: String,
    /// Zero-padded digits after the prefix.
    pub number_width: usize,
    /// Write Created/Resolved/Closed events to the notification outbox.
    pub queue_notifications: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("callcenter.sqlite"),
            number_prefix: "INC".to_string(),
            number_width: 6,
            queue_notifications: true,
        }
    }
}

impl TrackerConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::new("CONFIG_READ_FAILED", "Failed to read tracker config")
                .with_details(format!("path={}; err={e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let config: TrackerConfig = serde_json::from_str(text).map_err(|e| {
            AppError::new("CONFIG_PARSE_FAILED", "Tracker config is not valid JSON")
                .with_details(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "db_path must not be empty"));
        }
        let prefix = self.number_prefix.trim();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "number_prefix must be non-empty ASCII alphanumerics",
            )
            .with_details(format!("number_prefix={:?}", self.number_prefix)));
        }
        if !(1..=12).contains(&self.number_width) {
            return Err(AppError::new("CONFIG_INVALID", "number_width must be between 1 and 12")
                .with_details(format!("number_width={}", self.number_width)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = TrackerConfig::from_json(r#"{"number_prefix": "CC"}"#).unwrap();
        assert_eq!(cfg.number_prefix, "CC");
        assert_eq!(cfg.number_width, 6);
        assert!(cfg.queue_notifications);
    }

    #[test]
    fn rejects_bad_prefix_and_width() {
        let err = TrackerConfig::from_json(r#"{"number_prefix": "IN C"}"#).unwrap_err();
        assert_eq!(err.code, "CONFIG_INVALID");
        let err = TrackerConfig::from_json(r#"{"number_width": 0}"#).unwrap_err();
        assert_eq!(err.code, "CONFIG_INVALID");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = TrackerConfig::from_json("{").unwrap_err();
        assert_eq!(err.code, "CONFIG_PARSE_FAILED");
    }

    #[test]
    fn load_reads_a_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tracker.json");
        std::fs::write(
            &path,
            r#"{"db_path": "cc.sqlite", "number_prefix": "CC", "number_width": 4, "queue_notifications": false}"#,
        )
        .unwrap();

        let cfg = TrackerConfig::load(&path).unwrap();
        assert_eq!(
            cfg,
            TrackerConfig {
                db_path: PathBuf::from("cc.sqlite"),
                number_prefix: "CC".to_string(),
                number_width: 4,
                queue_notifications: false,
            }
        );
    }

    #[test]
    fn load_of_missing_file_is_a_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("absent.json");
        let err = TrackerConfig::load(&path).unwrap_err();
        assert_eq!(err.code, "CONFIG_READ_FAILED");
        assert!(err.details.unwrap().contains("absent.json"));
    }
}
