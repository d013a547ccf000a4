use crate::error::{LogError, Result};
use crate::observability::{LineFormat, RotationCadence, Severity, TimestampFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `LEXLOG__MIN_LEVEL=debug`
pub const ENV_PREFIX: &str = "LEXLOG";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggerConfig {
    /// Directory holding live segments (and the `archive/` area)
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_min_level")]
    pub min_level: Severity,

    /// Rotate once a flush leaves the active segment at or above this size
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: u64,

    /// Ceiling on live segments, active one included
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,

    #[serde(default)]
    pub rotation: RotationCadence,

    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: u64,

    #[serde(default = "default_delete_after_days")]
    pub delete_after_days: u64,

    #[serde(default = "default_console_echo")]
    pub console_echo: bool,

    #[serde(default)]
    pub line_format: LineFormat,

    #[serde(default)]
    pub timestamp_format: TimestampFormat,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,

    /// Upper bound on records fed to one analytics computation
    #[serde(default = "default_analytics_max_records")]
    pub analytics_max_records: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            min_level: default_min_level(),
            max_segment_bytes: default_max_segment_bytes(),
            max_segments: default_max_segments(),
            rotation: RotationCadence::default(),
            archive_after_days: default_archive_after_days(),
            delete_after_days: default_delete_after_days(),
            console_echo: default_console_echo(),
            line_format: LineFormat::default(),
            timestamp_format: TimestampFormat::default(),
            flush_interval_ms: default_flush_interval_ms(),
            retention_interval_secs: default_retention_interval_secs(),
            analytics_max_records: default_analytics_max_records(),
        }
    }
}

impl LoggerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_segments < 1 {
            return Err(LogError::Config("max_segments must be at least 1".to_string()));
        }
        if self.flush_interval_ms == 0 {
            return Err(LogError::Config("flush_interval_ms must be greater than 0".to_string()));
        }
        if self.retention_interval_secs == 0 {
            return Err(LogError::Config(
                "retention_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_segment_bytes == 0 {
            return Err(LogError::Config("max_segment_bytes must be greater than 0".to_string()));
        }
        if self.delete_after_days < self.archive_after_days {
            return Err(LogError::Config(format!(
                "delete_after_days ({}) must not be less than archive_after_days ({})",
                self.delete_after_days, self.archive_after_days
            )));
        }
        if self.analytics_max_records == 0 {
            return Err(LogError::Config(
                "analytics_max_records must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_min_level() -> Severity {
    Severity::Info
}

fn default_max_segment_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_segments() -> usize {
    30
}

fn default_archive_after_days() -> u64 {
    7
}

fn default_delete_after_days() -> u64 {
    30
}

fn default_console_echo() -> bool {
    true
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_retention_interval_secs() -> u64 {
    3600
}

fn default_analytics_max_records() -> usize {
    10_000
}

/// Load configuration: optional TOML file, then `LEXLOG__*` environment
/// variables, then validation
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LoggerConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(true),
        );
    }

    let config = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let cfg: LoggerConfig = config.try_deserialize()?;
    cfg.validate()?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = LoggerConfig::default();
        assert_eq!(cfg.storage_dir, PathBuf::from("./logs"));
        assert_eq!(cfg.min_level, Severity::Info);
        assert_eq!(cfg.max_segment_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.max_segments, 30);
        assert_eq!(cfg.rotation, RotationCadence::Daily);
        assert_eq!(cfg.archive_after_days, 7);
        assert_eq!(cfg.delete_after_days, 30);
        assert!(cfg.console_echo);
        assert_eq!(cfg.line_format, LineFormat::Structured);
        assert_eq!(cfg.timestamp_format, TimestampFormat::Iso);
        assert_eq!(cfg.flush_interval_ms, 5000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_segments() {
        let cfg = LoggerConfig {
            max_segments: 0,
            ..LoggerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.kind(), "config_error");
        assert!(err.to_string().contains("max_segments"));
    }

    #[test]
    fn test_validate_rejects_delete_before_archive() {
        let cfg = LoggerConfig {
            archive_after_days: 10,
            delete_after_days: 5,
            ..LoggerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_flush_interval() {
        let cfg = LoggerConfig {
            flush_interval_ms: 0,
            ..LoggerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: LoggerConfig = toml::from_str(
            r#"
            storage_dir = "/var/log/lexlog"
            min_level = "warn"
            rotation = "hourly"
            line_format = "legacy"
            timestamp_format = "epoch"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.storage_dir, PathBuf::from("/var/log/lexlog"));
        assert_eq!(cfg.min_level, Severity::Warn);
        assert_eq!(cfg.rotation, RotationCadence::Hourly);
        assert_eq!(cfg.line_format, LineFormat::Legacy);
        assert_eq!(cfg.timestamp_format, TimestampFormat::Epoch);
        assert_eq!(cfg.max_segments, 30);
        assert!(cfg.console_echo);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexlog.toml");
        std::fs::write(
            &path,
            "max_segments = 5\narchive_after_days = 2\ndelete_after_days = 9\nconsole_echo = false\n",
        )
        .unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.max_segments, 5);
        assert_eq!(cfg.archive_after_days, 2);
        assert_eq!(cfg.delete_after_days, 9);
        assert!(!cfg.console_echo);
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexlog.toml");
        std::fs::write(&path, "archive_after_days = 40\ndelete_after_days = 10\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("delete_after_days"));
    }
}
