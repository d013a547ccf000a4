use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the logging pipeline
///
/// Ingestion never returns one of these to a logging call site: records that
/// cannot be accepted are dropped and counted instead. Malformed segment lines
/// are skipped during scans and never become an error either.
#[derive(Debug, Error)]
pub enum LogError {
    /// Invalid or unusable configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Flush, rotation or segment creation failed
    #[error("Persistence failure on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive move or delete failed for one segment
    #[error("Retention failure on {}: {source}", path.display())]
    Retention {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Segment storage could not be read at all
    #[error("Storage unreadable at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Scan cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, LogError>;

impl LogError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn retention(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Retention {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Persistence { .. } => "persistence_failure",
            Self::Retention { .. } => "retention_failure",
            Self::Storage { .. } => "storage_unreadable",
            Self::Serialization(_) => "serialization_error",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LogError::Config("max_segments must be at least 1".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: max_segments must be at least 1"
        );
    }

    #[test]
    fn test_error_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(LogError::retention("/tmp/x.log", io).kind(), "retention_failure");
        assert_eq!(LogError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_persistence_display_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let error = LogError::persistence("/var/log/app/seg.log", io);
        let text = error.to_string();
        assert!(text.contains("/var/log/app/seg.log"));
        assert!(text.contains("disk full"));
    }
}
