//! Log record model
//!
//! A [`LogRecord`] is built once at the logging call site and then only moved
//! or cloned through the pipeline. Optional fields come in through
//! [`LogContext`]; nothing downstream of [`Logger::record`](super::Logger::record)
//! alters what the caller produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::Backtrace;
use std::fmt;
use std::str::FromStr;

/// Record severity, ordered `debug < info < warn < error < fatal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    /// Severities that trigger an immediate flush and carry a stack trace
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error | Severity::Fatal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" | "critical" => Ok(Severity::Fatal),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// The atomic unit flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl LogRecord {
    /// Create a record stamped with the current time
    ///
    /// Error and fatal records capture the call-site stack trace.
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        let stack_trace = if level.is_error() {
            Some(Backtrace::force_capture().to_string())
        } else {
            None
        };

        Self {
            timestamp: truncate_millis(Utc::now()),
            level,
            message: message.into(),
            metadata: None,
            emitter: None,
            correlation_id: None,
            actor_id: None,
            duration_ms: None,
            stack_trace,
        }
    }

    /// Create a record from call-site context
    pub fn from_context(level: Severity, message: impl Into<String>, ctx: LogContext) -> Self {
        let LogContext {
            metadata,
            emitter,
            actor_id,
            correlation_id,
            duration_ms,
        } = ctx;
        Self {
            metadata,
            emitter,
            actor_id,
            correlation_id,
            duration_ms,
            ..Self::new(level, message)
        }
    }

    /// Override the timestamp (millisecond precision is kept)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = truncate_millis(timestamp);
        self
    }

    /// Value of `metadata.type`, set by the typed convenience wrappers
    pub fn event_type(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("type"))
            .and_then(|v| v.as_str())
    }
}

fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Optional call-site fields for the severity convenience methods
///
/// # Example
///
/// ```ignore
/// logger.info("Case opened", LogContext::new().emitter("cases").actor("u-17"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub metadata: Option<Map<String, Value>>,
    pub emitter: Option<String>,
    pub actor_id: Option<String>,
    pub correlation_id: Option<String>,
    pub duration_ms: Option<f64>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn emitter(mut self, emitter: impl Into<String>) -> Self {
        self.emitter = Some(emitter.into());
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Well-known record subtypes produced by the domain wrappers
///
/// Converted into the opaque metadata map (tagged with `type`) only when the
/// record is built.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Request {
        method: String,
        path: String,
        status_code: u16,
        duration_ms: f64,
    },
    UserAction {
        action: String,
        details: Option<Value>,
    },
    SystemEvent {
        event: String,
        details: Option<Value>,
    },
    Metric {
        name: String,
        value: f64,
        unit: String,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Request { .. } => "request",
            EventKind::UserAction { .. } => "user_action",
            EventKind::SystemEvent { .. } => "system_event",
            EventKind::Metric { .. } => "metric",
        }
    }

    /// Human-readable message for the record
    pub fn message(&self) -> String {
        match self {
            EventKind::Request {
                method,
                path,
                status_code,
                duration_ms,
            } => format!("{} {} {} - {}ms", method, path, status_code, duration_ms),
            EventKind::UserAction { action, .. } => format!("User action: {}", action),
            EventKind::SystemEvent { event, .. } => format!("System event: {}", event),
            EventKind::Metric { name, value, unit } => {
                format!("Metric: {} = {}{}", name, value, unit)
            }
        }
    }

    pub fn into_metadata(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::from(self.type_name()));

        match self {
            EventKind::Request {
                method,
                path,
                status_code,
                duration_ms,
            } => {
                map.insert("method".to_string(), Value::from(method));
                map.insert("path".to_string(), Value::from(path));
                map.insert("statusCode".to_string(), Value::from(status_code));
                map.insert("durationMs".to_string(), Value::from(duration_ms));
            }
            EventKind::UserAction { action, details } => {
                map.insert("action".to_string(), Value::from(action));
                if let Some(details) = details {
                    map.insert("details".to_string(), details);
                }
            }
            EventKind::SystemEvent { event, details } => {
                map.insert("event".to_string(), Value::from(event));
                if let Some(details) = details {
                    map.insert("details".to_string(), details);
                }
            }
            EventKind::Metric { name, value, unit } => {
                map.insert("metric".to_string(), Value::from(name));
                map.insert("value".to_string(), Value::from(value));
                map.insert("unit".to_string(), Value::from(unit));
            }
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!(" Fatal ".parse::<Severity>().unwrap(), Severity::Fatal);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_stack_trace_only_for_errors() {
        assert!(LogRecord::new(Severity::Info, "ok").stack_trace.is_none());
        assert!(LogRecord::new(Severity::Warn, "hmm").stack_trace.is_none());
        assert!(LogRecord::new(Severity::Error, "bad").stack_trace.is_some());
        assert!(LogRecord::new(Severity::Fatal, "worse").stack_trace.is_some());
    }

    #[test]
    fn test_timestamp_truncated_to_millis() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let record = LogRecord::new(Severity::Info, "x").with_timestamp(ts);
        assert_eq!(record.timestamp.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_from_context() {
        let ctx = LogContext::new()
            .emitter("cases")
            .actor("u-1")
            .correlation("req-9")
            .duration(12.5);
        let record = LogRecord::from_context(Severity::Info, "opened", ctx);
        assert_eq!(record.emitter.as_deref(), Some("cases"));
        assert_eq!(record.actor_id.as_deref(), Some("u-1"));
        assert_eq!(record.correlation_id.as_deref(), Some("req-9"));
        assert_eq!(record.duration_ms, Some(12.5));
    }

    #[test]
    fn test_event_kind_metadata() {
        let kind = EventKind::Request {
            method: "GET".to_string(),
            path: "/api/courses".to_string(),
            status_code: 200,
            duration_ms: 42.0,
        };
        assert_eq!(kind.message(), "GET /api/courses 200 - 42ms");

        let map = kind.into_metadata();
        assert_eq!(map["type"], "request");
        assert_eq!(map["statusCode"], 200);

        let record = LogRecord::from_context(Severity::Info, "x", LogContext::new().metadata(map));
        assert_eq!(record.event_type(), Some("request"));
    }

    #[test]
    fn test_metric_metadata() {
        let kind = EventKind::Metric {
            name: "deck_pages".to_string(),
            value: 12.0,
            unit: "pages".to_string(),
        };
        let map = kind.into_metadata();
        assert_eq!(map["type"], "metric");
        assert_eq!(map["unit"], "pages");
    }
}
