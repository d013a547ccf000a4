//! Tracing layer feeding a [`Logger`]
//!
//! Converts `tracing` events into log records. Well-known fields map onto
//! record fields; everything else lands in the metadata map.
//!
//! | event field                     | record field     |
//! |---------------------------------|------------------|
//! | `message`                       | `message`        |
//! | `correlation_id`, `request_id`  | `correlation_id` |
//! | `actor_id`, `user_id`           | `actor_id`       |
//! | `duration_ms`                   | `duration_ms`    |
//!
//! The pipeline's own diagnostics are not fed back into it.

use super::logger::Logger;
use super::record::{LogContext, LogRecord, Severity};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// Targets never forwarded to the logger
const SELF_TARGET: &str = "lexlog::observability";

/// Custom tracing layer that writes events through a [`Logger`]
pub struct ObservabilityLayer {
    logger: Arc<Logger>,
}

impl ObservabilityLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

fn severity(level: &Level) -> Severity {
    match *level {
        Level::TRACE | Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    correlation_id: Option<String>,
    actor_id: Option<String>,
    duration_ms: Option<f64>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = Some(value_text(value)),
            "correlation_id" | "request_id" => self.correlation_id = Some(value_text(value)),
            "actor_id" | "user_id" => self.actor_id = Some(value_text(value)),
            "duration_ms" => match value.as_f64() {
                Some(ms) => self.duration_ms = Some(ms),
                None => {
                    self.fields.insert(field.name().to_string(), value);
                }
            },
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{:?}", value);
        self.insert(field, Value::String(text.trim_matches('"').to_string()));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}

impl<S> Layer<S> for ObservabilityLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target.starts_with(SELF_TARGET) {
            return;
        }

        let level = severity(metadata.level());
        if !self.logger.should_log(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let ctx = LogContext {
            metadata: (!visitor.fields.is_empty()).then_some(visitor.fields),
            emitter: Some(target.to_string()),
            actor_id: visitor.actor_id,
            correlation_id: visitor.correlation_id,
            duration_ms: visitor.duration_ms,
        };
        let message = visitor.message.unwrap_or_default();
        self.logger.record(LogRecord::from_context(level, message, ctx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggerConfig;
    use crate::observability::LogQuery;
    use tempfile::TempDir;
    use tracing_subscriber::prelude::*;

    async fn create_test_logger(dir: &TempDir) -> Arc<Logger> {
        let config = LoggerConfig {
            storage_dir: dir.path().to_path_buf(),
            min_level: Severity::Debug,
            console_echo: false,
            ..LoggerConfig::default()
        };
        Arc::new(Logger::open(config).await.unwrap())
    }

    #[tokio::test]
    async fn test_events_become_records() {
        let dir = TempDir::new().unwrap();
        let logger = create_test_logger(&dir).await;
        let subscriber =
            tracing_subscriber::registry().with(ObservabilityLayer::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(
                target: "cases",
                request_id = "req-9",
                actor_id = "u-3",
                duration_ms = 41.5,
                case_id = 77u64,
                "Case export slow"
            );
        });
        logger.flush().await.unwrap();

        let records = logger.query(&LogQuery::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Severity::Warn);
        assert_eq!(record.message, "Case export slow");
        assert_eq!(record.emitter.as_deref(), Some("cases"));
        assert_eq!(record.correlation_id.as_deref(), Some("req-9"));
        assert_eq!(record.actor_id.as_deref(), Some("u-3"));
        assert_eq!(record.duration_ms, Some(41.5));
        assert_eq!(record.metadata.as_ref().unwrap()["case_id"], 77);
    }

    #[tokio::test]
    async fn test_pipeline_targets_are_skipped() {
        let dir = TempDir::new().unwrap();
        let logger = create_test_logger(&dir).await;
        let subscriber =
            tracing_subscriber::registry().with(ObservabilityLayer::new(logger.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "lexlog::observability::buffer", "Flush failed");
            tracing::trace!(target: "decks", "Rendering slide");
        });

        assert_eq!(logger.stats().buffered, 1);
        logger.flush().await.unwrap();
        let records = logger.query(&LogQuery::new()).await.unwrap();
        assert_eq!(records[0].level, Severity::Debug);
        assert_eq!(records[0].emitter.as_deref(), Some("decks"));
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(severity(&Level::TRACE), Severity::Debug);
        assert_eq!(severity(&Level::WARN), Severity::Warn);
        assert_eq!(severity(&Level::ERROR), Severity::Error);
    }
}
