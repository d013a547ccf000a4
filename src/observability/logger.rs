//! The logger handle
//!
//! A [`Logger`] is created by the process entry point with [`Logger::init`]
//! and passed (usually as `Arc<Logger>`) to whatever needs to log. There is no
//! process-wide instance.
//!
//! Shutdown order: stop timers, final flush, close the active segment. If a
//! logger is dropped without [`Logger::shutdown`], the drop path cancels the
//! timers and makes a best-effort synchronous flush.

use super::analytics::{analyze_stored, AnalyticsSnapshot};
use super::buffer::{spawn_flush_task, FlushOutcome, IngestBuffer, IngestStats};
use super::codec::codec_for;
use super::export::{export, ExportFormat};
use super::query::{LogQuery, QueryEngine, QueryResult};
use super::record::{EventKind, LogContext, LogRecord, Severity};
use super::retention::{spawn_retention_task, RetentionManager, RetentionPolicy, RetentionStats};
use super::rotation::{spawn_rotation_task, Rotation, RotationManager};
use super::segment::SegmentStore;
use crate::config::LoggerConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Logger {
    config: LoggerConfig,
    store: Arc<SegmentStore>,
    buffer: Arc<IngestBuffer>,
    rotator: Arc<RotationManager>,
    retention: Arc<RetentionManager>,
    engine: QueryEngine,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl Logger {
    /// Validate configuration, prepare storage, open the first segment and
    /// start the flush, rotation and retention timers
    ///
    /// Must be called inside a tokio runtime.
    pub async fn init(config: LoggerConfig) -> Result<Self> {
        let logger = Self::open(config).await?;

        let interval = Duration::from_millis(logger.config.flush_interval_ms);
        let retention_interval = Duration::from_secs(logger.config.retention_interval_secs);
        let tasks = vec![
            spawn_flush_task(
                logger.buffer.clone(),
                logger.rotator.clone(),
                logger.retention.clone(),
                interval,
                logger.cancel.clone(),
            ),
            spawn_rotation_task(
                logger.rotator.clone(),
                logger.retention.clone(),
                logger.config.rotation,
                logger.cancel.clone(),
            ),
            spawn_retention_task(
                logger.retention.clone(),
                logger.rotator.clone(),
                retention_interval,
                logger.cancel.clone(),
            ),
        ];
        *logger.lock_tasks() = tasks;

        tracing::info!(
            storage_dir = %logger.config.storage_dir.display(),
            min_level = %logger.config.min_level,
            rotation = ?logger.config.rotation,
            "Logger initialized"
        );

        Ok(logger)
    }

    /// Like [`init`](Self::init) but without background timers; flushing,
    /// rotation and retention happen only when called explicitly
    pub async fn open(config: LoggerConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(SegmentStore::new(&config.storage_dir));
        store.ensure_dirs().await?;

        let buffer = Arc::new(IngestBuffer::new(
            config.min_level,
            config.console_echo,
            codec_for(config.line_format, config.timestamp_format),
        ));
        let rotator = Arc::new(RotationManager::new(store.clone(), config.max_segment_bytes));
        let retention = Arc::new(RetentionManager::new(
            store.clone(),
            RetentionPolicy {
                archive_after_days: config.archive_after_days,
                delete_after_days: config.delete_after_days,
                max_segments: config.max_segments,
            },
        ));

        let rotation = rotator.rotate().await?;
        retention.on_sealed(None, &rotation.active).await;

        Ok(Self {
            engine: QueryEngine::new(store.clone()),
            config,
            store,
            buffer,
            rotator,
            retention,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    // ---- ingestion -------------------------------------------------------

    /// Accept a fully built record; never blocks on I/O and never fails
    pub fn record(&self, record: LogRecord) -> bool {
        self.buffer.record(record)
    }

    pub fn should_log(&self, level: Severity) -> bool {
        self.buffer.should_log(level)
    }

    pub fn log(&self, level: Severity, message: impl Into<String>, ctx: LogContext) -> bool {
        self.record(LogRecord::from_context(level, message, ctx))
    }

    pub fn debug(&self, message: impl Into<String>, ctx: LogContext) -> bool {
        self.log(Severity::Debug, message, ctx)
    }

    pub fn info(&self, message: impl Into<String>, ctx: LogContext) -> bool {
        self.log(Severity::Info, message, ctx)
    }

    pub fn warn(&self, message: impl Into<String>, ctx: LogContext) -> bool {
        self.log(Severity::Warn, message, ctx)
    }

    pub fn error(&self, message: impl Into<String>, ctx: LogContext) -> bool {
        self.log(Severity::Error, message, ctx)
    }

    pub fn fatal(&self, message: impl Into<String>, ctx: LogContext) -> bool {
        self.log(Severity::Fatal, message, ctx)
    }

    /// HTTP request record: 5xx is an error, 4xx a warning, the rest info
    pub fn log_request(
        &self,
        method: &str,
        path: &str,
        status_code: u16,
        duration_ms: f64,
        actor_id: Option<&str>,
        correlation_id: Option<&str>,
    ) -> bool {
        let level = match status_code {
            500..=u16::MAX => Severity::Error,
            400..=499 => Severity::Warn,
            _ => Severity::Info,
        };
        let kind = EventKind::Request {
            method: method.to_string(),
            path: path.to_string(),
            status_code,
            duration_ms,
        };
        let mut ctx = LogContext::new().emitter("http").duration(duration_ms);
        ctx.actor_id = actor_id.map(str::to_string);
        ctx.correlation_id = correlation_id.map(str::to_string);
        self.log_kind(level, kind, ctx)
    }

    pub fn log_user_action(
        &self,
        action: &str,
        actor_id: &str,
        details: Option<Value>,
        correlation_id: Option<&str>,
    ) -> bool {
        let kind = EventKind::UserAction {
            action: action.to_string(),
            details,
        };
        let mut ctx = LogContext::new().emitter("user").actor(actor_id);
        ctx.correlation_id = correlation_id.map(str::to_string);
        self.log_kind(Severity::Info, kind, ctx)
    }

    pub fn log_system_event(&self, event: &str, level: Severity, details: Option<Value>) -> bool {
        let kind = EventKind::SystemEvent {
            event: event.to_string(),
            details,
        };
        self.log_kind(level, kind, LogContext::new().emitter("system"))
    }

    pub fn log_metric(&self, name: &str, value: f64, unit: &str, emitter: Option<&str>) -> bool {
        let kind = EventKind::Metric {
            name: name.to_string(),
            value,
            unit: unit.to_string(),
        };
        let ctx = LogContext {
            emitter: Some(emitter.unwrap_or("metrics").to_string()),
            ..LogContext::default()
        };
        self.log_kind(Severity::Info, kind, ctx)
    }

    fn log_kind(&self, level: Severity, kind: EventKind, ctx: LogContext) -> bool {
        let message = kind.message();
        let ctx = LogContext {
            metadata: Some(kind.into_metadata()),
            ..ctx
        };
        self.log(level, message, ctx)
    }

    pub fn stats(&self) -> IngestStats {
        self.buffer.stats()
    }

    // ---- flush / rotation / retention -------------------------------------

    /// Append all buffered records to the active segment
    pub async fn flush(&self) -> Result<usize> {
        let FlushOutcome { flushed, rotated } = self.buffer.flush(&self.rotator).await?;
        if let Some((sealed, active)) = rotated {
            self.retention.on_sealed(sealed.as_deref(), &active).await;
        }
        Ok(flushed)
    }

    /// Seal the active segment and start a new one
    pub async fn rotate(&self) -> Result<Rotation> {
        let rotation = self.rotator.rotate().await?;
        self.retention
            .on_sealed(rotation.sealed.as_deref(), &rotation.active)
            .await;
        Ok(rotation)
    }

    pub async fn active_segment(&self) -> Option<String> {
        self.rotator.active_name().await
    }

    pub async fn apply_retention(&self, archive_after_days: u64, delete_after_days: u64) -> Result<RetentionStats> {
        let active = self.rotator.active_name().await;
        self.retention
            .apply(archive_after_days, delete_after_days, Utc::now(), active.as_deref())
            .await
    }

    /// Archive live segments older than `older_than_days`
    pub async fn archive(&self, older_than_days: u64) -> Result<RetentionStats> {
        let active = self.rotator.active_name().await;
        self.retention
            .archive(older_than_days, Utc::now(), active.as_deref())
            .await
    }

    /// Delete archived segments older than `older_than_days`
    pub async fn purge(&self, older_than_days: u64) -> Result<RetentionStats> {
        self.retention.purge(older_than_days, Utc::now()).await
    }

    // ---- read path ---------------------------------------------------------

    pub async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        self.engine.query(query, &CancellationToken::new()).await
    }

    /// Query that stops early with [`LogError::Cancelled`](crate::error::LogError::Cancelled)
    pub async fn query_with_stats(
        &self,
        query: &LogQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        self.engine.query_with_stats(query, cancel).await
    }

    /// Analytics over `[from, to]`, capped at `analytics_max_records`
    pub async fn analyze(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AnalyticsSnapshot> {
        analyze_stored(
            &self.engine,
            from,
            to,
            self.config.analytics_max_records,
            &CancellationToken::new(),
        )
        .await
    }

    pub async fn export(&self, query: &LogQuery, format: ExportFormat) -> Result<Vec<u8>> {
        let records = self.query(query).await?;
        export(&records, format)
    }

    // ---- lifecycle ---------------------------------------------------------

    /// Stop timers, flush what is buffered, close the active segment
    ///
    /// Later calls are no-ops. Records arriving after shutdown are rejected.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Logger task ended abnormally");
            }
        }

        self.buffer.close();
        let flushed = self.flush().await;
        self.rotator.close().await;

        match flushed {
            Ok(count) => {
                tracing::info!(flushed = count, "Logger shut down");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    lost = self.buffer.len(),
                    "Final flush failed during shutdown"
                );
                Err(e)
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.buffer.close();
        self.buffer.flush_blocking(&self.rotator);
    }
}

/// Metadata map from `key => value` pairs
pub fn metadata<I, K>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::codec::LineFormat;
    use crate::observability::segment::SegmentLocation;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> LoggerConfig {
        LoggerConfig {
            storage_dir: dir.path().to_path_buf(),
            min_level: Severity::Debug,
            console_echo: false,
            ..LoggerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_first_segment() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::open(test_config(&dir)).await.unwrap();

        let live = logger.store().list(SegmentLocation::Live).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(logger.active_segment().await, Some(live[0].name.clone()));
        assert!(dir.path().join("archive").is_dir());
    }

    #[tokio::test]
    async fn test_log_request_levels_and_metadata() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::open(test_config(&dir)).await.unwrap();

        logger.log_request("GET", "/courses", 200, 12.0, Some("u-1"), Some("r-1"));
        logger.log_request("POST", "/cases", 404, 8.0, None, None);
        logger.log_request("POST", "/decks", 503, 900.0, None, None);
        logger.flush().await.unwrap();

        let records = logger.query(&LogQuery::new()).await.unwrap();
        let mut levels: Vec<Severity> = records.iter().map(|r| r.level).collect();
        levels.sort();
        assert_eq!(levels, vec![Severity::Info, Severity::Warn, Severity::Error]);
        assert!(records.iter().all(|r| r.event_type() == Some("request")));

        let ok = records.iter().find(|r| r.level == Severity::Info).unwrap();
        assert_eq!(ok.actor_id.as_deref(), Some("u-1"));
        assert_eq!(ok.correlation_id.as_deref(), Some("r-1"));
        assert_eq!(ok.duration_ms, Some(12.0));
    }

    #[tokio::test]
    async fn test_domain_wrappers_tag_type() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::open(test_config(&dir)).await.unwrap();

        logger.log_user_action("course.publish", "u-7", Some(json!({"courseId": 4})), None);
        logger.log_system_event("startup", Severity::Info, None);
        logger.log_metric("deck_pages", 12.0, "pages", Some("decks"));
        logger.flush().await.unwrap();

        for kind in ["user_action", "system_event", "metric"] {
            let found = logger
                .query(&LogQuery::new().search(format!("\"type\":\"{}\"", kind)))
                .await
                .unwrap();
            assert_eq!(found.len(), 1, "type {}", kind);
        }
        let metric = logger.query(&LogQuery::new().emitter("decks")).await.unwrap();
        assert_eq!(metric[0].message, "Metric: deck_pages = 12pages");
    }

    #[tokio::test]
    async fn test_legacy_format_queryable() {
        let dir = TempDir::new().unwrap();
        let config = LoggerConfig {
            line_format: LineFormat::Legacy,
            ..test_config(&dir)
        };
        let logger = Logger::open(config).await.unwrap();

        logger.warn("Template missing", LogContext::new().emitter("decks"));
        logger.flush().await.unwrap();

        let records = logger.query(&LogQuery::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emitter.as_deref(), Some("decks"));
        assert_eq!(records[0].level, Severity::Warn);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_rejects_later_records() {
        let dir = TempDir::new().unwrap();
        let logger = Logger::init(test_config(&dir)).await.unwrap();

        logger.info("before shutdown", LogContext::new());
        logger.shutdown().await.unwrap();
        logger.shutdown().await.unwrap();
        assert!(logger.is_shut_down());
        assert!(!logger.info("after shutdown", LogContext::new()));

        let records = logger.query(&LogQuery::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "before shutdown");
    }

    #[tokio::test]
    async fn test_drop_flushes_buffer() {
        let dir = TempDir::new().unwrap();
        {
            let logger = Logger::open(test_config(&dir)).await.unwrap();
            logger.info("flushed on drop", LogContext::new());
        }

        let logger = Logger::open(test_config(&dir)).await.unwrap();
        let records = logger.query(&LogQuery::new()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "flushed on drop");
    }

    #[tokio::test]
    async fn test_unwritable_storage_is_config_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, "x").unwrap();

        let config = LoggerConfig {
            storage_dir: file,
            ..LoggerConfig::default()
        };
        let err = Logger::open(config).await.err().unwrap();
        assert_eq!(err.kind(), "config_error");
    }

    #[test]
    fn test_metadata_helper() {
        let map = metadata([("courseId", json!(4)), ("title", json!("Torts"))]);
        assert_eq!(map["courseId"], 4);
        assert_eq!(map.len(), 2);
    }
}
