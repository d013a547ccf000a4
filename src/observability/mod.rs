//! Logging pipeline
//!
//! This module provides a single-machine structured logging pipeline with:
//! - **Ingestion**: non-blocking record intake behind a severity gate
//! - **Persistence**: batched appends to append-only segment files
//! - **Lifecycle**: time and size based rotation, archive-then-delete retention
//! - **Read path**: filtered queries, analytics and export over stored segments
//!
//! ## Architecture
//!
//! ```text
//! Logger::record ──► IngestBuffer ──flush──► active segment (RotationManager)
//!                                                  │ rotate
//!                                                  ▼
//!                                   sealed live ──► archive/ ──► deleted
//!                                          (RetentionManager)
//!
//! QueryEngine ◄── live + archived segments ──► analyze / export
//! ```
//!
//! Queries read committed segment bytes only; records still in the buffer are
//! invisible until the next flush.

pub mod analytics;
pub mod buffer;
pub mod codec;
pub mod export;
pub mod layer;
pub mod logger;
pub mod query;
pub mod record;
pub mod retention;
pub mod rotation;
pub mod segment;

// Re-export public types
pub use analytics::{analyze, analyze_stored, resolve_range, AnalyticsSnapshot, ErrorCount, TimeRange};
pub use buffer::{spawn_flush_task, FlushOutcome, IngestBuffer, IngestStats};
pub use codec::{codec_for, decode_line, LineCodec, LineFormat, TimestampFormat};
pub use export::{export, ExportFormat};
pub use layer::ObservabilityLayer;
pub use logger::{metadata, Logger};
pub use query::{LogQuery, QueryEngine, QueryResult, DEFAULT_LIMIT};
pub use record::{EventKind, LogContext, LogRecord, Severity};
pub use retention::{spawn_retention_task, RetentionManager, RetentionPolicy, RetentionStats};
pub use rotation::{spawn_rotation_task, Rotation, RotationCadence, RotationManager};
pub use segment::{SegmentInfo, SegmentLocation, SegmentStore};
