//! Ingestion buffer
//!
//! This module provides non-blocking record intake with:
//! - A severity gate in front of the buffer
//! - Periodic batched flushes to the active segment
//! - Immediate flush when an error or fatal record arrives
//! - Re-queueing of a batch whose append failed, ahead of newer records
//! - Optional console echo of each flushed batch, off the caller's thread

use super::codec::LineCodec;
use super::record::{LogRecord, Severity};
use super::retention::RetentionManager;
use super::rotation::RotationManager;
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub accepted: u64,
    /// Below the minimum severity
    pub filtered: u64,
    /// Rejected as malformed, or arrived after shutdown
    pub rejected: u64,
    pub flushed: u64,
    pub flush_failures: u64,
    pub buffered: usize,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    filtered: AtomicU64,
    rejected: AtomicU64,
    flushed: AtomicU64,
    flush_failures: AtomicU64,
}

pub struct IngestBuffer {
    min_level: Severity,
    console_echo: bool,
    codec: Box<dyn LineCodec>,
    pending: Mutex<VecDeque<LogRecord>>,
    urgent: Notify,
    closed: AtomicBool,
    counters: Counters,
}

impl IngestBuffer {
    pub fn new(min_level: Severity, console_echo: bool, codec: Box<dyn LineCodec>) -> Self {
        Self {
            min_level,
            console_echo,
            codec,
            pending: Mutex::new(VecDeque::new()),
            urgent: Notify::new(),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn min_level(&self) -> Severity {
        self.min_level
    }

    pub fn should_log(&self, level: Severity) -> bool {
        level >= self.min_level
    }

    /// Accept a record (non-blocking)
    ///
    /// Never fails the caller. Returns whether the record entered the buffer.
    pub fn record(&self, record: LogRecord) -> bool {
        if !self.should_log(record.level) {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_dropped("below_level");
            return false;
        }
        if self.closed.load(Ordering::Acquire) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_dropped("closed");
            return false;
        }
        if record.duration_ms.is_some_and(|d| !d.is_finite()) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_dropped("rejected");
            return false;
        }

        let level = record.level;
        self.lock_pending().push_back(record);
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_accepted(level);

        if level.is_error() {
            self.urgent.notify_one();
        }
        true
    }

    /// Append every buffered record to the active segment, in arrival order
    ///
    /// On failure the batch goes back to the front of the buffer and the
    /// error is returned; the next flush retries it.
    pub async fn flush(&self, rotator: &RotationManager) -> Result<FlushOutcome> {
        // Bind the batch to the segment active right now: the rotation lock
        // is held from drain to append.
        let mut state = rotator.lock().await;

        let batch: Vec<LogRecord> = self.lock_pending().drain(..).collect();
        if batch.is_empty() {
            return Ok(FlushOutcome::default());
        }

        let start = Instant::now();
        let mut bytes = Vec::new();
        let mut encoded = Vec::with_capacity(batch.len());
        for record in batch {
            match self.codec.encode(&record) {
                Ok(line) => {
                    bytes.extend_from_slice(line.as_bytes());
                    bytes.push(b'\n');
                    encoded.push(record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping record that failed to encode");
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_dropped("rejected");
                }
            }
        }
        if encoded.is_empty() {
            return Ok(FlushOutcome::default());
        }

        let appended = rotator.append_locked(&mut state, &bytes).await;
        match appended {
            Ok(rotation) => {
                drop(state);
                let count = encoded.len();
                let elapsed = start.elapsed();
                self.counters.flushed.fetch_add(count as u64, Ordering::Relaxed);
                crate::metrics::record_flush(count, elapsed);
                tracing::debug!(
                    count = count,
                    duration_ms = elapsed.as_millis() as u64,
                    "Flushed log batch"
                );
                if self.console_echo {
                    let echoed =
                        write_echo(&encoded, &mut tokio::io::stdout(), &mut tokio::io::stderr()).await;
                    if let Err(e) = echoed {
                        tracing::debug!(error = %e, "Console echo failed");
                    }
                }
                Ok(FlushOutcome {
                    flushed: count,
                    rotated: rotation.map(|r| (r.sealed, r.active)),
                })
            }
            Err(e) => {
                let count = encoded.len();
                self.requeue(encoded);
                self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_flush_failure(e.kind());
                tracing::error!(
                    error = %e,
                    count = count,
                    "Failed to flush log batch, re-queued for retry"
                );
                Err(e)
            }
        }
    }

    /// Best-effort synchronous flush for the drop path
    pub fn flush_blocking(&self, rotator: &RotationManager) -> usize {
        let batch: Vec<LogRecord> = self.lock_pending().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        let mut bytes = Vec::new();
        for record in &batch {
            if let Ok(line) = self.codec.encode(record) {
                bytes.extend_from_slice(line.as_bytes());
                bytes.push(b'\n');
            }
        }

        match rotator.try_append_blocking(&bytes) {
            Ok(true) => batch.len(),
            Ok(false) => {
                eprintln!("lexlog: {} buffered records lost at drop (segment busy)", batch.len());
                0
            }
            Err(e) => {
                eprintln!("lexlog: {} buffered records lost at drop: {}", batch.len(), e);
                0
            }
        }
    }

    /// Reject all later records
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the currently buffered records (oldest first)
    pub fn pending(&self) -> Vec<LogRecord> {
        self.lock_pending().iter().cloned().collect()
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            flushed: self.counters.flushed.load(Ordering::Relaxed),
            flush_failures: self.counters.flush_failures.load(Ordering::Relaxed),
            buffered: self.len(),
        }
    }

    /// Resolves when an error/fatal record asks for an immediate flush
    pub async fn urgent(&self) {
        self.urgent.notified().await
    }

    fn requeue(&self, batch: Vec<LogRecord>) {
        let mut pending = self.lock_pending();
        for record in batch.into_iter().rev() {
            pending.push_front(record);
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
        // A panic while holding this lock cannot leave the deque half-updated
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a successful flush did
#[derive(Debug, Clone, Default)]
pub struct FlushOutcome {
    pub flushed: usize,
    /// `(sealed, active)` when the flush filled the segment and rotated it
    pub rotated: Option<(Option<String>, String)>,
}

fn echo_line(record: &LogRecord) -> String {
    let timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
    let label = record.level.as_str().to_uppercase();
    let level = match record.level {
        Severity::Fatal => label.red().bold().reversed(),
        Severity::Error => label.red().bold(),
        Severity::Warn => label.yellow().bold(),
        Severity::Info => label.green(),
        Severity::Debug => label.blue(),
    };
    let emitter = record
        .emitter
        .as_deref()
        .map(|e| format!(" [{}]", e))
        .unwrap_or_default();

    format!(
        "{} {}{} {}\n",
        timestamp.to_string().dimmed(),
        level,
        emitter.cyan(),
        record.message
    )
}

/// Echo a flushed batch: error and fatal lines to `err`, the rest to `out`
async fn write_echo<O, E>(records: &[LogRecord], out: &mut O, err: &mut E) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut out_buf = String::new();
    let mut err_buf = String::new();
    for record in records {
        if record.level.is_error() {
            err_buf.push_str(&echo_line(record));
        } else {
            out_buf.push_str(&echo_line(record));
        }
    }

    if !out_buf.is_empty() {
        out.write_all(out_buf.as_bytes()).await?;
        out.flush().await?;
    }
    if !err_buf.is_empty() {
        err.write_all(err_buf.as_bytes()).await?;
        err.flush().await?;
    }
    Ok(())
}

/// Background flush task
///
/// Flushes on the fixed period and whenever an error/fatal record arrives.
/// A size-triggered rotation during a flush hands the sealed segment to
/// retention housekeeping.
pub fn spawn_flush_task(
    buffer: Arc<IngestBuffer>,
    rotator: Arc<RotationManager>,
    retention: Arc<RetentionManager>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = buffer.urgent() => {}
            }

            // Errors are already logged and the batch re-queued
            if let Ok(FlushOutcome { rotated: Some((sealed, active)), .. }) =
                buffer.flush(&rotator).await
            {
                retention.on_sealed(sealed.as_deref(), &active).await;
            }
        }

        tracing::debug!("Flush task shutting down");
    })
}
