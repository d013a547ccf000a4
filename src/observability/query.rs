//! Query engine over stored segments
//!
//! Reads committed segment bytes only (live and archived), never the
//! in-memory buffer. Scans run newest segment first; all matches are
//! collected, sorted newest first (stable, so equal timestamps keep scan
//! order), then paginated.

use super::codec::decode_line;
use super::record::{LogRecord, Severity};
use super::segment::{SegmentInfo, SegmentLocation, SegmentStore};
use crate::error::{LogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Page size when the caller gives none
pub const DEFAULT_LIMIT: usize = 100;

/// Check cancellation every this many lines within a segment
const CANCEL_CHECK_LINES: usize = 1024;

/// Caller-supplied filter and pagination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Keep only these severities
    pub levels: Option<Vec<Severity>>,

    /// Keep severities at or above this one
    pub min_level: Option<Severity>,

    pub emitter: Option<String>,

    pub actor_id: Option<String>,

    pub correlation_id: Option<String>,

    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,

    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,

    /// Case-insensitive substring of the message or serialized metadata
    pub search: Option<String>,

    #[serde(default)]
    pub offset: usize,

    /// Defaults to [`DEFAULT_LIMIT`]
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = Severity>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    pub fn min_level(mut self, level: Severity) -> Self {
        self.min_level = Some(level);
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

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Whether a record passes every filter
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(ref levels) = self.levels {
            if !levels.contains(&record.level) {
                return false;
            }
        }
        if let Some(min) = self.min_level {
            if record.level < min {
                return false;
            }
        }
        if let Some(ref emitter) = self.emitter {
            if record.emitter.as_ref() != Some(emitter) {
                return false;
            }
        }
        if let Some(ref actor) = self.actor_id {
            if record.actor_id.as_ref() != Some(actor) {
                return false;
            }
        }
        if let Some(ref correlation) = self.correlation_id {
            if record.correlation_id.as_ref() != Some(correlation) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            if !matches_text(record, &search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

fn matches_text(record: &LogRecord, needle: &str) -> bool {
    if record.message.to_lowercase().contains(needle) {
        return true;
    }
    record
        .metadata
        .as_ref()
        .and_then(|m| serde_json::to_string(m).ok())
        .is_some_and(|json| json.to_lowercase().contains(needle))
}

/// Query result with scan statistics
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub records: Vec<LogRecord>,
    /// Matches before pagination
    pub total_matches: usize,
    pub segments_scanned: usize,
    pub malformed_lines: u64,
}

#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<SegmentStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self { store }
    }

    /// Run a query, returning one page of matches, newest first
    ///
    /// # Example
    ///
    /// ```ignore
    /// let query = LogQuery::new().levels([Severity::Error, Severity::Fatal]).limit(20);
    /// let records = engine.query(&query, &CancellationToken::new()).await?;
    /// ```
    pub async fn query(&self, query: &LogQuery, cancel: &CancellationToken) -> Result<Vec<LogRecord>> {
        Ok(self.query_with_stats(query, cancel).await?.records)
    }

    pub async fn query_with_stats(
        &self,
        query: &LogQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let segments = self.store.list_newest_first().await?;

        let mut matches = Vec::new();
        let mut malformed = 0u64;
        let mut scanned = 0usize;

        for segment in &segments {
            if cancel.is_cancelled() {
                return Err(LogError::Cancelled);
            }
            if let Some(count) = scan_segment(&self.store, segment, query, &mut matches, cancel).await? {
                malformed += count;
                scanned += 1;
            }
        }

        if malformed > 0 {
            tracing::debug!(malformed = malformed, "Skipped malformed segment lines");
        }
        crate::metrics::record_malformed(malformed);

        // Stable: equal timestamps keep newest-segment-first scan order
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total_matches = matches.len();
        let records = matches
            .into_iter()
            .skip(query.offset)
            .take(query.effective_limit())
            .collect();

        Ok(QueryResult {
            records,
            total_matches,
            segments_scanned: scanned,
            malformed_lines: malformed,
        })
    }
}

/// Open a listed segment, following it into the archive if retention moved
/// it after listing; `None` when it has been deleted
async fn open_segment(store: &SegmentStore, segment: &SegmentInfo) -> Result<Option<tokio::fs::File>> {
    let mut candidates = vec![segment.path.clone()];
    if segment.location == SegmentLocation::Live {
        candidates.push(store.archived_path(&segment.name));
    }

    for path in candidates {
        match tokio::fs::File::open(&path).await {
            Ok(file) => return Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(LogError::storage(&path, e)),
        }
    }
    Ok(None)
}

/// Scan one segment into `matches`
///
/// Returns the number of malformed lines, or `None` when the segment was
/// deleted between listing and opening.
async fn scan_segment(
    store: &SegmentStore,
    segment: &SegmentInfo,
    query: &LogQuery,
    matches: &mut Vec<LogRecord>,
    cancel: &CancellationToken,
) -> Result<Option<u64>> {
    let file = match open_segment(store, segment).await? {
        Some(file) => file,
        None => {
            tracing::debug!(segment = %segment.name, "Segment removed during scan");
            return Ok(None);
        }
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut malformed = 0u64;
    let mut lines = 0usize;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| LogError::storage(&segment.path, e))?;
        if read == 0 {
            break;
        }

        lines += 1;
        if lines % CANCEL_CHECK_LINES == 0 && cancel.is_cancelled() {
            return Err(LogError::Cancelled);
        }

        // Invalid UTF-8 is just another malformed line
        let Ok(line) = std::str::from_utf8(&buf) else {
            malformed += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(line) {
            Some(record) if query.matches(&record) => matches.push(record),
            Some(_) => {}
            None => malformed += 1,
        }
    }

    Ok(Some(malformed))
}
