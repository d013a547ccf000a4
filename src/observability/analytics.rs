//! Analytics over a materialized query result
//!
//! [`analyze`] is a pure function of the records it is given. The logger
//! feeds it at most `analytics_max_records` records (default 10 000), so for
//! very busy time ranges a snapshot describes the newest records only; the
//! snapshot's `truncated` flag says when that happened.

use super::query::{LogQuery, QueryEngine};
use super::record::{LogRecord, Severity};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

/// Grouping key length for top error messages
pub const ERROR_KEY_CHARS: usize = 100;

/// Number of error messages reported
pub const TOP_ERRORS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub message: String,
    pub count: u64,
}

/// Aggregates over one result set; recomputed on every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_entries: u64,
    /// Every severity is present, zero or not
    pub entries_by_level: BTreeMap<Severity, u64>,
    /// Percentage of error + fatal, rounded
    pub error_rate: u64,
    /// Mean `duration_ms` over records that have one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_response_time: Option<f64>,
    pub top_errors: Vec<ErrorCount>,
    pub active_emitters: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    /// The input hit the record cap and may not cover the whole range
    pub truncated: bool,
}

impl AnalyticsSnapshot {
    pub fn count(&self, level: Severity) -> u64 {
        self.entries_by_level.get(&level).copied().unwrap_or(0)
    }
}

/// Aggregate a result set
///
/// `requested` is the caller's time range; when absent the snapshot reports
/// the observed min/max timestamps.
pub fn analyze(
    records: &[LogRecord],
    requested: Option<TimeRange>,
    truncated: bool,
) -> AnalyticsSnapshot {
    let mut entries_by_level: BTreeMap<Severity, u64> =
        Severity::ALL.iter().map(|&level| (level, 0)).collect();
    let mut active_emitters = BTreeSet::new();
    let mut duration_sum = 0.0;
    let mut duration_count = 0u64;

    // key -> (count, first position) so ties order deterministically
    let mut errors: HashMap<String, (u64, usize)> = HashMap::new();

    for (position, record) in records.iter().enumerate() {
        *entries_by_level.entry(record.level).or_insert(0) += 1;

        if let Some(ref emitter) = record.emitter {
            active_emitters.insert(emitter.clone());
        }
        if let Some(duration) = record.duration_ms {
            duration_sum += duration;
            duration_count += 1;
        }
        if record.level.is_error() {
            let key: String = record.message.chars().take(ERROR_KEY_CHARS).collect();
            errors.entry(key).or_insert((0, position)).0 += 1;
        }
    }

    let total = records.len() as u64;
    let error_total = entries_by_level[&Severity::Error] + entries_by_level[&Severity::Fatal];
    let error_rate = if total == 0 {
        0
    } else {
        (100.0 * error_total as f64 / total as f64).round() as u64
    };

    let mut top: Vec<(String, u64, usize)> = errors
        .into_iter()
        .map(|(message, (count, first))| (message, count, first))
        .collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    let top_errors = top
        .into_iter()
        .take(TOP_ERRORS)
        .map(|(message, count, _)| ErrorCount { message, count })
        .collect();

    let time_range = requested.or_else(|| observed_range(records));

    AnalyticsSnapshot {
        total_entries: total,
        entries_by_level,
        error_rate,
        avg_response_time: (duration_count > 0).then(|| duration_sum / duration_count as f64),
        top_errors,
        active_emitters,
        time_range,
        truncated,
    }
}

/// Query at most `cap` stored records in `[from, to]` and aggregate them
///
/// The snapshot is flagged `truncated` when more records matched than the
/// cap allowed.
pub async fn analyze_stored(
    engine: &QueryEngine,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    cap: usize,
    cancel: &CancellationToken,
) -> Result<AnalyticsSnapshot> {
    let query = LogQuery::new().between(from, to).limit(cap);
    let result = engine.query_with_stats(&query, cancel).await?;

    let truncated = result.total_matches > cap;
    if truncated {
        tracing::warn!(
            matches = result.total_matches,
            cap = cap,
            "Analytics truncated to the newest records"
        );
    }

    let requested = resolve_range(from, to, &result.records, Utc::now());
    Ok(analyze(&result.records, requested, truncated))
}

/// Range reported for the caller's bounds
///
/// An open end is filled from the data (`from`) or from `now` (`to`). With no
/// bounds at all the snapshot falls back to the observed range.
pub fn resolve_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    records: &[LogRecord],
    now: DateTime<Utc>,
) -> Option<TimeRange> {
    match (from, to) {
        (Some(from), Some(to)) => Some(TimeRange { from, to }),
        (Some(from), None) => Some(TimeRange { from, to: now }),
        (None, Some(to)) => records
            .iter()
            .map(|r| r.timestamp)
            .min()
            .map(|from| TimeRange { from, to }),
        (None, None) => None,
    }
}

fn observed_range(records: &[LogRecord]) -> Option<TimeRange> {
    let from = records.iter().map(|r| r.timestamp).min()?;
    let to = records.iter().map(|r| r.timestamp).max()?;
    Some(TimeRange { from, to })
}
