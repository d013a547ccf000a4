use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

use crate::observability::{RetentionStats, Severity};

/// Register metric descriptions with whichever recorder the host installed
///
/// Safe to call more than once. Without an installed recorder every metric
/// call below is a no-op.
pub fn init_metric_descriptions() {
    describe_counter!(
        "lexlog_records_accepted_total",
        "Log records accepted into the ingestion buffer"
    );
    describe_counter!(
        "lexlog_records_dropped_total",
        "Log records dropped before buffering"
    );
    describe_counter!(
        "lexlog_records_flushed_total",
        "Log records appended to the active segment"
    );
    describe_counter!(
        "lexlog_flush_failures_total",
        "Flushes that failed and re-queued their batch"
    );
    describe_histogram!(
        "lexlog_flush_duration_seconds",
        "Time spent appending one batch"
    );
    describe_counter!("lexlog_rotations_total", "Segment rotations");
    describe_counter!(
        "lexlog_retention_actions_total",
        "Segments archived, deleted or trimmed by retention"
    );
    describe_counter!(
        "lexlog_malformed_lines_total",
        "Segment lines skipped during scans"
    );
    describe_gauge!("lexlog_info", "Logger version information");

    gauge!("lexlog_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

pub fn record_accepted(level: Severity) {
    counter!("lexlog_records_accepted_total", "level" => level.as_str()).increment(1);
}

/// Record a dropped record; `reason` is `below_level`, `rejected` or `closed`
pub fn record_dropped(reason: &'static str) {
    counter!("lexlog_records_dropped_total", "reason" => reason).increment(1);
}

pub fn record_flush(count: usize, elapsed: Duration) {
    counter!("lexlog_records_flushed_total").increment(count as u64);
    histogram!("lexlog_flush_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_flush_failure(kind: &'static str) {
    counter!("lexlog_flush_failures_total", "error_type" => kind).increment(1);
}

pub fn record_rotation() {
    counter!("lexlog_rotations_total").increment(1);
}

pub fn record_retention(stats: &RetentionStats) {
    counter!("lexlog_retention_actions_total", "action" => "archived").increment(stats.archived);
    counter!("lexlog_retention_actions_total", "action" => "deleted").increment(stats.deleted);
    counter!("lexlog_retention_actions_total", "action" => "trimmed").increment(stats.trimmed);
    counter!("lexlog_retention_actions_total", "action" => "failed").increment(stats.failures);
}

pub fn record_malformed(count: u64) {
    if count > 0 {
        counter!("lexlog_malformed_lines_total").increment(count);
    }
}
