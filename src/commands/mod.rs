//! Command implementations for the CLI
//!
//! This module contains the implementation of all CLI commands:
//! - logs: Query stored records
//! - analyze: Aggregate statistics over a time range
//! - export: Write matching records as JSON or CSV
//! - retention: Inspect segments, archive and purge
//! - emit: Append a record through a short-lived logger
//! - config: Configuration display and validation

pub mod analyze;
pub mod config;
pub mod emit;
pub mod export;
pub mod logs;
pub mod retention;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use lexlog::config::{load_config, LoggerConfig};
use lexlog::observability::{LogQuery, SegmentStore, Severity};
use std::path::Path;
use std::sync::Arc;

/// Record filters shared by `logs` and `export`
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Keep only these levels (repeatable: -l error -l fatal)
    #[arg(short, long = "level")]
    pub levels: Vec<Severity>,

    /// Keep levels at or above this one
    #[arg(long)]
    pub min_level: Option<Severity>,

    /// Filter by emitter
    #[arg(short, long)]
    pub emitter: Option<String>,

    /// Filter by actor ID
    #[arg(short, long)]
    pub actor: Option<String>,

    /// Filter by correlation ID
    #[arg(short, long)]
    pub correlation: Option<String>,

    /// Case-insensitive text in the message or metadata
    #[arg(short, long)]
    pub grep: Option<String>,

    /// Only records from the last N seconds
    #[arg(long, conflicts_with = "from")]
    pub since: Option<u64>,

    /// Only records at or after this RFC 3339 time
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Only records at or before this RFC 3339 time
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,
}

impl FilterArgs {
    pub fn to_query(&self) -> LogQuery {
        let mut query = LogQuery::new().between(self.lower_bound(), self.to);
        if !self.levels.is_empty() {
            query = query.levels(self.levels.iter().copied());
        }
        if let Some(level) = self.min_level {
            query = query.min_level(level);
        }
        if let Some(ref emitter) = self.emitter {
            query = query.emitter(emitter);
        }
        if let Some(ref actor) = self.actor {
            query = query.actor(actor);
        }
        if let Some(ref correlation) = self.correlation {
            query = query.correlation(correlation);
        }
        if let Some(ref grep) = self.grep {
            query = query.search(grep);
        }
        query
    }

    fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.since
            .map(|secs| Utc::now() - Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000)))
            .or(self.from)
    }
}

/// Load configuration, letting `--storage-dir` override the configured one
pub fn load(config_path: Option<&Path>, storage_dir: Option<&Path>) -> Result<LoggerConfig> {
    let mut cfg = load_config(config_path)?;
    if let Some(dir) = storage_dir {
        cfg.storage_dir = dir.to_path_buf();
    }
    Ok(cfg)
}

/// Segment store for read-only commands; nothing is created on disk
pub fn open_store(cfg: &LoggerConfig) -> Result<Arc<SegmentStore>> {
    if !cfg.storage_dir.is_dir() {
        anyhow::bail!(
            "Storage directory {} does not exist",
            cfg.storage_dir.display()
        );
    }
    Ok(Arc::new(SegmentStore::new(&cfg.storage_dir)))
}

/// Format large numbers with commas
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, ch) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result.chars().rev().collect()
}

/// Format byte sizes for segment listings
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{:.1} MiB", b / (KIB * KIB))
    }
}
