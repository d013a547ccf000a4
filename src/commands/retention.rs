//! Retention CLI commands
//!
//! Inspect segments and run archive/purge passes by hand. The newest live
//! segment is treated as active (a running logger may still be appending to
//! it) and is never touched.

use super::{format_bytes, format_number};
use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use lexlog::config::LoggerConfig;
use lexlog::observability::{
    RetentionManager, RetentionPolicy, RetentionStats, SegmentInfo, SegmentLocation, SegmentStore,
};
use std::sync::Arc;

/// Segment retention management
#[derive(Debug, Clone, Parser)]
pub struct RetentionArgs {
    #[command(subcommand)]
    pub action: RetentionAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum RetentionAction {
    /// List live and archived segments
    Status,

    /// Move live segments older than N days into the archive
    Archive {
        /// Age threshold in days (defaults to archive_after_days)
        #[arg(long)]
        days: Option<u64>,
    },

    /// Delete archived segments older than N days
    Purge {
        /// Age threshold in days (defaults to delete_after_days)
        #[arg(long)]
        days: Option<u64>,
    },

    /// Run the configured policy: archive, segment ceiling, purge
    Apply,
}

/// Execute retention command
pub async fn execute(cfg: LoggerConfig, args: RetentionArgs) -> Result<()> {
    let store = super::open_store(&cfg)?;
    let retention = RetentionManager::new(
        store.clone(),
        RetentionPolicy {
            archive_after_days: cfg.archive_after_days,
            delete_after_days: cfg.delete_after_days,
            max_segments: cfg.max_segments,
        },
    );

    let live = store.list(SegmentLocation::Live).await?;
    let active = live.last().map(|s| s.name.clone());
    let now = Utc::now();

    match args.action {
        RetentionAction::Status => {
            let archived = store.list(SegmentLocation::Archived).await?;
            show_status(&store, &live, &archived, active.as_deref());
        }
        RetentionAction::Archive { days } => {
            let days = days.unwrap_or(cfg.archive_after_days);
            println!("{}", format!("Archiving segments older than {} days...", days).bold());
            let stats = retention.archive(days, now, active.as_deref()).await?;
            show_results(&stats);
        }
        RetentionAction::Purge { days } => {
            let days = days.unwrap_or(cfg.delete_after_days);
            println!(
                "{}",
                format!("Purging archived segments older than {} days...", days).bold()
            );
            let stats = retention.purge(days, now).await?;
            show_results(&stats);
        }
        RetentionAction::Apply => {
            println!("{}", "Applying retention policy...".bold());
            let stats = retention.apply_policy(now, active.as_deref()).await?;
            show_results(&stats);
        }
    }

    Ok(())
}

fn show_status(
    store: &Arc<SegmentStore>,
    live: &[SegmentInfo],
    archived: &[SegmentInfo],
    active: Option<&str>,
) {
    println!("{}", "Segment Storage".bold().underline());
    println!("{:<20} {}", "Directory:", store.root().display());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("SEGMENT").fg(Color::Cyan),
            Cell::new("STATE").fg(Color::Cyan),
            Cell::new("MODIFIED").fg(Color::Cyan),
            Cell::new("SIZE").fg(Color::Cyan),
        ]);

    for segment in archived.iter().chain(live.iter()) {
        let state = match segment.location {
            SegmentLocation::Archived => Cell::new("archived").fg(Color::DarkGrey),
            SegmentLocation::Live if Some(segment.name.as_str()) == active => {
                Cell::new("active").fg(Color::Green)
            }
            SegmentLocation::Live => Cell::new("sealed"),
        };
        table.add_row(vec![
            Cell::new(&segment.name),
            state,
            Cell::new(segment.modified_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(format_bytes(segment.size_bytes)),
        ]);
    }
    println!("{}", table);

    let total: u64 = live.iter().chain(archived.iter()).map(|s| s.size_bytes).sum();
    println!();
    println!("{:<20} {:>10}", "Live Segments:", format_number(live.len() as u64));
    println!("{:<20} {:>10}", "Archived Segments:", format_number(archived.len() as u64));
    println!("{:<20} {:>10}", "Total Size:", format_bytes(total));
}

fn show_results(stats: &RetentionStats) {
    println!();
    println!("{}", "Retention Results:".green().bold());
    println!("{:<30} {:>10}", "  Segments Archived:", format_number(stats.archived));
    println!("{:<30} {:>10}", "  Segments Deleted:", format_number(stats.deleted));
    println!("{:<30} {:>10}", "  Trimmed Over Ceiling:", format_number(stats.trimmed));
    if stats.failures > 0 {
        println!(
            "{:<30} {:>10}",
            "  Failures:",
            format_number(stats.failures).red().bold()
        );
    }
    println!();

    if stats.is_empty() {
        println!("{}", "Nothing to do (all segments within retention period)".dimmed());
    }
}
