//! Logs query command
//!
//! Query and display stored records from live and archived segments.

use super::FilterArgs;
use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use lexlog::config::LoggerConfig;
use lexlog::observability::{LogRecord, QueryEngine, Severity};
use tokio_util::sync::CancellationToken;

/// Query and display logs
#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Skip this many matches (newest first)
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Maximum number of results
    #[arg(long, default_value = "100")]
    pub limit: usize,

    /// Show oldest first (default: newest first)
    #[arg(long)]
    pub oldest_first: bool,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,

    /// Show metadata and stack traces under each record
    #[arg(short, long)]
    pub verbose: bool,
}

/// Execute the logs command
pub async fn execute(cfg: LoggerConfig, args: LogsArgs) -> Result<()> {
    let engine = QueryEngine::new(super::open_store(&cfg)?);
    let cancel = CancellationToken::new();

    let query = args.filter.to_query().offset(args.offset).limit(args.limit);
    let result = engine.query_with_stats(&query, &cancel).await?;
    let mut records = result.records;

    if records.is_empty() {
        println!("{}", "No logs found matching the criteria".yellow());
        return Ok(());
    }
    if args.oldest_first {
        records.reverse();
    }

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            println!(
                "{}",
                format!(
                    "Showing {} of {} matching records ({} segments scanned)",
                    records.len(),
                    result.total_matches,
                    result.segments_scanned
                )
                .bold()
            );
            if result.malformed_lines > 0 {
                println!(
                    "{}",
                    format!("{} malformed lines skipped", result.malformed_lines).yellow()
                );
            }
            println!();
            display_records(&records, args.verbose);
        }
    }

    Ok(())
}

/// Display records in human-friendly text format
fn display_records(records: &[LogRecord], verbose: bool) {
    for record in records {
        let timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");

        let label = record.level.as_str().to_uppercase();
        let level_colored = match record.level {
            Severity::Fatal => label.red().bold().reversed(),
            Severity::Error => label.red().bold(),
            Severity::Warn => label.yellow().bold(),
            Severity::Info => label.green(),
            Severity::Debug => label.blue(),
        };

        let emitter = record.emitter.as_deref().unwrap_or("-");
        let correlation = record
            .correlation_id
            .as_ref()
            .map(|id| format!(" corr={}", id.chars().take(8).collect::<String>()))
            .unwrap_or_default();
        let actor = record
            .actor_id
            .as_ref()
            .map(|id| format!(" actor={}", id))
            .unwrap_or_default();
        let duration = record
            .duration_ms
            .map(|ms| format!(" ({}ms)", ms))
            .unwrap_or_default();

        println!(
            "{} {} {}{}{} {}{}",
            timestamp.to_string().dimmed(),
            level_colored,
            emitter.cyan(),
            correlation.dimmed(),
            actor.dimmed(),
            record.message,
            duration.dimmed()
        );

        if verbose {
            if let Some(ref metadata) = record.metadata {
                if let Ok(json) = serde_json::to_string(metadata) {
                    println!("  {}", format!("metadata: {}", json).dimmed());
                }
            }
            if let Some(ref trace) = record.stack_trace {
                for line in trace.lines().take(12) {
                    println!("  {}", line.dimmed());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_args_parsing() {
        let args = LogsArgs::parse_from([
            "logs", "--level", "error", "--level", "fatal", "--limit", "50", "--correlation", "req-1",
        ]);
        assert_eq!(args.filter.levels, vec![Severity::Error, Severity::Fatal]);
        assert_eq!(args.filter.correlation.as_deref(), Some("req-1"));
        assert_eq!(args.limit, 50);
        assert_eq!(args.offset, 0);
        assert!(!args.oldest_first);
    }

    #[test]
    fn test_logs_is_a_one_shot_query() {
        assert!(LogsArgs::try_parse_from(["logs", "--follow"]).is_err());
    }

    #[test]
    fn test_logs_args_reject_unknown_level() {
        assert!(LogsArgs::try_parse_from(["logs", "--level", "loud"]).is_err());
    }
}
