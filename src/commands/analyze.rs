//! Analytics command
//!
//! Aggregate stored records over a time range and print a summary.

use super::format_number;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use lexlog::config::LoggerConfig;
use lexlog::observability::{analyze_stored, AnalyticsSnapshot, QueryEngine, Severity};
use tokio_util::sync::CancellationToken;

/// Summarize stored logs
#[derive(Debug, Clone, Parser)]
pub struct AnalyzeArgs {
    /// Analyze the last N hours
    #[arg(long, default_value = "24", conflicts_with_all = ["from", "all"])]
    pub hours: u64,

    /// Range start (RFC 3339)
    #[arg(long)]
    pub from: Option<DateTime<Utc>>,

    /// Range end (RFC 3339, defaults to now)
    #[arg(long)]
    pub to: Option<DateTime<Utc>>,

    /// Analyze everything stored
    #[arg(long)]
    pub all: bool,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    pub format: String,
}

impl AnalyzeArgs {
    fn range(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if self.all {
            return (None, self.to);
        }
        let from = self.from.unwrap_or_else(|| {
            now - Duration::hours(i64::try_from(self.hours).unwrap_or(i64::MAX / 3_600_000))
        });
        (Some(from), Some(self.to.unwrap_or(now)))
    }
}

/// Execute the analyze command
pub async fn execute(cfg: LoggerConfig, args: AnalyzeArgs) -> Result<()> {
    let engine = QueryEngine::new(super::open_store(&cfg)?);
    let (from, to) = args.range(Utc::now());

    let snapshot = analyze_stored(
        &engine,
        from,
        to,
        cfg.analytics_max_records,
        &CancellationToken::new(),
    )
    .await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        _ => display_snapshot(&snapshot),
    }

    Ok(())
}

fn display_snapshot(snapshot: &AnalyticsSnapshot) {
    println!("{}", "Log Analytics".bold().underline());
    println!();

    if let Some(ref range) = snapshot.time_range {
        println!(
            "{:<20} {} → {}",
            "Time Range:",
            range.from.format("%Y-%m-%d %H:%M:%S"),
            range.to.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!("{:<20} {:>10}", "Total Entries:", format_number(snapshot.total_entries));

    let rate = format!("{}%", snapshot.error_rate);
    let rate = match snapshot.error_rate {
        0 => rate.green(),
        1..=5 => rate.yellow(),
        _ => rate.red().bold(),
    };
    println!("{:<20} {:>10}", "Error Rate:", rate);

    match snapshot.avg_response_time {
        Some(avg) => println!("{:<20} {:>10}", "Avg Response:", format!("{:.1}ms", avg)),
        None => println!("{:<20} {:>10}", "Avg Response:", "-".dimmed()),
    }
    if snapshot.truncated {
        println!(
            "{}",
            "Record cap reached: figures cover the newest records only".yellow()
        );
    }
    println!();

    let mut levels = Table::new();
    levels
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("LEVEL").fg(Color::Cyan),
            Cell::new("COUNT").fg(Color::Cyan),
        ]);
    for level in Severity::ALL {
        let color = match level {
            Severity::Fatal | Severity::Error => Color::Red,
            Severity::Warn => Color::Yellow,
            Severity::Info => Color::Green,
            Severity::Debug => Color::Blue,
        };
        levels.add_row(vec![
            Cell::new(level.as_str()).fg(color),
            Cell::new(format_number(snapshot.count(level))),
        ]);
    }
    println!("{}", levels);

    if !snapshot.top_errors.is_empty() {
        println!();
        println!("{}", "Top Errors".bold());
        let mut errors = Table::new();
        errors
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("COUNT").fg(Color::Cyan),
                Cell::new("MESSAGE").fg(Color::Cyan),
            ]);
        for error in &snapshot.top_errors {
            errors.add_row(vec![
                Cell::new(format_number(error.count)),
                Cell::new(&error.message),
            ]);
        }
        println!("{}", errors);
    }

    if !snapshot.active_emitters.is_empty() {
        println!();
        let emitters: Vec<&str> = snapshot.active_emitters.iter().map(String::as_str).collect();
        println!("{} {}", "Active Emitters:".bold(), emitters.join(", ").cyan());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_is_last_day() {
        let args = AnalyzeArgs::parse_from(["analyze"]);
        let now = Utc::now();
        let (from, to) = args.range(now);
        assert_eq!(from, Some(now - Duration::hours(24)));
        assert_eq!(to, Some(now));
    }

    #[test]
    fn test_all_range_is_open() {
        let args = AnalyzeArgs::parse_from(["analyze", "--all"]);
        assert_eq!(args.range(Utc::now()), (None, None));
    }

    #[test]
    fn test_all_with_end_keeps_end() {
        let args = AnalyzeArgs::parse_from(["analyze", "--all", "--to", "2026-10-18T12:00:00Z"]);
        let to: DateTime<Utc> = "2026-10-18T12:00:00Z".parse().unwrap();
        assert_eq!(args.range(Utc::now()), (None, Some(to)));
    }
}
