//! Export command
//!
//! Write matching records as a JSON array or CSV, to a file or stdout.

use super::FilterArgs;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use lexlog::config::LoggerConfig;
use lexlog::observability::{export, ExportFormat, QueryEngine};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Export stored logs
#[derive(Debug, Clone, Parser)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output format (json, csv)
    #[arg(short = 'f', long, default_value = "json")]
    pub format: ExportFormat,

    /// Maximum number of records
    #[arg(long, default_value = "10000")]
    pub limit: usize,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the export command
pub async fn execute(cfg: LoggerConfig, args: ExportArgs) -> Result<()> {
    let engine = QueryEngine::new(super::open_store(&cfg)?);
    let query = args.filter.to_query().limit(args.limit);
    let records = engine.query(&query, &CancellationToken::new()).await?;
    let bytes = export(&records, args.format)?;

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                format!("Exported {} records to {}", records.len(), path.display()).green()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_args_parsing() {
        let args = ExportArgs::parse_from(["export", "-f", "csv", "-o", "out.csv", "--emitter", "decks"]);
        assert_eq!(args.format, ExportFormat::Csv);
        assert_eq!(args.output, Some(PathBuf::from("out.csv")));
        assert_eq!(args.filter.emitter.as_deref(), Some("decks"));
        assert_eq!(args.limit, 10000);
    }
}
