//! Emit command
//!
//! Append one record through a short-lived logger: open, record, shut down.
//! Useful from shell scripts and for smoke-testing a storage directory.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use lexlog::config::LoggerConfig;
use lexlog::observability::{metadata, LogContext, LogRecord, Logger, Severity};
use serde_json::Value;

/// Append a record to the log
#[derive(Debug, Clone, Parser)]
pub struct EmitArgs {
    /// Record message
    pub message: String,

    /// Severity (debug, info, warn, error, fatal)
    #[arg(short, long, default_value = "info")]
    pub level: Severity,

    /// Emitting component
    #[arg(short, long)]
    pub emitter: Option<String>,

    /// Acting user ID
    #[arg(short, long)]
    pub actor: Option<String>,

    /// Correlation ID
    #[arg(short, long)]
    pub correlation: Option<String>,

    /// Duration in milliseconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Metadata entries as key=value (value parsed as JSON when possible)
    #[arg(short, long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, Value)>,
}

fn parse_meta(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err("metadata key cannot be empty".to_string());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_string(), value))
}

impl EmitArgs {
    fn to_record(&self) -> LogRecord {
        let mut ctx = LogContext::new();
        if !self.meta.is_empty() {
            ctx = ctx.metadata(metadata(self.meta.iter().cloned()));
        }
        if let Some(ref emitter) = self.emitter {
            ctx = ctx.emitter(emitter);
        }
        if let Some(ref actor) = self.actor {
            ctx = ctx.actor(actor);
        }
        if let Some(ref correlation) = self.correlation {
            ctx = ctx.correlation(correlation);
        }
        if let Some(duration) = self.duration {
            ctx = ctx.duration(duration);
        }
        LogRecord::from_context(self.level, self.message.clone(), ctx)
    }
}

/// Execute the emit command
pub async fn execute(cfg: LoggerConfig, args: EmitArgs) -> Result<()> {
    let min_level = cfg.min_level;
    let logger = Logger::open(cfg).await?;

    let accepted = logger.record(args.to_record());
    logger.shutdown().await?;

    if accepted {
        eprintln!("{}", "✓ Record written".green());
    } else {
        eprintln!(
            "{}",
            format!(
                "Record dropped: level {} is below the configured minimum ({})",
                args.level, min_level
            )
            .yellow()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_meta() {
        assert_eq!(parse_meta("count=3").unwrap(), ("count".to_string(), json!(3)));
        assert_eq!(parse_meta("name=decks").unwrap(), ("name".to_string(), json!("decks")));
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=1").is_err());
    }

    #[test]
    fn test_emit_args_to_record() {
        let args = EmitArgs::parse_from([
            "emit", "Deck built", "-l", "warn", "-e", "decks", "-m", "slides=12", "--duration", "250",
        ]);
        let record = args.to_record();
        assert_eq!(record.level, Severity::Warn);
        assert_eq!(record.emitter.as_deref(), Some("decks"));
        assert_eq!(record.duration_ms, Some(250.0));
        assert_eq!(record.metadata.unwrap()["slides"], 12);
    }
}
