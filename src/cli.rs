use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lexlog", version, about = "Structured log storage and analysis")]
pub struct Cli {
    /// Configuration file path (TOML); LEXLOG__* variables override it
    #[arg(long, global = true, env = "LEXLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage directory, overriding the configured one
    #[arg(short = 'd', long, global = true)]
    pub storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Query stored logs (default)
    Logs(crate::commands::logs::LogsArgs),

    /// Aggregate statistics over a time range
    Analyze(crate::commands::analyze::AnalyzeArgs),

    /// Export matching records as JSON or CSV
    Export(crate::commands::export::ExportArgs),

    /// Inspect segments, archive and purge
    Retention(crate::commands::retention::RetentionArgs),

    /// Append a record to the log
    Emit(crate::commands::emit::EmitArgs),

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Logs if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or_else(|| {
            Commands::Logs(crate::commands::logs::LogsArgs::parse_from(["logs"]))
        })
    }
}
