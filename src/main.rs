use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use lexlog::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    init_tracing();
    lexlog::metrics::init_metric_descriptions();

    let command = args.get_command();
    if let cli::Commands::Version = command {
        println!("lexlog v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = commands::load(args.config.as_deref(), args.storage_dir.as_deref())?;

    // Dispatch to appropriate command handler
    match command {
        cli::Commands::Logs(logs_args) => {
            commands::logs::execute(cfg, logs_args).await?;
        }
        cli::Commands::Analyze(analyze_args) => {
            commands::analyze::execute(cfg, analyze_args).await?;
        }
        cli::Commands::Export(export_args) => {
            commands::export::execute(cfg, export_args).await?;
        }
        cli::Commands::Retention(retention_args) => {
            commands::retention::execute(cfg, retention_args).await?;
        }
        cli::Commands::Emit(emit_args) => {
            commands::emit::execute(cfg, emit_args).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg)?,
            cli::ConfigCommands::Validate => commands::config::validate(&cfg)?,
        },
        cli::Commands::Version => {}
    }

    Ok(())
}
