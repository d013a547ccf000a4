use anyhow::Result;
use colored::Colorize;
use lexlog::config::LoggerConfig;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration (file, environment and defaults merged)
pub fn show(cfg: &LoggerConfig) -> Result<()> {
    info!("Displaying effective configuration");

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(cfg)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
///
/// Loading already validated the values; this also checks the storage directory.
pub fn validate(cfg: &LoggerConfig) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration");

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Storage: {} ({})", cfg.storage_dir.display(), storage_state(cfg));
    println!("  Minimum Level: {}", cfg.min_level);
    println!(
        "  Rotation: {:?}, max {} per segment",
        cfg.rotation,
        super::format_bytes(cfg.max_segment_bytes)
    );
    println!(
        "  Retention: archive after {} days, delete after {} days, at most {} live segments",
        cfg.archive_after_days, cfg.delete_after_days, cfg.max_segments
    );
    println!("  Line Format: {:?} ({:?} timestamps)", cfg.line_format, cfg.timestamp_format);

    Ok(())
}

fn storage_state(cfg: &LoggerConfig) -> String {
    if cfg.storage_dir.is_dir() {
        "exists".green().to_string()
    } else if cfg.storage_dir.exists() {
        "not a directory".red().to_string()
    } else {
        "will be created".yellow().to_string()
    }
}
