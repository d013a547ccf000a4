pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;

use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the crate's own diagnostics
///
/// Note: This function can only be called once. Use
/// [`add_observability_layer`] instead when events should also be stored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Install a tracing subscriber that also feeds events into `logger`
///
/// # Arguments
///
/// * `logger` - The logger receiving converted `tracing` events
///
/// # Notes
///
/// This sets the global default subscriber, so it replaces [`init_tracing`]
/// rather than adding to it. If a global subscriber is already installed the
/// layer is not added and events only reach the console.
pub fn add_observability_layer(logger: Arc<observability::Logger>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);
    let observability_layer = observability::ObservabilityLayer::new(logger);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(observability_layer);

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(_) => {
            tracing::info!("Observability layer added to tracing subscriber");
        }
        Err(e) => {
            eprintln!("Warning: Failed to add observability layer: {}", e);
            eprintln!("Events will only be written to the console, not to segments");
        }
    }
}
