use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when neither `RUST_LOG` nor the settings provide one
pub const DEFAULT_LOG_FILTER: &str = "pixxel8=debug,pixxel8_lib=debug,warn";

/// Initialize logging with tracing
///
/// This function sets up the tracing subscriber with the following configuration:
/// - Reads filter from RUST_LOG environment variable if available
/// - Falls back to `fallback`, or `DEFAULT_LOG_FILTER` when `None`
/// - Uses a formatted output layer
///
/// Returns `false` if a global subscriber was already installed.
///
/// # Example
///
/// ```no_run
/// use pixxel8_lib::utils::logging::init_logging;
///
/// init_logging(None);
/// ```
pub fn init_logging(fallback: Option<&str>) -> bool {
    let fallback = fallback.unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(fallback).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    });

    let installed = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Pixxel8 logging initialized");
    }
    installed
}
