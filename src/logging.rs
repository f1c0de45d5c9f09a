use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{DashboardError, Result};

/// Sets up the logging subscriber for the service.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to this crate only.
pub fn init_logger(default_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = default_level.parse::<Level>().unwrap_or(Level::INFO);
        EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level))
    });

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true)
        .with_level(true)
        .with_ansi(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| DashboardError::Internal(format!("Failed to initialize logger: {}", e)))
}

#[cfg(test)]
pub fn init_for_tests() {
    use std::sync::Once;

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("trace_explorer=debug"))
            .with_test_writer()
            .try_init();
    });
}
