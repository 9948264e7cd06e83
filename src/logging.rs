use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the tracing subscriber for the process.
///
/// `level` is the default directive when `RUST_LOG` is unset; embedding
/// binaries call this once at startup. Safe to call again (subsequent
/// calls are no-ops).
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Initializes JSON-formatted logs, used in production deployments.
pub fn init_json(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = fmt().json().with_env_filter(filter).try_init();
}
