//! Tracing subscriber installation for the binary.

use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the `EnvFilter` directives.
pub const LOG_ENV_VAR: &str = "IACFLOW_LOG";

/// Verbosity used when [`LOG_ENV_VAR`] is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Builds the filter from [`LOG_ENV_VAR`], falling back to
/// [`DEFAULT_DIRECTIVE`].
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs a stderr `fmt` subscriber. Later calls are ignored.
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .try_init()
        .ok();
}
